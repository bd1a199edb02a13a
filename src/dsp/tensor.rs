//! Three-dimensional tensor shared by every spectral stage
//!
//! Spectrograms, magnitudes and masks are all indexed by
//! (channel, frequency bin, frame). They share one contiguous row-major
//! buffer type so the indexing convention cannot drift between stages.

use std::ops::{Index, IndexMut};

use num_traits::Zero;
use rustfft::num_complex::Complex32;

use crate::error::{EvalError, Result};

/// Dense row-major tensor indexed by `(channel, bin, frame)`
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3<T> {
    data: Vec<T>,
    shape: [usize; 3],
    strides: [usize; 3],
}

/// Complex STFT of a multichannel signal
pub type Spectrogram = Tensor3<Complex32>;

/// Non-negative magnitudes, same layout as a [`Spectrogram`]
pub type Magnitude = Tensor3<f32>;

/// Real-valued time-frequency mask, expected in `[0, 1]`
pub type Mask = Tensor3<f32>;

fn row_major_strides(shape: [usize; 3]) -> [usize; 3] {
    [shape[1] * shape[2], shape[2], 1]
}

impl<T: Copy + Zero> Tensor3<T> {
    /// Create a tensor filled with zeros
    pub fn zeros(shape: [usize; 3]) -> Self {
        let len = shape.iter().product();
        Self {
            data: vec![T::zero(); len],
            shape,
            strides: row_major_strides(shape),
        }
    }
}

impl<T> Tensor3<T> {
    /// Wrap an existing row-major buffer
    pub fn from_vec(shape: [usize; 3], data: Vec<T>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(EvalError::InvalidConfig {
                reason: format!(
                    "tensor buffer holds {} elements but shape {:?} needs {}",
                    data.len(),
                    shape,
                    expected
                ),
            });
        }
        Ok(Self {
            data,
            shape,
            strides: row_major_strides(shape),
        })
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.shape[1]
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.shape[2]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn offset(&self, channel: usize, bin: usize, frame: usize) -> usize {
        debug_assert!(channel < self.shape[0] && bin < self.shape[1] && frame < self.shape[2]);
        channel * self.strides[0] + bin * self.strides[1] + frame * self.strides[2]
    }

    /// Element at `(channel, bin, frame)`, or None when out of bounds
    pub fn get(&self, channel: usize, bin: usize, frame: usize) -> Option<&T> {
        if channel < self.shape[0] && bin < self.shape[1] && frame < self.shape[2] {
            Some(&self.data[self.offset(channel, bin, frame)])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// All frames of one channel, bin-major (`bins * frames` elements)
    pub fn channel_slice(&self, channel: usize) -> &[T] {
        let start = channel * self.strides[0];
        &self.data[start..start + self.strides[0]]
    }

    /// Apply `f` to every element, keeping the shape
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Tensor3<U> {
        Tensor3 {
            data: self.data.iter().map(f).collect(),
            shape: self.shape,
            strides: self.strides,
        }
    }

    /// Combine two tensors elementwise; shapes must match
    pub fn zip_map<U, V, F>(&self, other: &Tensor3<U>, context: &str, mut f: F) -> Result<Tensor3<V>>
    where
        F: FnMut(&T, &U) -> V,
    {
        self.ensure_same_shape(other.shape, context)?;
        Ok(Tensor3 {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
            shape: self.shape,
            strides: self.strides,
        })
    }

    /// Return `ShapeMismatch` unless `shape` equals this tensor's shape
    pub fn ensure_same_shape(&self, shape: [usize; 3], context: &str) -> Result<()> {
        if self.shape != shape {
            return Err(EvalError::shape_mismatch(context, self.shape, shape));
        }
        Ok(())
    }
}

impl Spectrogram {
    /// Complex modulus of every bin
    pub fn magnitude(&self) -> Magnitude {
        self.map(|c| c.norm())
    }

    /// Largest modulus over the whole tensor (0 for an empty tensor)
    pub fn max_abs(&self) -> f32 {
        self.as_slice().iter().map(|c| c.norm()).fold(0.0_f32, f32::max)
    }

    /// True when every element has finite real and imaginary parts
    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }
}

impl<T> Index<(usize, usize, usize)> for Tensor3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (channel, bin, frame): (usize, usize, usize)) -> &T {
        &self.data[self.offset(channel, bin, frame)]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Tensor3<T> {
    #[inline]
    fn index_mut(&mut self, (channel, bin, frame): (usize, usize, usize)) -> &mut T {
        let offset = self.offset(channel, bin, frame);
        &mut self.data[offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let mut t: Tensor3<f32> = Tensor3::zeros([2, 3, 4]);
        assert_eq!(t.strides(), [12, 4, 1]);
        t[(1, 2, 3)] = 7.0;
        assert_eq!(t.as_slice()[23], 7.0);
        assert_eq!(t.get(1, 2, 3), Some(&7.0));
        assert_eq!(t.get(2, 0, 0), None);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Tensor3::from_vec([2, 2, 2], vec![0.0_f32; 7]).is_err());
        assert!(Tensor3::from_vec([2, 2, 2], vec![0.0_f32; 8]).is_ok());
    }

    #[test]
    fn test_zip_map_checks_shape() {
        let a: Tensor3<f32> = Tensor3::zeros([2, 3, 4]);
        let b: Tensor3<f32> = Tensor3::zeros([2, 3, 5]);
        let err = a.zip_map(&b, "test", |x, y| x + y).unwrap_err();
        assert_eq!(err.error_code(), "SHAPE_MISMATCH");
    }

    #[test]
    fn test_magnitude() {
        let mut s: Spectrogram = Tensor3::zeros([1, 1, 2]);
        s[(0, 0, 1)] = Complex32::new(3.0, 4.0);
        let mag = s.magnitude();
        assert_eq!(mag.as_slice(), &[0.0, 5.0]);
        assert_eq!(s.max_abs(), 5.0);
    }

    #[test]
    fn test_empty_tensor() {
        let t: Tensor3<f32> = Tensor3::zeros([2, 513, 0]);
        assert!(t.is_empty());
        assert_eq!(t.num_frames(), 0);
        assert!(t.channel_slice(1).is_empty());
    }
}
