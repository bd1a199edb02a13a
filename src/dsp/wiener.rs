//! Multichannel Wiener filter refinement
//!
//! Turns magnitude-only source estimates into complex stereo estimates.
//! Each source `j` is modelled per time-frequency bin as a zero-mean
//! complex Gaussian with covariance `v_j(f,t) · R_j(f)`: a mono power
//! spectral density times a 2×2 spatial covariance. The mixture is the
//! sum of the sources, so its covariance is `Cxx = Σ_j v_j R_j`.
//!
//! Refinement is an EM-style fixed point over [`RefinementState`]:
//!
//! 1. init: `v_j = mean_c |M_j|²`, `y_j = x · v_j / (ε + Σ_k v_k)`
//! 2. M-step: `R_j(f) = Σ_t y_j y_jᴴ / (ε + Σ_t mean_c |y_j|²)`, and
//!    with [`PsdUpdate::Reestimate`] also `v_j = mean_c |y_j|²`
//! 3. E-step: `W_j = v_j R_j (Cxx + √ε I)⁻¹`, `y_j = W_j x`
//!
//! Steps 2 and 3 repeat `iterations` times (at least once). Bins whose
//! mixture model carries no power split the mixture evenly between the
//! sources instead of producing zeros or NaNs, so `Σ_j y_j ≈ x` holds
//! everywhere.

use std::ops::{Add, AddAssign, Mul};

use log::debug;
use rustfft::num_complex::{Complex32, Complex64};

use crate::config::{PsdUpdate, RefinerConfig};
use crate::dsp::source::{Source, StemMap};
use crate::dsp::tensor::{Magnitude, Spectrogram, Tensor3};
use crate::engine::STEREO_CHANNELS;
use crate::error::{EvalError, Result};

const CZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Share of the mixture each source receives in a degenerate bin
const EVEN_SPLIT: f64 = 1.0 / Source::ALL.len() as f64;

// ============================================================================
// 2x2 complex matrices
// ============================================================================

/// Hermitian-friendly 2×2 complex matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2(pub [[Complex64; 2]; 2]);

impl Mat2 {
    pub const ZERO: Mat2 = Mat2([[CZERO; 2]; 2]);

    pub fn scaled_identity(value: f64) -> Self {
        let v = Complex64::new(value, 0.0);
        Mat2([[v, CZERO], [CZERO, v]])
    }

    /// `a · aᴴ`
    pub fn outer(a: [Complex64; 2]) -> Self {
        Mat2([
            [a[0] * a[0].conj(), a[0] * a[1].conj()],
            [a[1] * a[0].conj(), a[1] * a[1].conj()],
        ])
    }

    pub fn scale(self, factor: f64) -> Self {
        let m = self.0;
        Mat2([
            [m[0][0] * factor, m[0][1] * factor],
            [m[1][0] * factor, m[1][1] * factor],
        ])
    }

    /// Real part of the trace (total power for a covariance)
    pub fn trace_re(&self) -> f64 {
        self.0[0][0].re + self.0[1][1].re
    }

    /// Inverse, or None when the determinant vanishes or is not finite
    pub fn inverse(&self) -> Option<Mat2> {
        let m = self.0;
        let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
        if !det.re.is_finite() || !det.im.is_finite() || det.norm() <= f64::MIN_POSITIVE {
            return None;
        }
        let inv_det = det.inv();
        Some(Mat2([
            [m[1][1] * inv_det, -m[0][1] * inv_det],
            [-m[1][0] * inv_det, m[0][0] * inv_det],
        ]))
    }

    /// Matrix-vector product
    pub fn apply(&self, v: [Complex64; 2]) -> [Complex64; 2] {
        let m = self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1],
            m[1][0] * v[0] + m[1][1] * v[1],
        ]
    }
}

impl Add for Mat2 {
    type Output = Mat2;

    fn add(mut self, rhs: Mat2) -> Mat2 {
        self += rhs;
        self
    }
}

impl AddAssign for Mat2 {
    fn add_assign(&mut self, rhs: Mat2) {
        for (row, rhs_row) in self.0.iter_mut().zip(rhs.0.iter()) {
            for (a, b) in row.iter_mut().zip(rhs_row.iter()) {
                *a += *b;
            }
        }
    }
}

impl Mul for Mat2 {
    type Output = Mat2;

    fn mul(self, rhs: Mat2) -> Mat2 {
        let (a, b) = (self.0, rhs.0);
        let mut out = [[CZERO; 2]; 2];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = a[i][0] * b[0][j] + a[i][1] * b[1][j];
            }
        }
        Mat2(out)
    }
}

#[inline]
fn widen(c: Complex32) -> Complex64 {
    Complex64::new(c.re as f64, c.im as f64)
}

#[inline]
fn narrow(c: Complex64) -> Complex32 {
    Complex32::new(c.re as f32, c.im as f32)
}

// ============================================================================
// Refinement state
// ============================================================================

/// Everything the fixed-point iteration carries between passes
///
/// Values are stored at the internal scale (mixture divided by
/// [`RefinementState::scale`]); [`RefinementState::into_estimates`] undoes it.
#[derive(Debug, Clone)]
pub struct RefinementState {
    mixture: Spectrogram,
    scale: f32,
    /// Mono PSD per source, indexed `bin * frames + frame`
    psd: StemMap<Vec<f64>>,
    /// Spatial covariance per source and bin
    spatial: StemMap<Vec<Mat2>>,
    estimates: StemMap<Spectrogram>,
    iterations_run: usize,
}

impl RefinementState {
    /// Current PSD of `source` (internal scale)
    pub fn psd(&self, source: Source) -> &[f64] {
        &self.psd[source]
    }

    /// Current spatial covariances of `source`, one per bin
    pub fn spatial_covariance(&self, source: Source) -> &[Mat2] {
        &self.spatial[source]
    }

    /// Current complex estimates (internal scale)
    pub fn estimates(&self) -> &StemMap<Spectrogram> {
        &self.estimates
    }

    /// Factor the mixture was divided by for refinement
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn iterations_run(&self) -> usize {
        self.iterations_run
    }

    /// Final estimates at the mixture's original scale
    pub fn into_estimates(self) -> StemMap<Spectrogram> {
        let scale = self.scale;
        StemMap::from_fn(|source| self.estimates[source].map(|c| *c * scale))
    }
}

// ============================================================================
// Refiner
// ============================================================================

/// Multichannel Wiener filter over a stereo mixture
#[derive(Debug, Clone, Default)]
pub struct WienerRefiner {
    config: RefinerConfig,
}

/// Refine `initial_magnitudes` with the default policy and `iterations` passes
///
/// `iterations == 0` runs a single pass.
pub fn refine(
    mixture: &Spectrogram,
    initial_magnitudes: &StemMap<Magnitude>,
    iterations: usize,
) -> Result<StemMap<Spectrogram>> {
    WienerRefiner::new(RefinerConfig::with_iterations(iterations)).refine(mixture, initial_magnitudes)
}

impl WienerRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Run the configured number of passes and return complex estimates
    pub fn refine(
        &self,
        mixture: &Spectrogram,
        initial_magnitudes: &StemMap<Magnitude>,
    ) -> Result<StemMap<Spectrogram>> {
        let mut state = self.initialize(mixture, initial_magnitudes)?;
        let iterations = self.config.effective_iterations();
        for _ in 0..iterations {
            self.step(&mut state);
        }
        debug!(
            "Wiener refinement: {} pass(es), psd update {:?}, scale {:.3}",
            state.iterations_run(),
            self.config.psd_update,
            state.scale()
        );
        Ok(state.into_estimates())
    }

    /// Validate inputs and build the soft-mask starting point
    pub fn initialize(
        &self,
        mixture: &Spectrogram,
        initial_magnitudes: &StemMap<Magnitude>,
    ) -> Result<RefinementState> {
        let [channels, num_bins, num_frames] = mixture.shape();
        if channels != STEREO_CHANNELS {
            return Err(EvalError::shape_mismatch(
                "Wiener refinement needs a stereo mixture",
                [STEREO_CHANNELS, num_bins, num_frames],
                mixture.shape(),
            ));
        }
        for (source, magnitude) in initial_magnitudes.iter() {
            mixture.ensure_same_shape(magnitude.shape(), &format!("{} initial estimate", source))?;
        }

        let scale = (mixture.max_abs() / 10.0).max(1.0);
        let scaled = mixture.map(|c| *c / scale);

        let psd = initial_magnitudes.map(|_, magnitude| mono_psd(magnitude, |m| (*m as f64).powi(2)));
        let estimates = soft_mask(&scaled, &psd, self.config.eps);

        Ok(RefinementState {
            mixture: scaled,
            scale,
            psd,
            spatial: StemMap::splat(vec![Mat2::ZERO; num_bins]),
            estimates,
            iterations_run: 0,
        })
    }

    /// One M-step followed by one E-step
    pub fn step(&self, state: &mut RefinementState) {
        let eps = self.config.eps;

        for source in Source::ALL {
            let estimate = &state.estimates[source];
            let power = mono_psd(estimate, |c| widen(*c).norm_sqr());
            state.spatial[source] = spatial_covariance(estimate, &power, eps);
            if self.config.psd_update == PsdUpdate::Reestimate {
                state.psd[source] = power;
            }
        }

        state.estimates = self.apply_gains(state);
        state.iterations_run += 1;
    }

    /// E-step: `y_j = v_j R_j (Σ_k v_k R_k + √ε I)⁻¹ x` per bin
    fn apply_gains(&self, state: &RefinementState) -> StemMap<Spectrogram> {
        let shape = state.mixture.shape();
        let [_, num_bins, num_frames] = shape;
        let regularization = Mat2::scaled_identity(self.config.eps.sqrt());

        let mut out: StemMap<Spectrogram> = StemMap::from_fn(|_| Tensor3::zeros(shape));

        for bin in 0..num_bins {
            for frame in 0..num_frames {
                let idx = bin * num_frames + frame;
                let x = [
                    widen(state.mixture[(0, bin, frame)]),
                    widen(state.mixture[(1, bin, frame)]),
                ];

                let weighted =
                    StemMap::from_fn(|source| state.spatial[source][bin].scale(state.psd[source][idx]));
                let model = weighted
                    .iter()
                    .fold(Mat2::ZERO, |acc, (_, contribution)| acc + *contribution);

                let gains = if model.trace_re() > f64::MIN_POSITIVE {
                    (model + regularization)
                        .inverse()
                        .map(|inv_cxx| weighted.map(|_, w| *w * inv_cxx))
                } else {
                    None
                };

                for source in Source::ALL {
                    let y = match &gains {
                        Some(gains) => gains[source].apply(x),
                        None => [x[0] * EVEN_SPLIT, x[1] * EVEN_SPLIT],
                    };
                    let target = &mut out[source];
                    target[(0, bin, frame)] = narrow(y[0]);
                    target[(1, bin, frame)] = narrow(y[1]);
                }
            }
        }

        out
    }
}

/// Channel-averaged power per bin, indexed `bin * frames + frame`
fn mono_psd<T, F: Fn(&T) -> f64>(tensor: &Tensor3<T>, power: F) -> Vec<f64> {
    let [channels, num_bins, num_frames] = tensor.shape();
    let mut psd = vec![0.0_f64; num_bins * num_frames];
    if channels == 0 {
        return psd;
    }
    for ch in 0..channels {
        for (acc, value) in psd.iter_mut().zip(tensor.channel_slice(ch)) {
            *acc += power(value);
        }
    }
    let inv = 1.0 / channels as f64;
    psd.iter_mut().for_each(|p| *p *= inv);
    psd
}

/// Initial estimates: the mixture weighted by each source's PSD share
fn soft_mask(mixture: &Spectrogram, psd: &StemMap<Vec<f64>>, eps: f64) -> StemMap<Spectrogram> {
    let shape = mixture.shape();
    let [channels, num_bins, num_frames] = shape;
    let mut out: StemMap<Spectrogram> = StemMap::from_fn(|_| Tensor3::zeros(shape));

    for bin in 0..num_bins {
        for frame in 0..num_frames {
            let idx = bin * num_frames + frame;
            let total: f64 = psd.iter().map(|(_, v)| v[idx]).sum();
            for source in Source::ALL {
                let share = if total > f64::MIN_POSITIVE {
                    psd[source][idx] / (eps + total)
                } else {
                    EVEN_SPLIT
                };
                let gain = share as f32;
                for ch in 0..channels {
                    out[source][(ch, bin, frame)] = mixture[(ch, bin, frame)] * gain;
                }
            }
        }
    }

    out
}

/// `R(f) = Σ_t y yᴴ / (ε + Σ_t power)` for a stereo estimate
fn spatial_covariance(estimate: &Spectrogram, power: &[f64], eps: f64) -> Vec<Mat2> {
    let [_, num_bins, num_frames] = estimate.shape();
    (0..num_bins)
        .map(|bin| {
            let mut acc = Mat2::ZERO;
            let mut weight = eps;
            for frame in 0..num_frames {
                let y = [
                    widen(estimate[(0, bin, frame)]),
                    widen(estimate[(1, bin, frame)]),
                ];
                acc += Mat2::outer(y);
                weight += power[bin * num_frames + frame];
            }
            acc.scale(1.0 / weight)
        })
        .collect()
}
