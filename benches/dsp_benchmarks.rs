//! DSP Benchmarks
//!
//! Throughput of the spectral stages on a 10 second stereo excerpt.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stemeval::config::RefinerConfig;
use stemeval::dsp::{ideal_ratio_masks, SpectralTransform, StemMap, WienerRefiner};
use stemeval::engine::{generate_stereo_test_tone, DEFAULT_SAMPLE_RATE};

fn benchmark_stft(c: &mut Criterion) {
    let buffer = generate_stereo_test_tone(440.0, 660.0, 10.0, DEFAULT_SAMPLE_RATE);
    let transform = SpectralTransform::default();

    c.bench_function("stft_forward_10s_stereo", |b| {
        b.iter(|| transform.forward(black_box(&buffer)))
    });

    let spectrogram = transform.forward(&buffer);
    c.bench_function("stft_inverse_10s_stereo", |b| {
        b.iter(|| transform.inverse(black_box(&spectrogram), DEFAULT_SAMPLE_RATE).unwrap())
    });
}

fn benchmark_masks(c: &mut Criterion) {
    let transform = SpectralTransform::default();
    let magnitudes = StemMap::from_fn(|source| {
        let freq = 110.0 * (source as usize + 1) as f32;
        let tone = generate_stereo_test_tone(freq, freq * 1.5, 10.0, DEFAULT_SAMPLE_RATE);
        transform.forward(&tone).magnitude()
    });

    c.bench_function("irm_10s_stereo", |b| {
        b.iter(|| ideal_ratio_masks(black_box(&magnitudes)).unwrap())
    });
}

fn benchmark_wiener(c: &mut Criterion) {
    let transform = SpectralTransform::default();
    let mixture = transform.forward(&generate_stereo_test_tone(220.0, 330.0, 5.0, DEFAULT_SAMPLE_RATE));
    let magnitude = mixture.magnitude();
    let initial = StemMap::from_fn(|source| {
        let share = 0.1 * (source as usize + 1) as f32;
        magnitude.map(|m| m * share)
    });

    let mut group = c.benchmark_group("wiener_5s_stereo");
    group.sample_size(10);
    for iterations in [1, 3] {
        let refiner = WienerRefiner::new(RefinerConfig::with_iterations(iterations));
        group.bench_function(format!("{}_iter", iterations), |b| {
            b.iter(|| refiner.refine(black_box(&mixture), black_box(&initial)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_stft, benchmark_masks, benchmark_wiener);
criterion_main!(benches);
