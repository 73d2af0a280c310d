//! Spectrogram codec: centred STFT and its overlap-add inverse.
//!
//! The frame size is tied to the hop: `n_fft = 2 * (hop - 1)`, which yields
//! exactly `hop` frequency bins per frame.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use ndarray::{stack, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};
use num_complex::Complex32;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

use crate::error::{Result, SeparationError};

struct FftCache {
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

static FFT_CACHES: Lazy<Mutex<HashMap<usize, Arc<FftCache>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn fft_cache(n_fft: usize) -> Arc<FftCache> {
    let mut caches = FFT_CACHES.lock().unwrap_or_else(PoisonError::into_inner);
    caches
        .entry(n_fft)
        .or_insert_with(|| {
            let mut planner = FftPlanner::new();
            Arc::new(FftCache {
                fft_forward: planner.plan_fft_forward(n_fft),
                fft_inverse: planner.plan_fft_inverse(n_fft),
                hann_window: compute_hann(n_fft),
            })
        })
        .clone()
}

/// Periodic Hann window.
fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = n_fft as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

pub fn n_fft_for_hop(hop_length: usize) -> usize {
    2 * hop_length.saturating_sub(1)
}

pub fn freq_bins_for_hop(hop_length: usize) -> usize {
    n_fft_for_hop(hop_length) / 2 + 1
}

pub fn frames_for_len(samples: usize, hop_length: usize) -> usize {
    1 + samples / hop_length
}

fn check_hop(hop_length: usize) -> Result<()> {
    if hop_length < 3 {
        return Err(SeparationError::Config(format!(
            "hop length must be at least 3 samples, got {hop_length}"
        )));
    }
    Ok(())
}

/// Interleaved samples to planar `[channel, sample]`.
pub fn to_planar(interleaved: &[f32], channels: u16) -> Array2<f32> {
    let channels = usize::from(channels.max(1));
    let frames = interleaved.len() / channels;
    Array2::from_shape_fn((channels, frames), |(ch, i)| interleaved[i * channels + ch])
}

/// Forward transform of one channel. Returns `[freq_bin, frame]`.
fn stft_channel(signal: ArrayView1<f32>, hop: usize, cache: &FftCache) -> Array2<Complex32> {
    let n_fft = cache.hann_window.len();
    let pad = n_fft / 2;
    let t = signal.len();
    let f_bins = n_fft / 2 + 1;
    let frames = frames_for_len(t, hop);

    let mut padded = vec![0.0f32; pad + t + pad];
    for (dst, &src) in padded[pad..pad + t].iter_mut().zip(signal.iter()) {
        *dst = src;
    }

    let window = &cache.hann_window;
    let mut out = Array2::<Complex32>::zeros((f_bins, frames));
    let mut buf = vec![Complex32::zero(); n_fft];

    for fr in 0..frames {
        let start = fr * hop;
        let frame = &padded[start..start + n_fft];
        for i in 0..n_fft {
            buf[i] = Complex32::new(frame[i] * window[i], 0.0);
        }

        cache.fft_forward.process(&mut buf);

        for (fi, bin) in buf.iter().take(f_bins).enumerate() {
            out[[fi, fr]] = *bin;
        }
    }

    out
}

/// Inverse transform of one channel from `[freq_bin, frame]`.
fn istft_channel(
    spec: ArrayView2<Complex32>,
    hop: usize,
    cache: &FftCache,
    target_length: usize,
) -> Array1<f32> {
    let n_fft = cache.hann_window.len();
    let pad = n_fft / 2;
    let (f_bins, frames) = spec.dim();
    let padded_length = n_fft + hop * frames.saturating_sub(1);

    let window = &cache.hann_window;
    let mut out = vec![0.0f32; padded_length];
    let mut window_sum = vec![0.0f32; padded_length];
    let mut buf = vec![Complex32::zero(); n_fft];

    let scale = 1.0 / (n_fft as f32);

    for fr in 0..frames {
        buf.fill(Complex32::zero());

        for fi in 0..f_bins {
            buf[fi] = spec[[fi, fr]];
        }
        // Hermitian mirror, DC and Nyquist stay real.
        for fi in 1..f_bins - 1 {
            buf[n_fft - fi] = buf[fi].conj();
        }
        buf[0].im = 0.0;
        buf[n_fft / 2].im = 0.0;

        cache.fft_inverse.process(&mut buf);

        let start = fr * hop;
        for i in 0..n_fft {
            let w = window[i];
            out[start + i] += buf[i].re * w * scale;
            window_sum[start + i] += w * w;
        }
    }

    for (sample, &sum) in out.iter_mut().zip(window_sum.iter()) {
        if sum > 1e-10 {
            *sample /= sum;
        }
    }

    Array1::from_shape_fn(target_length, |i| out.get(pad + i).copied().unwrap_or(0.0))
}

/// Magnitude spectrogram `[channel, freq_bin, frame]` and, if requested, unit
/// phasors of the same shape.
pub fn forward(
    samples: ArrayView2<f32>,
    hop_length: usize,
    want_phase: bool,
) -> Result<(Array3<f32>, Option<Array3<Complex32>>)> {
    check_hop(hop_length)?;
    let cache = fft_cache(n_fft_for_hop(hop_length));

    let specs: Vec<Array2<Complex32>> = (0..samples.nrows())
        .into_par_iter()
        .map(|ch| stft_channel(samples.row(ch), hop_length, &cache))
        .collect();
    let views: Vec<_> = specs.iter().map(|s| s.view()).collect();
    let spec = stack(Axis(0), &views)?;

    let magnitude = spec.mapv(|c| c.norm());
    let phase = want_phase.then(|| {
        spec.mapv(|c| {
            let norm = c.norm();
            if norm > 0.0 {
                c / norm
            } else {
                Complex32::new(1.0, 0.0)
            }
        })
    });

    Ok((magnitude, phase))
}

/// Rebuilds `[channel, sample]` audio from magnitude and phase.
///
/// Without `length` the output holds `hop * (frames - 1)` samples.
pub fn inverse(
    magnitude: &Array3<f32>,
    phase: &Array3<Complex32>,
    hop_length: usize,
    length: Option<usize>,
) -> Result<Array2<f32>> {
    check_hop(hop_length)?;
    if magnitude.shape() != phase.shape() {
        return Err(SeparationError::shape(
            "inverse stft",
            magnitude.shape(),
            phase.shape(),
        ));
    }
    let (channels, f_bins, frames) = magnitude.dim();
    let expected_bins = freq_bins_for_hop(hop_length);
    if f_bins != expected_bins {
        return Err(SeparationError::shape(
            "inverse stft",
            &[channels, expected_bins, frames],
            magnitude.shape(),
        ));
    }

    let cache = fft_cache(n_fft_for_hop(hop_length));
    let target_length = length.unwrap_or(hop_length * frames.saturating_sub(1));

    let spec = Zip::from(magnitude)
        .and(phase)
        .map_collect(|&m, &p| p * m);

    let waves: Vec<Array1<f32>> = (0..channels)
        .into_par_iter()
        .map(|ch| istft_channel(spec.index_axis(Axis(0), ch), hop_length, &cache, target_length))
        .collect();
    let views: Vec<_> = waves.iter().map(|w| w.view()).collect();
    Ok(stack(Axis(0), &views)?)
}
