use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use num_complex::Complex32;
use vocal_remover_core::{
    core::dsp::{forward, freq_bins_for_hop, frames_for_len, inverse, n_fft_for_hop, to_planar},
    SeparationError,
};

fn sine(len: usize, freq: f32, sr: f32, amp: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
        .collect()
}

#[test]
fn to_planar_interleaved_ok() {
    let inter = vec![0.1, 0.2, -0.3, -0.4, 1.0, 0.5];
    let planar = to_planar(&inter, 2);
    assert_eq!(planar.dim(), (2, 3));
    assert_abs_diff_eq!(planar[[0, 0]], 0.1, epsilon = 1e-7);
    assert_abs_diff_eq!(planar[[1, 0]], 0.2, epsilon = 1e-7);
    assert_abs_diff_eq!(planar[[0, 2]], 1.0, epsilon = 1e-7);
    assert_abs_diff_eq!(planar[[1, 2]], 0.5, epsilon = 1e-7);
}

#[test]
fn frame_geometry_follows_hop() {
    assert_eq!(n_fft_for_hop(1024), 2046);
    assert_eq!(freq_bins_for_hop(1024), 1024);
    assert_eq!(frames_for_len(220_500, 1024), 216);

    let wave = Array2::from_shape_vec((1, 1000), sine(1000, 300.0, 8000.0, 0.5)).unwrap();
    let (mag, phase) = forward(wave.view(), 64, false).unwrap();
    assert!(phase.is_none());
    assert_eq!(mag.dim(), (1, 64, frames_for_len(1000, 64)));
    assert!(mag.iter().all(|&m| m >= 0.0));
}

#[test]
fn stft_istft_roundtrip() {
    let len = 22_050;
    let hop = 256;
    let mut inter = Vec::with_capacity(len * 2);
    for (l, r) in sine(len, 440.0, 22_050.0, 0.5)
        .into_iter()
        .zip(sine(len, 660.0, 22_050.0, 0.3))
    {
        inter.push(l);
        inter.push(r);
    }
    let wave = to_planar(&inter, 2);

    let (mag, phase) = forward(wave.view(), hop, true).unwrap();
    let phase = phase.unwrap();
    let rebuilt = inverse(&mag, &phase, hop, Some(len)).unwrap();

    assert_eq!(rebuilt.dim(), wave.dim());
    for (a, b) in rebuilt.iter().zip(wave.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
}

#[test]
fn inverse_default_length_is_hop_times_frames_minus_one() {
    let hop = 128;
    let wave = Array2::from_shape_vec((1, 5000), sine(5000, 200.0, 16_000.0, 0.4)).unwrap();
    let (mag, phase) = forward(wave.view(), hop, true).unwrap();
    let frames = mag.dim().2;

    let rebuilt = inverse(&mag, &phase.unwrap(), hop, None).unwrap();
    assert_eq!(rebuilt.ncols(), hop * (frames - 1));
}

#[test]
fn silent_input_gets_unit_phase() {
    let wave = Array2::<f32>::zeros((1, 512));
    let (mag, phase) = forward(wave.view(), 32, true).unwrap();
    assert!(mag.iter().all(|&m| m == 0.0));
    assert!(phase
        .unwrap()
        .iter()
        .all(|&p| p == Complex32::new(1.0, 0.0)));
}

#[test]
fn tiny_hop_is_config_error() {
    let wave = Array2::<f32>::zeros((1, 64));
    let err = forward(wave.view(), 2, false).unwrap_err();
    assert!(matches!(err, SeparationError::Config(_)));
}

#[test]
fn inverse_rejects_mismatched_phase() {
    let mag = Array3::<f32>::zeros((1, 64, 10));
    let phase = Array3::from_elem((1, 64, 9), Complex32::new(1.0, 0.0));
    let err = inverse(&mag, &phase, 64, None).unwrap_err();
    assert!(matches!(err, SeparationError::ShapeMismatch { .. }));
}
