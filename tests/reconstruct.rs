use approx::assert_abs_diff_eq;
use ndarray::Array3;
use vocal_remover_core::{core::reconstruct::separate, SeparationError};

#[test]
fn stems_sum_back_to_the_scaled_magnitude() {
    let magnitude = Array3::from_shape_fn((2, 8, 16), |(c, f, t)| ((c + f * t) % 7) as f32 / 7.0);
    let mask = Array3::from_shape_fn((2, 8, 16), |(c, f, t)| ((c * 5 + f + t) % 11) as f32 / 10.0);
    let coeff = 3.7;

    let (instrumental, vocal) = separate(&magnitude, &mask, coeff).unwrap();
    for ((i, v), m) in instrumental.iter().zip(vocal.iter()).zip(magnitude.iter()) {
        assert_abs_diff_eq!(i + v, m * coeff, epsilon = 1e-5);
    }
}

#[test]
fn dyadic_values_reconstruct_exactly() {
    let magnitude = Array3::from_shape_fn((1, 4, 4), |(_, f, t)| (f * 4 + t) as f32 / 16.0);
    let mask = Array3::from_shape_fn((1, 4, 4), |(_, f, _)| [0.0, 0.25, 0.5, 1.0][f]);

    let (instrumental, vocal) = separate(&magnitude, &mask, 2.0).unwrap();
    for ((i, v), m) in instrumental.iter().zip(vocal.iter()).zip(magnitude.iter()) {
        assert_eq!(i + v, m * 2.0);
    }
    assert_eq!(instrumental[[0, 0, 3]], 0.0);
    assert_eq!(vocal[[0, 3, 3]], 0.0);
}

#[test]
fn mismatched_mask_is_rejected() {
    let err = separate(&Array3::zeros((2, 4, 4)), &Array3::zeros((2, 4, 5)), 1.0).unwrap_err();
    assert!(matches!(err, SeparationError::ShapeMismatch { .. }));
}
