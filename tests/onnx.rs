use std::fs;

use tempfile::tempdir;
use vocal_remover_core::{load_model, model::onnx::mask_from_output, Device, SeparationError};

#[test]
fn output_with_expected_layout_is_kept() {
    let data: Vec<f32> = (0..2 * 2 * 4 * 8).map(|i| i as f32 / 128.0).collect();
    let mask = mask_from_output(&[2, 2, 4, 8], &data, (2, 2, 4, 8)).unwrap();
    assert_eq!(mask.dim(), (2, 2, 4, 8));
    assert_eq!(mask[[0, 0, 0, 1]], data[1]);
    assert_eq!(mask[[1, 1, 3, 7]], data[127]);
}

#[test]
fn transposed_output_is_rejected_despite_equal_length() {
    let data = vec![0.5f32; 2 * 2 * 8 * 4];
    let err = mask_from_output(&[2, 2, 8, 4], &data, (2, 2, 4, 8)).unwrap_err();
    match err {
        SeparationError::ShapeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, vec![2, 2, 4, 8]);
            assert_eq!(actual, vec![2, 2, 8, 4]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn output_with_wrong_rank_is_rejected() {
    let data = vec![0.0f32; 64];
    let err = mask_from_output(&[2, 32], &data, (2, 2, 4, 4)).unwrap_err();
    assert!(matches!(err, SeparationError::ShapeMismatch { .. }));
}

#[test]
fn garbage_onnx_file_fails_to_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.onnx");
    fs::write(&path, b"not a protobuf graph").unwrap();
    assert!(load_model(&path, Device::Cpu, 4, 0).is_err());

    let missing = dir.path().join("missing.onnx");
    assert!(load_model(&missing, Device::Cpu, 4, 0).is_err());
}
