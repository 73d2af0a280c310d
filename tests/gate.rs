use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, Array4};
use tempfile::tempdir;
use vocal_remover_core::{
    load_model,
    train::loss::masked_l1,
    ContextGateNet, Device, MaskModel, SeparationError, TrainableModel,
};

fn batch(n: usize, c: usize, f: usize, w: usize) -> Array4<f32> {
    Array4::from_shape_fn((n, c, f, w), |(b, ch, fi, t)| {
        0.1 + ((b * 13 + ch * 7 + fi * 5 + t * 3) % 10) as f32 / 10.0
    })
}

#[test]
fn zero_gate_predicts_half_over_the_roi() {
    let mut gate = ContextGateNet::new(6, 2);
    let mask = gate.predict(batch(2, 2, 6, 12).view()).unwrap();
    assert_eq!(mask.dim(), (2, 2, 6, 8));
    assert!(mask.iter().all(|&m| m == 0.5));
}

#[test]
fn predict_rejects_wrong_bin_count() {
    let mut gate = ContextGateNet::new(6, 1);
    let err = gate.predict(batch(1, 2, 5, 8).view()).unwrap_err();
    assert!(matches!(err, SeparationError::ShapeMismatch { .. }));
}

#[test]
fn checkpoint_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("model_iter3.npz");

    let weight = Array2::from_shape_fn((4, 5), |(f, k)| (f as f32 - k as f32) * 0.125);
    let bias = Array1::from_vec(vec![0.5, -0.25, 1.0, 0.0]);
    let gate = ContextGateNet::from_parameters(weight.clone(), bias.clone()).unwrap();
    gate.save_checkpoint(&path).unwrap();

    let loaded = ContextGateNet::load(&path).unwrap();
    assert_eq!(loaded.weight(), &weight);
    assert_eq!(loaded.bias(), &bias);
    assert_eq!(loaded.offset(), 2);

    let mut model = load_model(&path, Device::Cpu, 0, 0).unwrap();
    assert_eq!(model.offset(), 2);
    let mut original = gate.clone();
    let x = batch(1, 2, 4, 9);
    assert_eq!(
        model.predict(x.view()).unwrap(),
        original.predict(x.view()).unwrap()
    );
}

#[test]
fn even_tap_count_is_rejected() {
    let err = ContextGateNet::from_parameters(Array2::zeros((3, 4)), Array1::zeros(3)).unwrap_err();
    assert!(matches!(err, SeparationError::Config(_)));
}

#[test]
fn unknown_model_extension_is_config_error() {
    let err = load_model(std::path::Path::new("model.bin"), Device::Cpu, 0, 0)
        .err()
        .unwrap();
    assert!(matches!(err, SeparationError::Config(_)));
}

#[test]
fn backward_without_forward_fails() {
    let mut gate = ContextGateNet::new(3, 1);
    assert!(gate.backward(Array4::zeros((1, 1, 3, 2)).view(), 0.01).is_err());
}

#[test]
fn training_steps_reduce_the_loss() {
    let mut gate = ContextGateNet::new(4, 1);
    let x = batch(4, 2, 4, 10);
    let y = x.mapv(|v| v * 0.25);

    let initial = {
        let mask = gate.predict(x.view()).unwrap();
        masked_l1(x.view(), mask.view(), y.view()).unwrap().loss
    };

    for _ in 0..300 {
        let mask = gate.forward(x.view()).unwrap();
        let l = masked_l1(x.view(), mask.view(), y.view()).unwrap();
        gate.backward(l.grad_mask.view(), 0.02).unwrap();
    }

    let mask = gate.predict(x.view()).unwrap();
    let last = masked_l1(x.view(), mask.view(), y.view()).unwrap().loss;
    assert!(last < initial * 0.5, "loss {initial} -> {last}");
    assert_abs_diff_eq!(mask.mean().unwrap(), 0.25, epsilon = 0.1);
}
