//! Mask-model port and its adapters.
//!
//! The separation pipeline only ever sees [`MaskModel`]; anything able to map
//! `[batch, channel, bin, window]` magnitudes to a `[batch, channel, bin,
//! window - 2*offset]` mask in `[0, 1]` can be plugged in.

pub mod gate;
pub mod onnx;

use std::path::Path;

use ndarray::{Array4, ArrayView4};

use crate::{
    error::{Result, SeparationError},
    types::Device,
};

pub use gate::ContextGateNet;
pub use onnx::OnnxMaskModel;

pub trait MaskModel {
    /// Frames of context consumed on each side of a window.
    fn offset(&self) -> usize;

    /// Extra right padding the model needs beyond `offset`.
    fn conv_offset(&self) -> usize {
        0
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// A mask model that can be fitted. The trainer owns the loss and hands
/// back its gradient with respect to the predicted mask; the model is
/// responsible for propagating it and stepping its own parameters.
pub trait TrainableModel: MaskModel {
    /// Training-mode forward pass; may cache activations for `backward`.
    fn forward(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>>;

    fn backward(&mut self, grad_mask: ArrayView4<f32>, learning_rate: f32) -> Result<()>;

    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}

impl<M: MaskModel + ?Sized> MaskModel for Box<M> {
    fn offset(&self) -> usize {
        (**self).offset()
    }

    fn conv_offset(&self) -> usize {
        (**self).conv_offset()
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(batch)
    }
}

/// Opens a model by file extension: `.onnx` graphs run through onnxruntime,
/// `.npz` checkpoints load a [`ContextGateNet`].
pub fn load_model(
    path: &Path,
    device: Device,
    offset: usize,
    conv_offset: usize,
) -> Result<Box<dyn MaskModel>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("onnx") => Ok(Box::new(OnnxMaskModel::load(
            path,
            device,
            offset,
            conv_offset,
        )?)),
        Some("npz") => {
            if device != Device::Cpu {
                tracing::warn!(?device, "checkpoint models run on the CPU only");
            }
            Ok(Box::new(ContextGateNet::load(path)?))
        }
        _ => Err(SeparationError::Config(format!(
            "unsupported model file {:?} (expected .onnx or .npz)",
            path
        ))),
    }
}
