use std::path::Path;

use ndarray::{Array4, ArrayView4};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::{Tensor, Value},
};
use tracing::{info, warn};

use crate::{
    error::{Result, SeparationError},
    model::MaskModel,
    types::Device,
};

fn ort_err(e: impl std::fmt::Display) -> SeparationError {
    SeparationError::Anyhow(anyhow::anyhow!("onnx runtime: {e}"))
}

/// Mask model exported to ONNX. Binds the graph's first input and first
/// output; the receptive-field offsets are not recorded in the graph, so the
/// caller supplies them.
pub struct OnnxMaskModel {
    session: Session,
    input_name: String,
    output_name: String,
    offset: usize,
    conv_offset: usize,
}

impl OnnxMaskModel {
    pub fn load(path: &Path, device: Device, offset: usize, conv_offset: usize) -> Result<Self> {
        let builder = SessionBuilder::new()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?;
        let builder = match device {
            Device::Cpu => builder,
            Device::Cuda(id) => with_cuda(builder, id)?,
        };
        let session = builder.commit_from_file(path).map_err(ort_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Model {:?} declares no inputs", path))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Model {:?} declares no outputs", path))?;

        info!(
            model = %path.display(),
            input = %input_name,
            output = %output_name,
            offset,
            conv_offset,
            "loaded onnx mask model"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            offset,
            conv_offset,
        })
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder, id: u32) -> Result<SessionBuilder> {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    let cuda = CUDAExecutionProvider::default().with_device_id(id as i32);
    if !cuda.is_available().unwrap_or(false) {
        warn!(device = id, "CUDA unavailable, falling back to CPU");
        return Ok(builder);
    }
    builder
        .with_execution_providers([cuda.build()])
        .map_err(ort_err)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(builder: SessionBuilder, id: u32) -> Result<SessionBuilder> {
    warn!(
        device = id,
        "built without the `cuda` feature, falling back to CPU"
    );
    Ok(builder)
}

impl MaskModel for OnnxMaskModel {
    fn offset(&self) -> usize {
        self.offset
    }

    fn conv_offset(&self) -> usize {
        self.conv_offset
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (b, c, f, w) = batch.dim();
        if w <= self.offset * 2 {
            return Err(SeparationError::Config(format!(
                "window of {w} frames is too narrow for offset {}",
                self.offset
            )));
        }
        let out_dims = (b, c, f, w - self.offset * 2);

        let data: Vec<f32> = batch.iter().copied().collect();
        let input: Value = Tensor::from_array((vec![b, c, f, w], data))
            .map_err(ort_err)?
            .into_dyn();

        let output_name = self.output_name.clone();
        let outputs = self
            .session
            .run(vec![(self.input_name.clone(), input)])
            .map_err(ort_err)?;

        let mask: Value = outputs
            .into_iter()
            .find_map(|(name, v)| if name == output_name.as_str() { Some(v) } else { None })
            .ok_or_else(|| anyhow::anyhow!("Model did not return '{output_name}'"))?;

        let (shape, data) = mask.try_extract_tensor::<f32>().map_err(ort_err)?;
        mask_from_output(&shape[..], data, out_dims)
    }
}

/// Builds the mask array from a raw graph output, refusing any layout other
/// than `expected`. Equal element counts are not enough: a graph emitting
/// `[b, c, roi, f]` must not be read back as `[b, c, f, roi]`.
pub fn mask_from_output(
    shape: &[i64],
    data: &[f32],
    expected: (usize, usize, usize, usize),
) -> Result<Array4<f32>> {
    let want = [expected.0, expected.1, expected.2, expected.3];
    let actual: Vec<usize> = shape
        .iter()
        .map(|&d| usize::try_from(d).unwrap_or(0))
        .collect();
    if actual != want || data.len() != want.iter().product::<usize>() {
        return Err(SeparationError::shape("onnx mask output", &want, &actual));
    }
    Ok(Array4::from_shape_vec(expected, data.to_vec())?)
}
