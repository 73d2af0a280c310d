//! Masked L1 objective on the region the model actually predicts.

use ndarray::{s, Array1, Array4, ArrayView4, Axis, Zip};

use crate::error::{Result, SeparationError};

/// Centre-crops the time axis to `width` frames, trimming the same context
/// from both sides as the tiling engine does.
pub fn crop_to(x: ArrayView4<'_, f32>, width: usize) -> Result<ArrayView4<'_, f32>> {
    let frames = x.len_of(Axis(3));
    if width > frames {
        return Err(SeparationError::shape(
            "crop width",
            &[frames],
            &[width],
        ));
    }
    let left = (frames - width) / 2;
    Ok(x.slice_move(s![.., .., .., left..left + width]))
}

#[derive(Clone, Debug)]
pub struct MaskedL1 {
    /// Mean over every element.
    pub loss: f32,
    /// Mean over each example.
    pub instance_loss: Array1<f32>,
    /// d(loss)/d(mask), same shape as the mask.
    pub grad_mask: Array4<f32>,
}

/// `mean(|crop(mixture) * mask - crop(target)|)` and its gradient.
pub fn masked_l1(
    mixture: ArrayView4<f32>,
    mask: ArrayView4<f32>,
    target: ArrayView4<f32>,
) -> Result<MaskedL1> {
    if mixture.shape() != target.shape() {
        return Err(SeparationError::shape(
            "loss target",
            mixture.shape(),
            target.shape(),
        ));
    }
    let width = mask.len_of(Axis(3));
    let x = crop_to(mixture, width)?;
    let y = crop_to(target, width)?;
    if x.shape() != mask.shape() {
        return Err(SeparationError::shape("loss mask", x.shape(), mask.shape()));
    }

    let numel = mask.len().max(1) as f32;
    let diff = Zip::from(&x)
        .and(&mask)
        .and(&y)
        .map_collect(|&x, &m, &y| x * m - y);

    let per_example = (diff.len() / diff.len_of(Axis(0)).max(1)).max(1) as f32;
    let instance_loss = diff
        .outer_iter()
        .map(|d| d.iter().map(|v| v.abs()).sum::<f32>() / per_example)
        .collect::<Array1<f32>>();
    let loss = diff.iter().map(|v| v.abs()).sum::<f32>() / numel;

    let grad_mask = Zip::from(&diff)
        .and(&x)
        .map_collect(|&d, &x| if d == 0.0 { 0.0 } else { d.signum() * x / numel });

    Ok(MaskedL1 {
        loss,
        instance_loss,
        grad_mask,
    })
}
