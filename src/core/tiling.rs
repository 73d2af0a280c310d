//! Sliding-window mask prediction with channel-flip test-time augmentation.

use ndarray::{concatenate, s, Array3, Array4, ArrayView3, ArrayView4, Axis};
use tracing::debug;

use crate::{
    core::padding::PaddingPlan,
    error::{Result, SeparationError},
    io::progress::{Progress, ProgressObserver},
};

/// Reverses the channel axis (axis 1) of a `[batch, channel, bin, frame]` array.
pub fn flip_channels<A: Clone>(batch: ArrayView4<A>) -> Array4<A> {
    batch.slice(s![.., ..;-1, .., ..]).to_owned()
}

/// Runs `predict` over every window of `padded` and stitches the averaged
/// tiles into a `[channel, bin, total_frames]` mask.
///
/// `predict` receives `[2, C, F, window_size]` (the window and its
/// channel-mirrored copy) and must return `[2, C, F, roi_size]`.
pub fn run_tiles<P>(
    padded: ArrayView3<f32>,
    plan: &PaddingPlan,
    mut predict: P,
    observer: &mut dyn ProgressObserver,
) -> Result<Array3<f32>>
where
    P: FnMut(ArrayView4<f32>) -> Result<Array4<f32>>,
{
    let (channels, bins, width) = padded.dim();
    if width != plan.padded_width() {
        return Err(SeparationError::shape(
            "padded spectrogram",
            &[channels, bins, plan.padded_width()],
            padded.shape(),
        ));
    }

    let total = plan.n_windows();
    let expected = [2, channels, bins, plan.roi_size];
    let mut tiles: Vec<Array3<f32>> = Vec::with_capacity(total);

    for j in 0..total {
        let start = plan.window_start(j);
        let window = padded.slice(s![.., .., start..start + plan.window_size]);
        let window = window.insert_axis(Axis(0));
        let mirrored = flip_channels(window);
        let batch = concatenate(Axis(0), &[window, mirrored.view()])?;

        let mut pred = predict(batch.view())?;
        if pred.shape() != &expected[..] {
            return Err(SeparationError::shape("mask prediction", &expected, pred.shape()));
        }

        let unflipped = pred.slice(s![1, ..;-1, .., ..]).to_owned();
        pred.index_axis_mut(Axis(0), 1).assign(&unflipped);

        let tile = pred
            .mean_axis(Axis(0))
            .ok_or_else(|| SeparationError::shape("mask prediction", &expected, &[0]))?;
        tiles.push(tile);

        observer.on_progress(Progress::Windows { done: j + 1, total });
    }

    debug!(windows = total, roi = plan.roi_size, "stitching mask tiles");

    let views: Vec<_> = tiles.iter().map(|t| t.view()).collect();
    let mask = concatenate(Axis(2), &views)?;
    Ok(mask.slice(s![.., .., ..plan.total_frames]).to_owned())
}
