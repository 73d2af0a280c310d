//! Padding geometry for the sliding-window mask pass.
//!
//! A window of `window_size` frames yields `roi_size = window_size - 2*offset`
//! usable frames; windows are stepped by `roi_size` over the padded
//! spectrogram, so `left_pad = offset` lines the first usable frame up with
//! frame 0 of the signal.

use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeparationError};

/// A window must keep at least one frame after the model eats `offset`
/// frames from each side.
pub fn check_geometry(window_size: usize, offset: usize) -> Result<()> {
    if window_size <= offset * 2 {
        return Err(SeparationError::Config(format!(
            "window size {window_size} leaves no usable frames with model offset {offset}"
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingPlan {
    pub left_pad: usize,
    pub right_pad: usize,
    pub roi_size: usize,
    pub total_frames: usize,
    pub window_size: usize,
}

impl PaddingPlan {
    pub fn new(
        total_frames: usize,
        window_size: usize,
        offset: usize,
        conv_offset: usize,
    ) -> Result<Self> {
        check_geometry(window_size, offset)?;
        if total_frames == 0 {
            return Err(SeparationError::Config(
                "cannot plan windows over an empty spectrogram".into(),
            ));
        }

        let roi_size = window_size - offset * 2;
        let n_windows = total_frames.div_ceil(roi_size);
        let right_pad = n_windows * roi_size - total_frames + offset + conv_offset;

        Ok(Self {
            left_pad: offset,
            right_pad,
            roi_size,
            total_frames,
            window_size,
        })
    }

    pub fn n_windows(&self) -> usize {
        self.total_frames.div_ceil(self.roi_size)
    }

    pub fn padded_width(&self) -> usize {
        self.left_pad + self.total_frames + self.right_pad
    }

    /// Start column of window `j` in the padded spectrogram.
    pub fn window_start(&self, j: usize) -> usize {
        j * self.roi_size
    }
}

/// Zero-pads `[channel, bin, frame]` along the frame axis.
pub fn pad_time(spec: ArrayView3<f32>, left: usize, right: usize) -> Array3<f32> {
    let (channels, bins, frames) = spec.dim();
    let mut padded = Array3::zeros((channels, bins, left + frames + right));
    padded.slice_mut(s![.., .., left..left + frames]).assign(&spec);
    padded
}
