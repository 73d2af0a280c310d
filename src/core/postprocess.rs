//! Mask refinement for stretches where the vocal estimate carries almost no
//! energy: those frames are pushed back to "instrumental" (mask = 1).

use ndarray::{s, Array1, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeparationError};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UninformativeParams {
    /// Mean reference energy per frame below which a frame counts as quiet.
    pub threshold: f32,
    /// Quiet runs must be longer than this many frames.
    pub min_range: usize,
    /// Length of the linear ramps at run edges.
    pub fade_area: usize,
}

impl Default for UninformativeParams {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_range: 64,
            fade_area: 32,
        }
    }
}

/// Maximal runs `[start, end)` of frames whose energy is below `threshold`.
fn quiet_runs(energy: &Array1<f32>, threshold: f32) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (t, &e) in energy.iter().enumerate() {
        match (e < threshold, start) {
            (true, None) => start = Some(t),
            (false, Some(s)) => {
                runs.push((s, t));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, energy.len()));
    }
    runs
}

fn add_ramp(mask: &mut Array3<f32>, start: usize, ramp: impl Iterator<Item = f32>) {
    for (i, r) in ramp.enumerate() {
        mask.slice_mut(s![.., .., start + i])
            .mapv_inplace(|m| (m + r).clamp(0.0, 1.0));
    }
}

fn ramp_value(i: usize, n: usize) -> f32 {
    if n <= 1 {
        0.0
    } else {
        i as f32 / (n - 1) as f32
    }
}

/// Forces the mask to 1 over long stretches where `reference` (a vocal
/// magnitude estimate with the same shape as `mask`) is quiet.
pub fn mask_uninformative(
    mask: &Array3<f32>,
    reference: &Array3<f32>,
    params: &UninformativeParams,
) -> Result<Array3<f32>> {
    if params.min_range < params.fade_area * 2 {
        return Err(SeparationError::Config(format!(
            "min_range ({}) must be at least twice fade_area ({})",
            params.min_range, params.fade_area
        )));
    }
    if mask.shape() != reference.shape() {
        return Err(SeparationError::shape(
            "uninformative reference",
            mask.shape(),
            reference.shape(),
        ));
    }

    let mut refined = mask.clone();
    let frames = mask.len_of(Axis(2));
    if frames == 0 {
        return Ok(refined);
    }

    let energy = reference
        .mean_axis(Axis(0))
        .and_then(|per_bin| per_bin.mean_axis(Axis(0)))
        .unwrap_or_else(|| Array1::zeros(frames));

    let fade = params.fade_area;
    let mut prev_end: Option<usize> = None;

    for (start, end) in quiet_runs(&energy, params.threshold) {
        if end - start <= params.min_range {
            continue;
        }

        let fill_start = match prev_end {
            // Close to the previous run: bridge the gap over its fade-out.
            Some(prev) if start - prev < fade => prev.saturating_sub(fade),
            _ if start == 0 => 0,
            _ => {
                add_ramp(&mut refined, start, (0..fade).map(|i| ramp_value(i, fade)));
                start + fade
            }
        };
        let fill_end = if end == frames {
            frames
        } else {
            add_ramp(
                &mut refined,
                end - fade,
                (0..fade).map(|i| 1.0 - ramp_value(i, fade)),
            );
            end - fade
        };
        if fill_start < fill_end {
            refined.slice_mut(s![.., .., fill_start..fill_end]).fill(1.0);
        }
        prev_end = Some(end);
    }

    Ok(refined)
}
