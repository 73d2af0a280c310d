use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::{Array3, Axis};

use crate::error::{Result, SeparationError};

// Magma colour map sampled at nine evenly spaced stops.
const MAGMA: [[f32; 3]; 9] = [
    [0.0, 0.0, 4.0],
    [28.0, 16.0, 68.0],
    [79.0, 18.0, 123.0],
    [129.0, 37.0, 129.0],
    [181.0, 54.0, 122.0],
    [229.0, 80.0, 100.0],
    [251.0, 135.0, 97.0],
    [254.0, 194.0, 135.0],
    [252.0, 253.0, 191.0],
];

fn magma(level: u8) -> Rgb<u8> {
    let x = f32::from(level) / 255.0 * (MAGMA.len() - 1) as f32;
    let lo = (x.floor() as usize).min(MAGMA.len() - 2);
    let frac = x - lo as f32;
    let (a, b) = (MAGMA[lo], MAGMA[lo + 1]);
    Rgb([0, 1, 2].map(|i| (a[i] + (b[i] - a[i]) * frac).round() as u8))
}

/// Renders the vocal activity `(1 - mask)`, averaged over channels, with time
/// running left to right and low bins at the bottom. This is the usual
/// spectrogram orientation, not a time-reversed raw dump of the array.
pub fn render_mask(mask: &Array3<f32>) -> Result<RgbImage> {
    let vocal = mask
        .mean_axis(Axis(0))
        .ok_or_else(|| SeparationError::Config("cannot render a mask with no channels".into()))?
        .mapv(|m| ((1.0 - m).clamp(0.0, 1.0) * 255.0) as u8);
    let (bins, frames) = vocal.dim();

    Ok(RgbImage::from_fn(frames as u32, bins as u32, |x, y| {
        magma(vocal[[bins - 1 - y as usize, x as usize]])
    }))
}

pub fn write_mask_png(path: &Path, mask: &Array3<f32>) -> Result<()> {
    render_mask(mask)?.save(path)?;
    Ok(())
}
