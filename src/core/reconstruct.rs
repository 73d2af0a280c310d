use ndarray::{Array3, Zip};

use crate::error::{Result, SeparationError};

/// Splits a normalised magnitude into `(instrumental, vocal)` magnitudes,
/// rescaled by `coeff`.
///
/// `instrumental + vocal` equals `magnitude * coeff` up to `f32` rounding;
/// individual elements may differ in the last ulp.
pub fn separate(
    magnitude: &Array3<f32>,
    mask: &Array3<f32>,
    coeff: f32,
) -> Result<(Array3<f32>, Array3<f32>)> {
    if magnitude.shape() != mask.shape() {
        return Err(SeparationError::shape(
            "reconstruction",
            magnitude.shape(),
            mask.shape(),
        ));
    }

    let instrumental = Zip::from(magnitude)
        .and(mask)
        .map_collect(|&x, &m| x * m * coeff);
    let vocal = Zip::from(magnitude)
        .and(mask)
        .map_collect(|&x, &m| x * (1.0 - m) * coeff);

    Ok((instrumental, vocal))
}
