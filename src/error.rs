use std::path::PathBuf;

use thiserror::Error;

/// Central error type for the vocal-remover-core crate.
#[derive(Debug, Error)]
pub enum SeparationError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(
        "Dataset pairing mismatch: {mixtures} mixture files vs {instrumentals} instrumental files"
    )]
    DatasetPairing { mixtures: usize, instrumentals: usize },

    #[error("Dataset pairing mismatch: {mixture:?} and {instrumental:?} have different extensions")]
    MisalignedPair {
        mixture: PathBuf,
        instrumental: PathBuf,
    },

    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("No audio samples decoded from {0:?}")]
    EmptyAudio(PathBuf),
}

impl SeparationError {
    pub fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        SeparationError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for SeparationError {
    fn from(e: std::io::Error) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for SeparationError {
    fn from(e: serde_json::Error) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<ndarray::ShapeError> for SeparationError {
    fn from(e: ndarray::ShapeError) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<hound::Error> for SeparationError {
    fn from(e: hound::Error) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<image::ImageError> for SeparationError {
    fn from(e: image::ImageError) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<ndarray_npy::WriteNpzError> for SeparationError {
    fn from(e: ndarray_npy::WriteNpzError) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<ndarray_npy::ReadNpzError> for SeparationError {
    fn from(e: ndarray_npy::ReadNpzError) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<ndarray_npy::WriteNpyError> for SeparationError {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;
