//! # vocal-remover-core
//!
//! Spectrogram-masking vocal/instrumental separation: STFT codec, padded
//! sliding-window mask inference with channel-flip averaging, mask
//! post-processing, waveform reconstruction, and a training loop for models
//! that can be fitted in-process.

pub mod core;
pub mod error;
pub mod io;
pub mod model;
pub mod train;
pub mod types;

pub use crate::{
    core::{
        audio::{read_audio, write_audio},
        splitter::{separate_waveform, split_file},
    },
    error::{Result, SeparationError},
    io::progress::{Progress, ProgressObserver, SilentProgress},
    model::{load_model, ContextGateNet, MaskModel, OnnxMaskModel, TrainableModel},
    train::{train, Trainer, TrainingState},
    types::{AudioData, Device, SeparateOptions, Separation, SplitResult, TrainOptions, Waveform},
};
