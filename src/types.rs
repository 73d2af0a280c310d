use std::path::PathBuf;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::core::{dsp::to_planar, postprocess::UninformativeParams};

/// Interleaved samples as they come out of the decoder or go into a WAV file.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Planar waveform, `[channel, sample]`.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.ncols() == 0
    }

    pub fn from_audio_data(audio: &AudioData) -> Self {
        Self {
            samples: to_planar(&audio.samples, audio.channels),
            sample_rate: audio.sample_rate,
        }
    }

    pub fn to_audio_data(&self) -> AudioData {
        let mut samples = Vec::with_capacity(self.samples.len());
        for frame in self.samples.columns() {
            samples.extend(frame.iter().copied());
        }
        AudioData {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels() as u16,
        }
    }
}

/// Compute placement, decided once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Device {
    /// Negative indices select the CPU.
    pub fn from_gpu_index(gpu: i32) -> Self {
        u32::try_from(gpu).map(Device::Cuda).unwrap_or(Device::Cpu)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeparateOptions {
    pub output_dir: PathBuf,
    pub sample_rate: u32,
    pub hop_length: usize,
    pub window_size: usize,
    pub postprocess: bool,
    pub out_mask: bool,
    pub uninformative: UninformativeParams,
}

impl Default for SeparateOptions {
    fn default() -> Self {
        Self {
            output_dir: ".".into(),
            sample_rate: 44_100,
            hop_length: 1024,
            window_size: 512,
            postprocess: false,
            out_mask: false,
            uninformative: UninformativeParams::default(),
        }
    }
}

/// Separated stems plus the mask that produced them.
#[derive(Clone, Debug)]
pub struct Separation {
    pub instrumental: Waveform,
    pub vocal: Waveform,
    pub mask: Array3<f32>,
}

#[derive(Clone, Debug)]
pub struct SplitResult {
    pub instrumental_path: PathBuf,
    pub vocal_path: PathBuf,
    pub mask_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainOptions {
    pub seed: u64,
    pub sample_rate: u32,
    pub hop_length: usize,
    pub mixture_dataset: PathBuf,
    pub instrumental_dataset: PathBuf,
    pub validation_rate: f32,
    pub learning_rate: f32,
    pub lr_min: f32,
    pub lr_decay: f32,
    pub lr_decay_interval: usize,
    pub batch_size: usize,
    pub val_batch_size: usize,
    pub cropsize: usize,
    pub patches: usize,
    pub val_patches: usize,
    pub epochs: usize,
    pub inner_epochs: usize,
    pub oracle_rate: f32,
    pub oracle_drop_rate: f32,
    pub mixup: bool,
    pub mixup_alpha: f32,
    pub model_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            seed: 2019,
            sample_rate: 44_100,
            hop_length: 1024,
            mixture_dataset: PathBuf::new(),
            instrumental_dataset: PathBuf::new(),
            validation_rate: 0.1,
            learning_rate: 0.001,
            lr_min: 0.0001,
            lr_decay: 0.9,
            lr_decay_interval: 6,
            batch_size: 8,
            val_batch_size: 16,
            cropsize: 512,
            patches: 16,
            val_patches: 64,
            epochs: 80,
            inner_epochs: 4,
            oracle_rate: 0.0,
            oracle_drop_rate: 0.5,
            mixup: false,
            mixup_alpha: 0.4,
            model_dir: "models".into(),
            log_dir: ".".into(),
        }
    }
}
