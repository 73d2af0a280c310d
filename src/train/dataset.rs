//! Paired mixture/instrumental datasets and random spectrogram patches.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ndarray::{s, Array3, Array4, ArrayView3, Axis};
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

use crate::{
    core::{
        audio::load_waveform,
        dsp,
        padding::{pad_time, PaddingPlan},
    },
    error::{Result, SeparationError},
};

pub const INPUT_EXTENSIONS: &[&str] = &["wav", "m4a", "3gp", "oma", "mp3", "mp4"];

/// A mixture file and its instrumental counterpart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePair {
    pub mixture: PathBuf,
    pub instrumental: PathBuf,
}

/// Cropped training examples, `[example, channel, bin, frame]`.
#[derive(Clone, Debug)]
pub struct PatchSet {
    pub mixture: Array4<f32>,
    pub instrumental: Array4<f32>,
}

impl PatchSet {
    pub fn len(&self) -> usize {
        self.mixture.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the examples at `indices` into a new set, in that order.
    pub fn select(&self, indices: &[usize]) -> PatchSet {
        PatchSet {
            mixture: self.mixture.select(Axis(0), indices),
            instrumental: self.instrumental.select(Axis(0), indices),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Audio files directly inside `dir`, sorted by path.
pub fn list_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let known = extension(&path).is_some_and(|e| INPUT_EXTENSIONS.contains(&e.as_str()));
        if path.is_file() && known {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pairs both listings by sorted position.
pub fn pair_datasets(mixture_dir: &Path, instrumental_dir: &Path) -> Result<Vec<FilePair>> {
    let mixtures = list_audio_files(mixture_dir)?;
    let instrumentals = list_audio_files(instrumental_dir)?;
    if mixtures.len() != instrumentals.len() {
        return Err(SeparationError::DatasetPairing {
            mixtures: mixtures.len(),
            instrumentals: instrumentals.len(),
        });
    }

    mixtures
        .into_iter()
        .zip(instrumentals)
        .map(|(mixture, instrumental)| {
            if extension(&mixture) != extension(&instrumental) {
                return Err(SeparationError::MisalignedPair {
                    mixture,
                    instrumental,
                });
            }
            Ok(FilePair {
                mixture,
                instrumental,
            })
        })
        .collect()
}

/// Shuffles and splits off `floor(len * rate)` pairs for validation.
pub fn split_train_valid<R: Rng + ?Sized>(
    mut pairs: Vec<FilePair>,
    validation_rate: f32,
    rng: &mut R,
) -> Result<(Vec<FilePair>, Vec<FilePair>)> {
    let val_size = (pairs.len() as f32 * validation_rate) as usize;
    if val_size == 0 || val_size >= pairs.len() {
        return Err(SeparationError::Config(format!(
            "validation rate {validation_rate} over {} pairs leaves an empty training or validation split",
            pairs.len()
        )));
    }
    pairs.shuffle(rng);
    let valid = pairs.split_off(pairs.len() - val_size);
    Ok((pairs, valid))
}

/// Magnitudes of one pair, trimmed to the shorter file and normalised by their
/// joint peak.
pub fn load_pair(
    pair: &FilePair,
    sample_rate: u32,
    hop_length: usize,
) -> Result<(Array3<f32>, Array3<f32>)> {
    let mixture = load_waveform(&pair.mixture, sample_rate)?;
    let instrumental = load_waveform(&pair.instrumental, sample_rate)?;
    if mixture.channels() != instrumental.channels() {
        return Err(SeparationError::shape(
            "paired channel count",
            &[mixture.channels()],
            &[instrumental.channels()],
        ));
    }

    let len = mixture.len().min(instrumental.len());
    let (x, _) = dsp::forward(mixture.samples.slice(s![.., ..len]), hop_length, false)?;
    let (y, _) = dsp::forward(instrumental.samples.slice(s![.., ..len]), hop_length, false)?;

    let peak = x.iter().chain(y.iter()).fold(0.0f32, |acc, &v| acc.max(v));
    let coeff = if peak > 0.0 { peak } else { 1.0 };
    Ok((x.mapv(|v| v / coeff), y.mapv(|v| v / coeff)))
}

fn crop(
    spec: &Array3<f32>,
    start: usize,
    width: usize,
    swap_channels: bool,
) -> ArrayView3<'_, f32> {
    let window = spec.slice(s![.., .., start..start + width]);
    if swap_channels {
        window.slice_move(s![..;-1, .., ..])
    } else {
        window
    }
}

/// Cuts `patches` random `cropsize`-frame crops out of every pair.
///
/// Training patches get their channels swapped with probability one half.
pub fn create_patches<R: Rng + ?Sized>(
    pairs: &[FilePair],
    cropsize: usize,
    patches: usize,
    sample_rate: u32,
    hop_length: usize,
    validation: bool,
    rng: &mut R,
) -> Result<PatchSet> {
    let mut mixture: Option<Array4<f32>> = None;
    let mut instrumental: Option<Array4<f32>> = None;

    for (i, pair) in pairs.iter().enumerate() {
        let (x, y) = load_pair(pair, sample_rate, hop_length)?;
        let (channels, bins, frames) = x.dim();
        let mix = mixture.get_or_insert_with(|| {
            Array4::zeros((pairs.len() * patches, channels, bins, cropsize))
        });
        let inst = instrumental.get_or_insert_with(|| {
            Array4::zeros((pairs.len() * patches, channels, bins, cropsize))
        });
        if mix.shape()[1..] != [channels, bins, cropsize] {
            return Err(SeparationError::shape(
                "training patch",
                &mix.shape()[1..],
                &[channels, bins, cropsize],
            ));
        }

        let plan = PaddingPlan::new(frames, cropsize, 0, 0)?;
        let x_pad = pad_time(x.view(), plan.left_pad, plan.right_pad);
        let y_pad = pad_time(y.view(), plan.left_pad, plan.right_pad);
        let max_start = plan.padded_width() - cropsize;

        for j in 0..patches {
            let idx = i * patches + j;
            let start = rng.gen_range(0..=max_start);
            let swap = !validation && rng.gen_bool(0.5);
            mix.index_axis_mut(Axis(0), idx)
                .assign(&crop(&x_pad, start, cropsize, swap));
            inst.index_axis_mut(Axis(0), idx)
                .assign(&crop(&y_pad, start, cropsize, swap));
        }
        debug!(path = %pair.mixture.display(), frames, "cropped patches");
    }

    let (mixture, instrumental) = mixture
        .zip(instrumental)
        .ok_or_else(|| SeparationError::Config("no file pairs to build patches from".into()))?;
    info!(examples = mixture.len_of(Axis(0)), validation, "built patch set");
    Ok(PatchSet {
        mixture,
        instrumental,
    })
}
