use std::{fs, path::Path};

use anyhow::Context;
use tracing::info;

use crate::{
    core::{
        audio::{load_waveform, write_waveform},
        dsp,
        padding::{check_geometry, pad_time, PaddingPlan},
        postprocess::mask_uninformative,
        reconstruct::separate,
        tiling::run_tiles,
    },
    error::{Result, SeparationError},
    io::{
        mask_image::write_mask_png,
        progress::{Progress, ProgressObserver},
    },
    model::MaskModel,
    types::{SeparateOptions, Separation, SplitResult, Waveform},
};

/// Runs the full masking pipeline on an in-memory waveform.
pub fn separate_waveform(
    wave: &Waveform,
    options: &SeparateOptions,
    model: &mut dyn MaskModel,
    observer: &mut dyn ProgressObserver,
) -> Result<Separation> {
    check_geometry(options.window_size, model.offset())?;
    if wave.is_empty() || wave.channels() == 0 {
        return Err(SeparationError::Config("cannot separate an empty waveform".into()));
    }

    observer.on_progress(Progress::Stage("stft"));
    let (mut magnitude, phase) = dsp::forward(wave.samples.view(), options.hop_length, true)?;
    let phase = phase.context("forward transform returned no phase")?;

    let peak = magnitude.fold(0.0f32, |acc, &x| acc.max(x));
    let coeff = if peak > 0.0 { peak } else { 1.0 };
    magnitude.mapv_inplace(|x| x / coeff);

    let frames = magnitude.len_of(ndarray::Axis(2));
    let plan = PaddingPlan::new(
        frames,
        options.window_size,
        model.offset(),
        model.conv_offset(),
    )?;
    let padded = pad_time(magnitude.view(), plan.left_pad, plan.right_pad);
    info!(
        frames,
        windows = plan.n_windows(),
        roi = plan.roi_size,
        coeff,
        "predicting mask"
    );

    observer.on_progress(Progress::Stage("infer"));
    let mut mask = run_tiles(padded.view(), &plan, |batch| model.predict(batch), observer)?;

    if options.postprocess {
        observer.on_progress(Progress::Stage("postprocess"));
        let (_, vocal_reference) = separate(&magnitude, &mask, coeff)?;
        mask = mask_uninformative(&mask, &vocal_reference, &options.uninformative)?;
    }

    let (instrumental, vocal) = separate(&magnitude, &mask, coeff)?;

    observer.on_progress(Progress::Stage("istft"));
    let length = Some(wave.len());
    let hop = options.hop_length;
    let (instrumental, vocal) = rayon::join(
        || dsp::inverse(&instrumental, &phase, hop, length),
        || dsp::inverse(&vocal, &phase, hop, length),
    );

    Ok(Separation {
        instrumental: Waveform::new(instrumental?, wave.sample_rate),
        vocal: Waveform::new(vocal?, wave.sample_rate),
        mask,
    })
}

/// Decodes `input_path`, separates it and writes
/// `<basename>_Instrumental.wav`, `<basename>_Vocal.wav` and optionally
/// `mask.png` into `options.output_dir`.
pub fn split_file(
    input_path: &Path,
    options: &SeparateOptions,
    model: &mut dyn MaskModel,
    observer: &mut dyn ProgressObserver,
) -> Result<SplitResult> {
    fs::metadata(input_path)
        .with_context(|| format!("File does not exist: {:?}", input_path))?;
    check_geometry(options.window_size, model.offset())?;

    observer.on_progress(Progress::Stage("read_audio"));
    let wave = load_waveform(input_path, options.sample_rate)?;
    info!(
        path = %input_path.display(),
        channels = wave.channels(),
        samples = wave.len(),
        sample_rate = wave.sample_rate,
        "loaded wave source"
    );

    let separation = separate_waveform(&wave, options, model, observer)?;

    observer.on_progress(Progress::Stage("write_stems"));
    fs::create_dir_all(&options.output_dir)?;
    let basename = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let instrumental_path = options
        .output_dir
        .join(format!("{basename}_Instrumental.wav"));
    let vocal_path = options.output_dir.join(format!("{basename}_Vocal.wav"));
    write_waveform(&instrumental_path, &separation.instrumental)?;
    write_waveform(&vocal_path, &separation.vocal)?;

    let mask_path = if options.out_mask {
        let path = options.output_dir.join("mask.png");
        write_mask_png(&path, &separation.mask)?;
        Some(path)
    } else {
        None
    };

    observer.on_progress(Progress::Stage("finalize"));
    Ok(SplitResult {
        instrumental_path,
        vocal_path,
        mask_path,
    })
}
