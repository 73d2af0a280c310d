use approx::assert_abs_diff_eq;
use ndarray::{s, Array2, Array4, ArrayView4};
use tempfile::tempdir;
use vocal_remover_core::{
    separate_waveform, split_file, MaskModel, Progress, Result, SeparateOptions, SeparationError,
    SilentProgress, Waveform,
};

/// Keeps everything as instrumental.
struct PassThrough {
    offset: usize,
}

impl MaskModel for PassThrough {
    fn offset(&self) -> usize {
        self.offset
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, c, f, w) = batch.dim();
        Ok(Array4::ones((n, c, f, w - 2 * self.offset)))
    }
}

/// Splits every bin evenly between the stems.
struct Halves;

impl MaskModel for Halves {
    fn offset(&self) -> usize {
        4
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let w = batch.shape()[3];
        Ok(batch.slice(s![.., .., .., 4..w - 4]).mapv(|_| 0.5))
    }
}

fn sine_wave(channels: usize, len: usize, sample_rate: u32) -> Waveform {
    let samples = Array2::from_shape_fn((channels, len), |(c, i)| {
        let freq = 440.0 * (c + 1) as f32;
        0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
    });
    Waveform::new(samples, sample_rate)
}

#[test]
fn identity_mask_returns_the_input_as_instrumental() {
    let wave = sine_wave(1, 5 * 44_100, 44_100);
    let options = SeparateOptions {
        hop_length: 1024,
        window_size: 512,
        ..Default::default()
    };

    let separation =
        separate_waveform(&wave, &options, &mut PassThrough { offset: 0 }, &mut SilentProgress)
            .unwrap();

    assert_eq!(separation.instrumental.samples.dim(), wave.samples.dim());
    assert_eq!(separation.vocal.samples.dim(), wave.samples.dim());
    for (a, b) in separation
        .instrumental
        .samples
        .iter()
        .zip(wave.samples.iter())
    {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
    assert!(separation.vocal.samples.iter().all(|v| v.abs() < 1e-6));
    assert!(separation.mask.iter().all(|&m| m == 1.0));
}

#[test]
fn stems_add_up_to_the_mixture() {
    let wave = sine_wave(2, 20_000, 16_000);
    let options = SeparateOptions {
        hop_length: 256,
        window_size: 32,
        postprocess: true,
        ..Default::default()
    };

    let separation = separate_waveform(&wave, &options, &mut Halves, &mut SilentProgress).unwrap();

    for ((i, v), x) in separation
        .instrumental
        .samples
        .iter()
        .zip(separation.vocal.samples.iter())
        .zip(wave.samples.iter())
    {
        assert_abs_diff_eq!(i + v, *x, epsilon = 2e-3);
    }
}

#[test]
fn window_smaller_than_model_context_fails_before_work() {
    let wave = sine_wave(1, 4096, 8000);
    let options = SeparateOptions {
        hop_length: 64,
        window_size: 8,
        ..Default::default()
    };
    let err = separate_waveform(&wave, &options, &mut Halves, &mut SilentProgress).unwrap_err();
    assert!(matches!(err, SeparationError::Config(_)));
}

#[test]
fn split_file_writes_named_stems_and_mask() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&input, spec).unwrap();
    let len = 22_050;
    for i in 0..len {
        let t = i as f32 / 22_050.0;
        writer
            .write_sample((0.3 * (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 32767.0) as i16)
            .unwrap();
        writer
            .write_sample((0.2 * (2.0 * std::f32::consts::PI * 550.0 * t).sin() * 32767.0) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();

    let out_dir = dir.path().join("out");
    let options = SeparateOptions {
        output_dir: out_dir.clone(),
        sample_rate: 22_050,
        hop_length: 512,
        window_size: 64,
        out_mask: true,
        ..Default::default()
    };

    let mut stages = Vec::new();
    let mut observer = |p: Progress<'_>| {
        if let Progress::Stage(stage) = p {
            stages.push(stage.to_string());
        }
    };
    let result = split_file(&input, &options, &mut PassThrough { offset: 2 }, &mut observer).unwrap();

    assert_eq!(result.instrumental_path, out_dir.join("song_Instrumental.wav"));
    assert_eq!(result.vocal_path, out_dir.join("song_Vocal.wav"));
    assert_eq!(result.mask_path.as_deref(), Some(out_dir.join("mask.png").as_path()));
    assert!(out_dir.join("mask.png").exists());

    for path in [&result.instrumental_path, &result.vocal_path] {
        let reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.duration() as usize, len);
    }
    assert_eq!(stages.first().map(String::as_str), Some("read_audio"));
    assert_eq!(stages.last().map(String::as_str), Some("finalize"));
}

#[test]
fn split_file_reports_missing_input() {
    let dir = tempdir().unwrap();
    let options = SeparateOptions {
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let missing = dir.path().join("nope.wav");
    assert!(split_file(&missing, &options, &mut PassThrough { offset: 0 }, &mut SilentProgress).is_err());
}
