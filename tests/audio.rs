use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::tempdir;
use vocal_remover_core::{
    core::audio::{load_waveform, resample},
    read_audio, write_audio, AudioData, Waveform,
};

#[test]
fn wav_round_trip_keeps_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    let samples: Vec<f32> = (0..2000).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
    let audio = AudioData {
        samples: samples.clone(),
        sample_rate: 16_000,
        channels: 2,
    };
    write_audio(&path, &audio).unwrap();

    let back = read_audio(&path).unwrap();
    assert_eq!(back.sample_rate, 16_000);
    assert_eq!(back.channels, 2);
    assert_eq!(back.samples.len(), samples.len());
    for (a, b) in back.samples.iter().zip(samples.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }

    let wave = Waveform::from_audio_data(&back);
    assert_eq!(wave.samples.dim(), (2, 1000));
    assert_abs_diff_eq!(wave.samples[[1, 0]], samples[1], epsilon = 1e-3);
}

#[test]
fn resample_scales_length() {
    let wave = Array2::from_shape_fn((2, 44_100), |(c, i)| {
        (2.0 * std::f32::consts::PI * 440.0 * (c + 1) as f32 * i as f32 / 44_100.0).sin() * 0.5
    });
    let out = resample(&wave, 44_100, 22_050).unwrap();
    assert_eq!(out.dim(), (2, 22_050));
    let peak = out.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
    assert!(peak > 0.4 && peak < 0.6, "peak {peak}");

    let same = resample(&wave, 44_100, 44_100).unwrap();
    assert_eq!(same, wave);
}

#[test]
fn empty_file_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.wav");
    write_audio(
        &path,
        &AudioData {
            samples: Vec::new(),
            sample_rate: 8000,
            channels: 1,
        },
    )
    .unwrap();

    assert!(load_waveform(&path, 8000).is_err());
}

#[test]
fn load_waveform_upsamples_to_requested_rate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("low.wav");
    let samples: Vec<f32> = (0..11_025)
        .flat_map(|i| {
            let v = 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 11_025.0).sin();
            [v, -v]
        })
        .collect();
    write_audio(
        &path,
        &AudioData {
            samples,
            sample_rate: 11_025,
            channels: 2,
        },
    )
    .unwrap();

    let wave = load_waveform(&path, 22_050).unwrap();
    assert_eq!(wave.sample_rate, 22_050);
    assert_eq!(wave.samples.dim(), (2, 22_050));
    let peak = wave.samples.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
    assert!(peak > 0.4 && peak < 0.6, "peak {peak}");
    for (l, r) in wave.samples.row(0).iter().zip(wave.samples.row(1).iter()) {
        assert_abs_diff_eq!(*l, -*r, epsilon = 1e-3);
    }
}
