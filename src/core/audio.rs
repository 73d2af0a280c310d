use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use hound::WavWriter;
use ndarray::Array2;
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::{
    error::SeparationError,
    types::{AudioData, Waveform},
};

const RESAMPLE_CHUNK: usize = 4096;
const SINC_LEN: usize = 256;

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();

    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unsupported audio format: {:?}", path))?;

    let mut format = probed.format;
    let track = format.default_track().context("No default track found")?;
    let track_id = track.id;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(timestamp = packet.ts, reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        samples = samples.len(),
        "read audio"
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

pub fn write_audio<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let path = path.as_ref();
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for sample in &audio.samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Band-limited sample-rate conversion of `[channel, sample]` audio.
pub fn resample(samples: &Array2<f32>, from: u32, to: u32) -> Result<Array2<f32>> {
    if from == to || samples.ncols() == 0 {
        return Ok(samples.clone());
    }
    anyhow::ensure!(from > 0 && to > 0, "invalid sample rates {from} -> {to}");

    let ratio = f64::from(to) / f64::from(from);
    let channels = samples.nrows();
    let params = InterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: InterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, channels)
        .context("Failed to create resampler")?;

    let expected = (samples.ncols() as f64 * ratio).round() as usize;
    let delay = ((SINC_LEN / 2) as f64 * ratio).round() as usize;

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut chunk = vec![vec![0.0f32; RESAMPLE_CHUNK]; channels];
    let mut pos = 0usize;

    while out[0].len() < expected + delay {
        for (ch, buf) in chunk.iter_mut().enumerate() {
            for (i, v) in buf.iter_mut().enumerate() {
                *v = samples.get((ch, pos + i)).copied().unwrap_or(0.0);
            }
        }
        let processed = resampler
            .process(&chunk, None)
            .context("Resampling failed")?;
        for (dst, src) in out.iter_mut().zip(processed) {
            dst.extend(src);
        }
        pos += RESAMPLE_CHUNK;
    }

    Ok(Array2::from_shape_fn((channels, expected), |(ch, i)| {
        out[ch][delay + i]
    }))
}

/// Decodes `path` and converts it to `sample_rate`.
pub fn load_waveform(path: &Path, sample_rate: u32) -> crate::error::Result<Waveform> {
    let audio = read_audio(path)?;
    if audio.samples.is_empty() {
        return Err(SeparationError::EmptyAudio(path.to_path_buf()));
    }
    let wave = Waveform::from_audio_data(&audio);
    let samples = resample(&wave.samples, wave.sample_rate, sample_rate)?;
    Ok(Waveform::new(samples, sample_rate))
}

pub fn write_waveform(path: &Path, wave: &Waveform) -> crate::error::Result<()> {
    write_audio(path, &wave.to_audio_data())?;
    Ok(())
}
