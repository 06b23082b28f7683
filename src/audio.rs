//! Audio probing, decoding and resampling.
//!
//! WAV files are read with `hound`, FLAC files with `claxon`. Decoded audio is
//! downmixed to mono by averaging channels and resampled with a band-limited
//! sinc resampler from `rubato`.

use std::path::Path;

use claxon::FlacReader;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{DataError, Result};

/// Header-level facts about an audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// Samples per channel at the native rate.
    pub num_samples: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioFormat {
    Wav,
    Flac,
}

fn format_of(path: &Path) -> Result<AudioFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => Ok(AudioFormat::Wav),
        Some("flac") => Ok(AudioFormat::Flac),
        _ => Err(DataError::audio(path, "unsupported audio extension")),
    }
}

/// Read sample count and native rate without decoding samples.
pub fn probe(path: &Path) -> Result<AudioInfo> {
    match format_of(path)? {
        AudioFormat::Wav => {
            let reader = hound::WavReader::open(path).map_err(|e| DataError::audio(path, e))?;
            let spec = reader.spec();
            Ok(AudioInfo {
                num_samples: u64::from(reader.duration()),
                sample_rate: spec.sample_rate,
                channels: spec.channels,
            })
        }
        AudioFormat::Flac => {
            let reader = FlacReader::open(path).map_err(|e| DataError::audio(path, e))?;
            let info = reader.streaminfo();
            let num_samples = info
                .samples
                .ok_or_else(|| DataError::audio(path, "FLAC stream does not declare its length"))?;
            Ok(AudioInfo {
                num_samples,
                sample_rate: info.sample_rate,
                channels: info.channels as u16,
            })
        }
    }
}

/// Decode a file to mono f32 samples in [-1, 1]. Returns `(samples, native_rate)`.
pub fn decode(path: &Path) -> Result<(Vec<f32>, u32)> {
    match format_of(path)? {
        AudioFormat::Wav => decode_wav(path),
        AudioFormat::Flac => decode_flac(path),
    }
}

/// Decode a file and resample it to `target_rate`.
pub fn load(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let (samples, native_rate) = decode(path)?;
    resample(&samples, native_rate, target_rate)
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path).map_err(|e| DataError::audio(path, e))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DataError::audio(path, e))?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DataError::audio(path, e))?
        }
    };
    Ok((downmix(&interleaved, spec.channels as usize), spec.sample_rate))
}

fn decode_flac(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = FlacReader::open(path).map_err(|e| DataError::audio(path, e))?;
    let info = reader.streaminfo();
    let scale = (1u64 << (info.bits_per_sample - 1)) as f32;
    let interleaved = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DataError::audio(path, e))?;
    Ok((downmix(&interleaved, info.channels as usize), info.sample_rate))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Number of samples after resampling `num_samples` from `src_hz` to `dst_hz`.
pub fn resampled_len(num_samples: u64, src_hz: u32, dst_hz: u32) -> u64 {
    if src_hz == dst_hz {
        return num_samples;
    }
    num_samples * u64::from(dst_hz) / u64::from(src_hz)
}

/// Frames at `hop_size` of a recording with `num_samples` at `src_hz`, once resampled to `dst_hz`.
pub fn frame_length(num_samples: u64, src_hz: u32, dst_hz: u32, hop_size: usize) -> usize {
    (resampled_len(num_samples, src_hz, dst_hz) / hop_size as u64) as usize
}

const SINC_LEN: usize = 256;

/// Band-limited resampler. Output length is `resampled_len(input.len(), ..)` and
/// the filter delay is removed, so sample `i` of the output lines up with time
/// `i / dst_hz` of the input.
pub fn resample(input: &[f32], src_hz: u32, dst_hz: u32) -> Result<Vec<f32>> {
    if src_hz == dst_hz || input.is_empty() {
        return Ok(input.to_vec());
    }
    let out_len = resampled_len(input.len() as u64, src_hz, dst_hz) as usize;

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    // Trailing zeros flush the filter so the delayed tail is not cut off.
    let mut padded = Vec::with_capacity(input.len() + 2 * SINC_LEN);
    padded.extend_from_slice(input);
    padded.resize(input.len() + 2 * SINC_LEN, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(
        f64::from(dst_hz) / f64::from(src_hz),
        1.0,
        params,
        padded.len(),
        1,
    )
    .map_err(|e| DataError::resample(src_hz, dst_hz, e))?;
    let delay = resampler.output_delay();
    let channels = resampler
        .process(&[padded], None)
        .map_err(|e| DataError::resample(src_hz, dst_hz, e))?;

    let mut output: Vec<f32> = channels
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .skip(delay)
        .take(out_len)
        .collect();
    output.resize(out_len, 0.0);
    Ok(output)
}
