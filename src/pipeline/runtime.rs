use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use indicatif::{ProgressBar, ProgressStyle};

use crate::audio;
use crate::config::ExtractionConfig;
use crate::data::FEATURE_TENSOR_KEY;
use crate::error::{DataError, Result};
use crate::pipeline::traits::LatentEncoder;

/// Waveform to fixed-hop latents, owning its encoder handle.
///
/// The latent time axis always has `floor(resampled_len / hop_size)` frames, the
/// same grid used for dataset lengths and phoneme labels.
pub struct FeatureExtractionPipeline {
    config: ExtractionConfig,
    encoder: Box<dyn LatentEncoder>,
}

impl FeatureExtractionPipeline {
    pub(crate) fn from_parts(config: ExtractionConfig, encoder: Box<dyn LatentEncoder>) -> Self {
        Self { config, encoder }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn device_label(&self) -> String {
        self.encoder.device_label()
    }

    /// Frames emitted for `num_samples` samples at the pipeline rate.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.config.hop_size
    }

    /// Latents of shape `(1, channels, frames)` for `waveform` sampled at `source_rate`.
    pub fn extract(&self, waveform: &[f32], source_rate: u32) -> Result<Tensor> {
        let audio = audio::resample(waveform, source_rate, self.config.sample_rate)?;
        if audio.len() < self.config.window_size {
            return Err(DataError::invalid_input(format!(
                "waveform of {} samples is shorter than the {}-sample encoder window",
                audio.len(),
                self.config.window_size
            )));
        }

        let pad = self.config.padding();
        let mut padded = vec![0.0f32; audio.len() + 2 * pad];
        padded[pad..pad + audio.len()].copy_from_slice(&audio);
        let normalized = normalize_audio(&padded);

        let latents = self
            .encoder
            .encode(&normalized)?
            .to_device(&Device::Cpu)
            .map_err(|e| DataError::tensor("move latents to host", e))?;
        let (_, _, encoder_frames) = latents
            .dims3()
            .map_err(|e| DataError::tensor("latent dims3", e))?;
        let expected = audio.len() / self.config.encoder_hop_size;
        if encoder_frames != expected {
            return Err(DataError::FrameMismatch {
                context: "encoder output (window/hop misconfiguration)",
                expected,
                actual: encoder_frames,
            });
        }

        let frames = self.num_frames(audio.len());
        let upsampled = upsample_nearest(&latents, frames)?;
        let actual = upsampled
            .dim(2)
            .map_err(|e| DataError::tensor("latent time dim", e))?;
        if actual != frames {
            return Err(DataError::FrameMismatch {
                context: "latent upsampling",
                expected: frames,
                actual,
            });
        }
        Ok(upsampled)
    }

    pub fn from_file(&self, audio_file: &Path) -> Result<Tensor> {
        let (samples, sample_rate) = audio::decode(audio_file)?;
        self.extract(&samples, sample_rate)
    }

    /// Extract and store latents as f16 safetensors under the feature tensor key.
    pub fn from_file_to_file(&self, audio_file: &Path, output_file: &Path) -> Result<()> {
        let latents = self
            .from_file(audio_file)?
            .to_dtype(DType::F16)
            .map_err(|e| DataError::tensor("cast latents to f16", e))?;
        tracing::debug!(
            input = %audio_file.display(),
            output = %output_file.display(),
            frames = latents.dims().last().copied().unwrap_or(0),
            "extracted latents"
        );
        let tensors: HashMap<String, Tensor> =
            [(FEATURE_TENSOR_KEY.to_string(), latents)].into_iter().collect();
        candle_core::safetensors::save(&tensors, output_file)
            .map_err(|e| DataError::tensor("save latents", e))
    }

    /// Process `(input, output)` pairs in order. Each output is written exactly once.
    pub fn from_files_to_files(&self, pairs: &[(PathBuf, PathBuf)]) -> Result<()> {
        let progress = ProgressBar::new(pairs.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        progress.set_message("extracting latents");
        for (audio_file, output_file) in pairs {
            self.from_file_to_file(audio_file, output_file)?;
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(())
    }
}

/// Resample `(batch, channels, frames)` along time to `target` frames, nearest neighbour.
pub(crate) fn upsample_nearest(latents: &Tensor, target: usize) -> Result<Tensor> {
    let source = latents
        .dim(2)
        .map_err(|e| DataError::tensor("latent time dim", e))?;
    if source == 0 {
        return Err(DataError::FrameMismatch {
            context: "encoder produced no frames",
            expected: target,
            actual: 0,
        });
    }
    let scale = source as f64 / target.max(1) as f64;
    let index: Vec<u32> = (0..target)
        .map(|i| ((i as f64 * scale).floor() as usize).min(source - 1) as u32)
        .collect();
    let index = Tensor::new(index.as_slice(), latents.device())
        .map_err(|e| DataError::tensor("upsample index", e))?;
    latents
        .index_select(&index, 2)
        .map_err(|e| DataError::tensor("upsample latents", e))
}

/// Zero-mean, unit-variance normalisation of the encoder input.
fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let n = samples.len().max(1) as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = (var + 1e-7).sqrt();
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}
