use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::config::{EncoderModelConfig, ExtractionConfig};
use crate::error::DataError;
use crate::model::latent_model::Wav2Vec2LatentModel;
use crate::pipeline::traits::LatentEncoder;

/// Model roots: bare `Wav2Vec2Model` checkpoints, then CTC/pretraining heads.
const ROOTS: [Option<&str>; 2] = [None, Some("wav2vec2")];
const PROBE_TENSOR: &str = "feature_extractor.conv_layers.0.conv.weight";

pub(crate) fn build_encoder_backend(
    config: &ExtractionConfig,
    model_cfg: &EncoderModelConfig,
) -> Result<Box<dyn LatentEncoder>, DataError> {
    if model_cfg.stride() != config.encoder_hop_size {
        return Err(DataError::config(format!(
            "encoder stride {} does not match encoder_hop_size {}",
            model_cfg.stride(),
            config.encoder_hop_size
        )));
    }
    if model_cfg.receptive_field() != config.window_size {
        return Err(DataError::config(format!(
            "encoder receptive field {} does not match window_size {}",
            model_cfg.receptive_field(),
            config.window_size
        )));
    }
    model_cfg.validate()?;
    Ok(Box::new(CandleEncoderBackend::load(config, model_cfg)?))
}

struct CandleEncoderBackend {
    model: Wav2Vec2LatentModel,
    channels: usize,
    device: Device,
}

impl CandleEncoderBackend {
    fn load(config: &ExtractionConfig, model_cfg: &EncoderModelConfig) -> Result<Self, DataError> {
        let device = match config.device.as_str() {
            "cuda" => Device::new_cuda(0).map_err(|e| DataError::tensor("CUDA init", e))?,
            _ => Device::Cpu,
        };

        let model_path = std::path::Path::new(&config.model_path);
        let model_data =
            std::fs::read(model_path).map_err(|e| DataError::io("read safetensors", model_path, e))?;
        let vb = VarBuilder::from_buffered_safetensors(model_data, DType::F32, &device)
            .map_err(|e| DataError::tensor("load safetensors", e))?;
        let vb = ROOTS
            .iter()
            .find_map(|root| {
                let vb = match root {
                    Some(root) => vb.pp(*root),
                    None => vb.clone(),
                };
                vb.contains_tensor(PROBE_TENSOR).then_some(vb)
            })
            .ok_or_else(|| DataError::config("checkpoint has no wav2vec2 model weights"))?;
        let model = Wav2Vec2LatentModel::load(model_cfg, vb)
            .map_err(|e| DataError::tensor("build wav2vec2 model", e))?;

        tracing::info!(
            conv_layers = model_cfg.conv_dim.len(),
            transformer_layers = model_cfg.num_hidden_layers,
            channels = model_cfg.output_channels(),
            stride = model_cfg.stride(),
            ?device,
            "wav2vec2 latent model loaded"
        );
        Ok(Self {
            model,
            channels: model_cfg.output_channels(),
            device,
        })
    }
}

impl LatentEncoder for CandleEncoderBackend {
    fn encode(&self, normalized_audio: &[f32]) -> Result<Tensor, DataError> {
        let audio = Tensor::from_vec(
            normalized_audio.to_vec(),
            (1, normalized_audio.len()),
            &self.device,
        )
        .map_err(|e| DataError::tensor("tensor creation", e))?;
        let latents = self
            .model
            .forward(&audio)
            .map_err(|e| DataError::tensor("forward pass", e))?;
        let channels = latents
            .dim(1)
            .map_err(|e| DataError::tensor("latent channel dim", e))?;
        if channels != self.channels {
            return Err(DataError::config(format!(
                "model produced {channels} channels, expected hidden_size {}",
                self.channels
            )));
        }
        Ok(latents)
    }

    fn device_label(&self) -> String {
        if self.device.is_cuda() {
            "cuda".to_string()
        } else {
            "cpu".to_string()
        }
    }
}
