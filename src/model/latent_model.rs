use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::EncoderModelConfig;
use crate::model::context_network::{ContextNetwork, FeatureProjection};
use crate::model::feature_encoder::ConvFeatureEncoder;

/// Bare wav2vec2 model up to its last hidden state.
pub(crate) struct Wav2Vec2LatentModel {
    feature_encoder: ConvFeatureEncoder,
    feature_projection: FeatureProjection,
    encoder: ContextNetwork,
}

impl Wav2Vec2LatentModel {
    /// `vb` points at the model root (`""` or `wav2vec2` in CTC checkpoints).
    pub(crate) fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            feature_encoder: ConvFeatureEncoder::load(cfg, vb.pp("feature_extractor"))?,
            feature_projection: FeatureProjection::load(cfg, vb.pp("feature_projection"))?,
            encoder: ContextNetwork::load(cfg, vb.pp("encoder"))?,
        })
    }

    /// `(batch, samples)` waveform to `(batch, hidden_size, frames)` latents.
    pub(crate) fn forward(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.feature_encoder.forward(audio)?.transpose(1, 2)?.contiguous()?;
        let hidden = self.feature_projection.forward(&features)?;
        self.encoder.forward(&hidden)?.transpose(1, 2)?.contiguous()
    }
}
