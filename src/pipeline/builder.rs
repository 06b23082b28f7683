use std::path::Path;

use crate::config::{EncoderModelConfig, ExtractionConfig};
use crate::error::DataError;
use crate::pipeline::model_runtime::build_encoder_backend;
use crate::pipeline::runtime::FeatureExtractionPipeline;
use crate::pipeline::traits::LatentEncoder;

pub struct FeatureExtractorBuilder {
    config: ExtractionConfig,
    encoder: Option<Box<dyn LatentEncoder>>,
}

impl FeatureExtractorBuilder {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            encoder: None,
        }
    }

    pub fn with_encoder(mut self, encoder: Box<dyn LatentEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn build(self) -> Result<FeatureExtractionPipeline, DataError> {
        self.config.validate()?;
        let encoder = if let Some(encoder) = self.encoder {
            encoder
        } else {
            let model_cfg = EncoderModelConfig::load(Path::new(&self.config.config_path))?;
            build_encoder_backend(&self.config, &model_cfg)?
        };
        tracing::info!(
            sample_rate = self.config.sample_rate,
            hop_size = self.config.hop_size,
            window_size = self.config.window_size,
            encoder_hop_size = self.config.encoder_hop_size,
            device = %encoder.device_label(),
            "feature extraction pipeline ready"
        );
        Ok(FeatureExtractionPipeline::from_parts(self.config, encoder))
    }
}
