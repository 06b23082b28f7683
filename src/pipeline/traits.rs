use candle_core::Tensor;

use crate::error::DataError;

/// Pretrained acoustic encoder consumed as an opaque capability.
///
/// Receives the padded, normalised waveform at the pipeline's sample rate and
/// returns `(1, channels, frames)` latents, one frame per internal stride.
pub trait LatentEncoder: Send + Sync {
    fn encode(&self, normalized_audio: &[f32]) -> Result<Tensor, DataError>;

    fn device_label(&self) -> String {
        "cpu".to_string()
    }
}
