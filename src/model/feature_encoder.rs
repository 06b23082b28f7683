//! wav2vec2 convolutional feature encoder: strided conv stack with GELU.
//!
//! In "group" mode only the first layer carries a GroupNorm (one group per channel);
//! in "layer" mode every layer carries a LayerNorm over channels.

use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, GroupNorm, LayerNorm, VarBuilder};

use crate::config::EncoderModelConfig;

enum Norm {
    None,
    Group(GroupNorm),
    Layer(LayerNorm),
}

struct ConvBlock {
    conv: Conv1d,
    norm: Norm,
}

impl ConvBlock {
    fn load(
        cfg: &EncoderModelConfig,
        layer: usize,
        in_channels: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let out_channels = cfg.conv_dim[layer];
        let conv_cfg = Conv1dConfig {
            stride: cfg.conv_stride[layer],
            ..Default::default()
        };
        let kernel = cfg.conv_kernel[layer];
        let conv = if cfg.conv_bias {
            candle_nn::conv1d(in_channels, out_channels, kernel, conv_cfg, vb.pp("conv"))?
        } else {
            candle_nn::conv1d_no_bias(in_channels, out_channels, kernel, conv_cfg, vb.pp("conv"))?
        };
        let norm = match cfg.feat_extract_norm.as_str() {
            "layer" => Norm::Layer(candle_nn::layer_norm(
                out_channels,
                cfg.layer_norm_eps,
                vb.pp("layer_norm"),
            )?),
            "group" if layer == 0 => Norm::Group(candle_nn::group_norm(
                out_channels,
                out_channels,
                cfg.layer_norm_eps,
                vb.pp("layer_norm"),
            )?),
            _ => Norm::None,
        };
        Ok(Self { conv, norm })
    }

    /// `(batch, channels, time)` in and out.
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        let xs = match &self.norm {
            Norm::None => xs,
            Norm::Group(gn) => gn.forward(&xs)?,
            Norm::Layer(ln) => ln.forward(&xs.transpose(1, 2)?)?.transpose(1, 2)?.contiguous()?,
        };
        xs.gelu()
    }
}

pub(crate) struct ConvFeatureEncoder {
    blocks: Vec<ConvBlock>,
}

impl ConvFeatureEncoder {
    /// `vb` points at the `feature_extractor` prefix of the checkpoint.
    pub(crate) fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut blocks = Vec::with_capacity(cfg.conv_dim.len());
        let mut in_channels = 1;
        for layer in 0..cfg.conv_dim.len() {
            blocks.push(ConvBlock::load(
                cfg,
                layer,
                in_channels,
                vb.pp(format!("conv_layers.{layer}")),
            )?);
            in_channels = cfg.conv_dim[layer];
        }
        Ok(Self { blocks })
    }

    /// `(batch, samples)` waveform to `(batch, channels, frames)` latents.
    pub(crate) fn forward(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = audio.unsqueeze(1)?;
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        Ok(h)
    }
}
