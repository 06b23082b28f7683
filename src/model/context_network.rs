//! wav2vec2 context network: feature projection, convolutional positional
//! embedding and the transformer stack.

use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, LayerNorm, Linear, VarBuilder};

use crate::config::EncoderModelConfig;

/// Conv features `(batch, frames, conv_dim)` to `(batch, frames, hidden_size)`.
pub(crate) struct FeatureProjection {
    layer_norm: LayerNorm,
    projection: Linear,
}

impl FeatureProjection {
    pub(crate) fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_channels = cfg.conv_dim.last().copied().unwrap_or(cfg.hidden_size);
        Ok(Self {
            layer_norm: candle_nn::layer_norm(conv_channels, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            projection: candle_nn::linear(conv_channels, cfg.hidden_size, vb.pp("projection"))?,
        })
    }

    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.projection.forward(&self.layer_norm.forward(xs)?)
    }
}

/// Plain `weight`, or a weight-normalised one stored as `weight_g`/`weight_v` or as
/// `parametrizations.weight.original{0,1}`. The norm is taken per kernel tap.
fn positional_conv_weight(
    cfg: &EncoderModelConfig,
    vb: &VarBuilder,
) -> candle_core::Result<Tensor> {
    let kernel = cfg.num_conv_pos_embeddings;
    let shape = (
        cfg.hidden_size,
        cfg.hidden_size / cfg.num_conv_pos_embedding_groups,
        kernel,
    );
    if vb.contains_tensor("weight") {
        return vb.get(shape, "weight");
    }
    let (g, v) = if vb.contains_tensor("parametrizations.weight.original0") {
        (
            vb.get((1, 1, kernel), "parametrizations.weight.original0")?,
            vb.get(shape, "parametrizations.weight.original1")?,
        )
    } else {
        (vb.get((1, 1, kernel), "weight_g")?, vb.get(shape, "weight_v")?)
    };
    let norm = v.sqr()?.sum_keepdim(0)?.sum_keepdim(1)?.sqrt()?;
    v.broadcast_div(&norm)?.broadcast_mul(&g)
}

struct PositionalConvEmbedding {
    conv: Conv1d,
}

impl PositionalConvEmbedding {
    fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let vb = vb.pp("conv");
        let conv_cfg = Conv1dConfig {
            padding: cfg.num_conv_pos_embeddings / 2,
            groups: cfg.num_conv_pos_embedding_groups,
            ..Default::default()
        };
        let weight = positional_conv_weight(cfg, &vb)?;
        let bias = vb.get(cfg.hidden_size, "bias")?;
        Ok(Self {
            conv: Conv1d::new(weight, Some(bias), conv_cfg),
        })
    }

    /// `(batch, frames, hidden)` in and out. An even kernel yields one extra frame,
    /// which is dropped.
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let frames = xs.dim(1)?;
        self.conv
            .forward(&xs.transpose(1, 2)?.contiguous()?)?
            .narrow(2, 0, frames)?
            .gelu()?
            .transpose(1, 2)?
            .contiguous()
    }
}

struct SelfAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.hidden_size;
        Ok(Self {
            q_proj: candle_nn::linear(hidden, hidden, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(hidden, hidden, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(hidden, hidden, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(hidden, hidden, vb.pp("out_proj"))?,
            num_heads: cfg.num_attention_heads,
            head_dim: hidden / cfg.num_attention_heads,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, frames, hidden) = xs.dims3()?;
        let heads = |t: Tensor| {
            t.reshape((batch, frames, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let scale = (self.head_dim as f64).powf(-0.5);
        let q = heads((self.q_proj.forward(xs)? * scale)?)?;
        let k = heads(self.k_proj.forward(xs)?)?;
        let v = heads(self.v_proj.forward(xs)?)?;

        let weights = candle_nn::ops::softmax_last_dim(&q.matmul(&k.t()?.contiguous()?)?)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, frames, hidden))?;
        self.out_proj.forward(&context)
    }
}

struct FeedForward {
    intermediate: Linear,
    output: Linear,
}

impl FeedForward {
    fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            intermediate: candle_nn::linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate_dense"),
            )?,
            output: candle_nn::linear(cfg.intermediate_size, cfg.hidden_size, vb.pp("output_dense"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.output.forward(&self.intermediate.forward(xs)?.gelu()?)
    }
}

struct TransformerLayer {
    attention: SelfAttention,
    layer_norm: LayerNorm,
    feed_forward: FeedForward,
    final_layer_norm: LayerNorm,
    pre_norm: bool,
}

impl TransformerLayer {
    fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let eps = cfg.layer_norm_eps;
        Ok(Self {
            attention: SelfAttention::load(cfg, vb.pp("attention"))?,
            layer_norm: candle_nn::layer_norm(cfg.hidden_size, eps, vb.pp("layer_norm"))?,
            feed_forward: FeedForward::load(cfg, vb.pp("feed_forward"))?,
            final_layer_norm: candle_nn::layer_norm(
                cfg.hidden_size,
                eps,
                vb.pp("final_layer_norm"),
            )?,
            pre_norm: cfg.do_stable_layer_norm,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        if self.pre_norm {
            let h = (xs + self.attention.forward(&self.layer_norm.forward(xs)?)?)?;
            &h + self.feed_forward.forward(&self.final_layer_norm.forward(&h)?)?
        } else {
            let h = self.layer_norm.forward(&(xs + self.attention.forward(xs)?)?)?;
            self.final_layer_norm
                .forward(&(&h + self.feed_forward.forward(&h)?)?)
        }
    }
}

/// Post-norm models normalise before the layers, stable (pre-norm) ones after.
pub(crate) struct ContextNetwork {
    pos_conv_embed: PositionalConvEmbedding,
    layer_norm: LayerNorm,
    layers: Vec<TransformerLayer>,
    pre_norm: bool,
}

impl ContextNetwork {
    pub(crate) fn load(cfg: &EncoderModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let layers = (0..cfg.num_hidden_layers)
            .map(|i| TransformerLayer::load(cfg, vb.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            pos_conv_embed: PositionalConvEmbedding::load(cfg, vb.pp("pos_conv_embed"))?,
            layer_norm: candle_nn::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            layers,
            pre_norm: cfg.do_stable_layer_norm,
        })
    }

    /// `(batch, frames, hidden)` in and out; returns the last hidden state.
    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = (xs + self.pos_conv_embed.forward(xs)?)?;
        if !self.pre_norm {
            h = self.layer_norm.forward(&h)?;
        }
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        if self.pre_norm {
            h = self.layer_norm.forward(&h)?;
        }
        Ok(h)
    }
}
