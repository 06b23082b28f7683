use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DataError, Result};

/// Default phoneme inventory (Japanese, JVS monophone labels).
pub const JVS_PHONEMES: [&str; 35] = [
    "a", "i", "u", "e", "o", "N", "w", "y", "j", "my", "ky", "dy", "gy", "ny", "hy", "ry", "py",
    "p", "t", "k", "ts", "ch", "b", "d", "g", "z", "m", "n", "s", "sh", "h", "f", "r", "q",
    "<silent>",
];

pub const SILENCE: &str = "<silent>";

/// Settings fixed for one dataset and run.
///
/// Changing `sample_rate` or `hop_size` invalidates any persisted length cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub cache_dir: PathBuf,
    pub partition_dir: PathBuf,
    pub sample_rate: u32,
    pub hop_size: usize,
    pub max_frames: usize,
    pub bucket_count: usize,
    pub phonemes: Vec<String>,
    pub silence: String,
}

impl DatasetConfig {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
    pub const DEFAULT_HOP_SIZE: usize = 160;
    pub const DEFAULT_MAX_FRAMES: usize = 25_000;

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DataError::io("read dataset config", path, e))?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| DataError::json("parse dataset config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DataError::config("sample_rate must be positive"));
        }
        if self.hop_size == 0 {
            return Err(DataError::config("hop_size must be positive"));
        }
        if self.bucket_count == 0 {
            return Err(DataError::config("bucket_count must be positive"));
        }
        if !self.phonemes.iter().any(|p| *p == self.silence) {
            return Err(DataError::config(format!(
                "phoneme inventory does not contain the silence label '{}'",
                self.silence
            )));
        }
        Ok(())
    }

    /// Duration of one frame in seconds.
    pub fn hop_seconds(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    pub fn dataset_dir(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    pub fn partition_file(&self, name: &str) -> PathBuf {
        self.partition_dir.join(format!("{name}.json"))
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            partition_dir: PathBuf::from("data/partitions"),
            sample_rate: Self::DEFAULT_SAMPLE_RATE_HZ,
            hop_size: Self::DEFAULT_HOP_SIZE,
            max_frames: Self::DEFAULT_MAX_FRAMES,
            bucket_count: 1,
            phonemes: JVS_PHONEMES.iter().map(|p| p.to_string()).collect(),
            silence: SILENCE.to_string(),
        }
    }
}

/// Settings of the latent extraction pipeline.
///
/// `encoder_hop_size` is the encoder's internal stride; `hop_size` is the frame
/// grid the latents are resampled onto.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub encoder_hop_size: usize,
    pub hop_size: usize,
    pub model_path: String,
    pub config_path: String,
    pub device: String,
}

impl ExtractionConfig {
    pub const DEFAULT_WINDOW_SIZE: usize = 400;
    pub const DEFAULT_ENCODER_HOP_SIZE: usize = 320;

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.hop_size == 0 || self.encoder_hop_size == 0 {
            return Err(DataError::config(
                "sample_rate, hop_size and encoder_hop_size must be positive",
            ));
        }
        if self.window_size < self.encoder_hop_size {
            return Err(DataError::config(format!(
                "window_size {} is smaller than encoder_hop_size {}",
                self.window_size, self.encoder_hop_size
            )));
        }
        if (self.window_size - self.encoder_hop_size) % 2 != 0 {
            return Err(DataError::config(
                "window_size - encoder_hop_size must be even to center windows on hops",
            ));
        }
        Ok(())
    }

    /// Zero padding applied to each side of the waveform before encoding.
    pub fn padding(&self) -> usize {
        (self.window_size - self.encoder_hop_size) / 2
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_rate: DatasetConfig::DEFAULT_SAMPLE_RATE_HZ,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            encoder_hop_size: Self::DEFAULT_ENCODER_HOP_SIZE,
            hop_size: DatasetConfig::DEFAULT_HOP_SIZE,
            model_path: String::new(),
            config_path: String::new(),
            device: "cpu".to_string(),
        }
    }
}

/// Subset of a HF wav2vec2 `config.json`: the convolutional feature encoder and the
/// transformer context network whose last hidden state is the latent output.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderModelConfig {
    pub conv_dim: Vec<usize>,
    pub conv_kernel: Vec<usize>,
    pub conv_stride: Vec<usize>,
    #[serde(default)]
    pub conv_bias: bool,
    #[serde(default = "default_feat_norm")]
    pub feat_extract_norm: String,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_num_hidden_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_num_attention_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_intermediate_size")]
    pub intermediate_size: usize,
    #[serde(default = "default_num_conv_pos_embeddings")]
    pub num_conv_pos_embeddings: usize,
    #[serde(default = "default_num_conv_pos_embedding_groups")]
    pub num_conv_pos_embedding_groups: usize,
    #[serde(default)]
    pub do_stable_layer_norm: bool,
}

fn default_eps() -> f64 {
    1e-5
}
fn default_feat_norm() -> String {
    "group".to_string()
}
fn default_hidden_size() -> usize {
    768
}
fn default_num_hidden_layers() -> usize {
    12
}
fn default_num_attention_heads() -> usize {
    12
}
fn default_intermediate_size() -> usize {
    3072
}
fn default_num_conv_pos_embeddings() -> usize {
    128
}
fn default_num_conv_pos_embedding_groups() -> usize {
    16
}

impl Default for EncoderModelConfig {
    /// `facebook/wav2vec2-base`.
    fn default() -> Self {
        Self {
            conv_dim: vec![512; 7],
            conv_kernel: vec![10, 3, 3, 3, 3, 2, 2],
            conv_stride: vec![5, 2, 2, 2, 2, 2, 2],
            conv_bias: false,
            feat_extract_norm: default_feat_norm(),
            layer_norm_eps: default_eps(),
            hidden_size: default_hidden_size(),
            num_hidden_layers: default_num_hidden_layers(),
            num_attention_heads: default_num_attention_heads(),
            intermediate_size: default_intermediate_size(),
            num_conv_pos_embeddings: default_num_conv_pos_embeddings(),
            num_conv_pos_embedding_groups: default_num_conv_pos_embedding_groups(),
            do_stable_layer_norm: false,
        }
    }
}

impl EncoderModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read_to_string(path).map_err(|e| DataError::io("read config.json", path, e))?;
        let cfg: Self =
            serde_json::from_str(&data).map_err(|e| DataError::json("parse config.json", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.conv_dim.is_empty()
            || self.conv_dim.len() != self.conv_kernel.len()
            || self.conv_dim.len() != self.conv_stride.len()
        {
            return Err(DataError::config(
                "conv_dim, conv_kernel and conv_stride must be non-empty and equally long",
            ));
        }
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(DataError::config(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.num_conv_pos_embedding_groups == 0
            || self.hidden_size % self.num_conv_pos_embedding_groups != 0
        {
            return Err(DataError::config(format!(
                "hidden_size {} is not divisible by num_conv_pos_embedding_groups {}",
                self.hidden_size, self.num_conv_pos_embedding_groups
            )));
        }
        Ok(())
    }

    /// Channels of one latent frame.
    pub fn output_channels(&self) -> usize {
        self.hidden_size
    }

    /// Samples between consecutive encoder outputs.
    pub fn stride(&self) -> usize {
        self.conv_stride.iter().product()
    }

    /// Samples seen by one encoder output.
    pub fn receptive_field(&self) -> usize {
        let mut field = 1;
        let mut jump = 1;
        for (&k, &s) in self.conv_kernel.iter().zip(&self.conv_stride) {
            field += (k - 1) * jump;
            jump *= s;
        }
        field
    }
}
