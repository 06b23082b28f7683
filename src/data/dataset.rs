use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use candle_core::{Device, Tensor};

use crate::alignment::{self, transcript, PhonemeInventory};
use crate::audio;
use crate::config::DatasetConfig;
use crate::data::buckets;
use crate::data::metadata::Metadata;
use crate::error::{DataError, Result};
use crate::types::{Bucket, Entry};

/// Key of the tensor stored in every cached feature file.
pub const FEATURE_TENSOR_KEY: &str = "latents";

/// A per-example value that can be requested from a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Waveform at the canonical rate, shape `(1, samples)`.
    Audio,
    /// Per-frame phoneme indices; truncates the preceding tensor feature to match.
    Phonemes,
    Stem,
    AudioFile,
    /// Trailing dimension of the preceding feature.
    Length,
    /// Pre-extracted tensor stored as `<stem>-<name>.safetensors`.
    Cached(String),
}

impl Feature {
    pub fn name(&self) -> &str {
        match self {
            Self::Audio => "audio",
            Self::Phonemes => "phonemes",
            Self::Stem => "stem",
            Self::AudioFile => "audio_file",
            Self::Length => "length",
            Self::Cached(name) => name,
        }
    }

    fn produces_tensor(&self) -> bool {
        matches!(self, Self::Audio | Self::Cached(_))
    }

    /// Features whose value depends only on the entry or on their predecessor.
    fn repeatable(&self) -> bool {
        matches!(self, Self::Length | Self::Stem | Self::AudioFile)
    }
}

impl FromStr for Feature {
    type Err = DataError;

    fn from_str(name: &str) -> Result<Self> {
        Ok(match name {
            "audio" => Self::Audio,
            "phonemes" => Self::Phonemes,
            "stem" => Self::Stem,
            "audio_file" => Self::AudioFile,
            "length" => Self::Length,
            "" => return Err(DataError::invalid_input("empty feature name")),
            other => Self::Cached(other.to_string()),
        })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum FeatureValue {
    Tensor(Tensor),
    Stem(String),
    AudioFile(PathBuf),
    Length(usize),
}

impl FeatureValue {
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Size of the trailing dimension; for scalars the length of their textual form.
    fn trailing_len(&self) -> Option<usize> {
        match self {
            Self::Tensor(t) => t.dims().last().copied(),
            Self::Stem(stem) => Some(stem.chars().count()),
            Self::AudioFile(path) => Some(path.to_string_lossy().chars().count()),
            Self::Length(_) => None,
        }
    }
}

/// Requested features of one index, in request order.
#[derive(Debug, Clone)]
pub struct Example {
    values: Vec<(Feature, FeatureValue)>,
}

impl Example {
    /// First value produced for `feature`. Repeated `length` requests are only
    /// reachable through [`Example::iter`] or [`Example::into_values`].
    pub fn get(&self, feature: &Feature) -> Option<&FeatureValue> {
        self.values
            .iter()
            .find(|(f, _)| f == feature)
            .map(|(_, v)| v)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&FeatureValue> {
        self.values
            .iter()
            .find(|(f, _)| f.name() == name)
            .map(|(_, v)| v)
    }

    pub fn tensor(&self, feature: &Feature) -> Option<&Tensor> {
        self.get(feature).and_then(FeatureValue::as_tensor)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Feature, FeatureValue)> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<FeatureValue> {
        self.values.into_iter().map(|(_, v)| v).collect()
    }
}

/// Serves multi-feature examples from a resolved [`Metadata`] index.
///
/// Request order is a contract: `phonemes` and `length` act on the feature
/// requested immediately before them, so `length` may appear more than once. `get` takes `&self` and reads files only, so
/// concurrent calls for different indices are safe.
pub struct Dataset {
    metadata: Metadata,
    features: Vec<Feature>,
    inventory: PhonemeInventory,
    sample_rate: u32,
    hop_seconds: f64,
    bucket_count: usize,
    device: Device,
}

impl Dataset {
    pub fn new(config: &DatasetConfig, metadata: Metadata, features: Vec<Feature>) -> Result<Self> {
        config.validate()?;
        validate_request(&features)?;
        Ok(Self {
            metadata,
            features,
            inventory: PhonemeInventory::from_config(config)?,
            sample_rate: config.sample_rate,
            hop_seconds: config.hop_seconds(),
            bucket_count: config.bucket_count,
            device: Device::Cpu,
        })
    }

    /// Resolve `name` and serve `features` from it.
    pub fn from_dataset(
        config: &DatasetConfig,
        name: &str,
        partition: Option<&str>,
        features: &[&str],
    ) -> Result<Self> {
        let features = features
            .iter()
            .map(|f| f.parse())
            .collect::<Result<Vec<Feature>>>()?;
        let metadata = Metadata::from_dataset(config, name, partition, false)?;
        Self::new(config, metadata, features)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.metadata.lengths()
    }

    /// Length buckets over this dataset's examples, `bucket_count` of the config.
    pub fn buckets(&self) -> Result<Vec<Bucket>> {
        buckets::partition(&self.metadata.lengths(), self.bucket_count)
    }

    pub fn get(&self, index: usize) -> Result<Example> {
        let entry = self.metadata.entry(index)?;
        let mut example = Example {
            values: Vec::with_capacity(self.features.len()),
        };
        for feature in &self.features {
            let value = match feature {
                Feature::Audio => FeatureValue::Tensor(self.load_audio(entry)?),
                Feature::Phonemes => self.load_phonemes(entry, &mut example)?,
                Feature::Stem => FeatureValue::Stem(entry.stem.clone()),
                Feature::AudioFile => FeatureValue::AudioFile(entry.audio_path.clone()),
                Feature::Length => {
                    let (previous, value) =
                        example.values.last().ok_or_else(length_order_error)?;
                    let len = value.trailing_len().ok_or_else(|| {
                        DataError::invalid_input(format!(
                            "'length' cannot be derived from '{previous}'"
                        ))
                    })?;
                    FeatureValue::Length(len)
                }
                Feature::Cached(name) => FeatureValue::Tensor(self.load_cached(entry, name)?),
            };
            example.values.push((feature.clone(), value));
        }
        Ok(example)
    }

    fn load_audio(&self, entry: &Entry) -> Result<Tensor> {
        let samples = audio::load(&entry.audio_path, self.sample_rate)?;
        let len = samples.len();
        Tensor::from_vec(samples, (1, len), &self.device)
            .map_err(|e| DataError::tensor("audio tensor creation", e))
    }

    /// Labels for `entry`; truncates the tensor produced just before to match.
    fn load_phonemes(&self, entry: &Entry, example: &mut Example) -> Result<FeatureValue> {
        let intervals = transcript::load(&self.metadata.transcript_path(entry))?;
        let duration = transcript::duration(&intervals)?;
        let times = alignment::frame_times(entry.frame_length, self.hop_seconds, duration);
        let labels = alignment::align(&intervals, &times, &self.inventory);
        if labels.len() < times.len() {
            tracing::debug!(
                stem = entry.stem.as_str(),
                frames = times.len(),
                labels = labels.len(),
                "phoneme transcript does not cover every frame; truncating"
            );
        }

        let Some((_, FeatureValue::Tensor(prev))) = example.values.last_mut() else {
            return Err(phonemes_order_error());
        };
        let time_dim = prev.rank().saturating_sub(1);
        let keep = prev.dim(time_dim).map_err(|e| DataError::tensor("phoneme truncation", e))?;
        *prev = prev
            .narrow(time_dim, 0, keep.min(labels.len()))
            .map_err(|e| DataError::tensor("phoneme truncation", e))?;

        let n = labels.len();
        let labels: Vec<i64> = labels.into_iter().map(|l| l as i64).collect();
        let labels = Tensor::from_vec(labels, n, &self.device)
            .map_err(|e| DataError::tensor("phoneme tensor creation", e))?;
        Ok(FeatureValue::Tensor(labels))
    }

    fn load_cached(&self, entry: &Entry, feature: &str) -> Result<Tensor> {
        let path = self.metadata.feature_path(entry, feature);
        if !path.exists() {
            return Err(DataError::MissingFeature {
                stem: entry.stem.clone(),
                feature: feature.to_string(),
                path,
            });
        }
        let mut tensors = candle_core::safetensors::load(&path, &self.device)
            .map_err(|e| DataError::tensor("load cached feature", e))?;
        tensors
            .remove(FEATURE_TENSOR_KEY)
            .ok_or_else(|| DataError::MissingFeature {
                stem: entry.stem.clone(),
                feature: feature.to_string(),
                path,
            })
    }
}

fn validate_request(features: &[Feature]) -> Result<()> {
    for (position, feature) in features.iter().enumerate() {
        if !feature.repeatable() && features[..position].contains(feature) {
            return Err(DataError::invalid_input(format!(
                "feature '{feature}' requested twice"
            )));
        }
        let previous = position.checked_sub(1).map(|p| &features[p]);
        match feature {
            Feature::Phonemes if !previous.is_some_and(Feature::produces_tensor) => {
                return Err(phonemes_order_error());
            }
            Feature::Length if previous.is_none() => return Err(length_order_error()),
            _ => {}
        }
    }
    Ok(())
}

fn phonemes_order_error() -> DataError {
    DataError::invalid_input("'phonemes' must directly follow 'audio' or a cached feature")
}

fn length_order_error() -> DataError {
    DataError::invalid_input("'length' must follow the feature it measures")
}
