pub mod alignment;
pub mod audio;
pub mod config;
pub mod data;
pub mod error;
mod model;
pub mod pipeline;
pub mod types;

pub use alignment::PhonemeInventory;
pub use config::{DatasetConfig, EncoderModelConfig, ExtractionConfig};
pub use data::{Dataset, Example, Feature, FeatureValue, LengthCache, Metadata, PartitionTable};
pub use error::{DataError, Result};
pub use pipeline::builder::FeatureExtractorBuilder;
pub use pipeline::runtime::FeatureExtractionPipeline;
pub use pipeline::traits::LatentEncoder;
pub use types::{Bucket, Entry, PhonemeInterval};
