pub mod buckets;
pub mod dataset;
pub mod metadata;
pub mod partition;

pub use dataset::{Dataset, Example, Feature, FeatureValue, FEATURE_TENSOR_KEY};
pub use metadata::{feature_file_name, LengthCache, Metadata};
pub use partition::PartitionTable;
