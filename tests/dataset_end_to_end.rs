use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use ppgs_data::data::{feature_file_name, LengthCache, FEATURE_TENSOR_KEY};
use ppgs_data::{
    DataError, Dataset, DatasetConfig, ExtractionConfig, Feature, FeatureExtractorBuilder,
    FeatureValue, LatentEncoder, Metadata,
};

const SHORT_STEMS: [&str; 5] = ["s0", "s1", "s2", "s3", "s4"];
const LONG_STEMS: [&str; 5] = ["l0", "l1", "l2", "l3", "l4"];

/// Mirrors a strided conv stack: one frame per 320 samples once 400 are available.
struct StridedEncoder;

impl LatentEncoder for StridedEncoder {
    fn encode(&self, normalized_audio: &[f32]) -> Result<Tensor, DataError> {
        let frames = normalized_audio.len().saturating_sub(400) / 320 + 1;
        Tensor::ones((1, 8, frames), DType::F32, &Device::Cpu)
            .map_err(|e| DataError::Tensor {
                context: "strided encoder",
                source: e,
            })
    }
}

fn write_wav(path: &Path, num_samples: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for i in 0..num_samples {
        let sample = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

/// Five recordings of 5 frames and five of 100 frames at hop 160.
fn corpus(root: &Path) -> DatasetConfig {
    let config = DatasetConfig {
        cache_dir: root.join("datasets"),
        partition_dir: root.join("partitions"),
        max_frames: 50,
        bucket_count: 2,
        ..DatasetConfig::default()
    };
    let dir = config.dataset_dir("jvs");
    std::fs::create_dir_all(&dir).expect("dataset dir");
    std::fs::create_dir_all(&config.partition_dir).expect("partition dir");

    let mut stems = Vec::new();
    for stem in SHORT_STEMS {
        write_wav(&dir.join(format!("{stem}.wav")), 5 * 160);
        std::fs::write(dir.join(format!("{stem}.lab")), "0.0 0.02 sil\n0.02 0.05 a\n")
            .expect("write transcript");
        stems.push(stem);
    }
    for stem in LONG_STEMS {
        write_wav(&dir.join(format!("{stem}.wav")), 100 * 160);
        stems.push(stem);
    }
    let table = serde_json::json!({ "train": &stems[..8], "valid": &stems[8..] });
    std::fs::write(config.partition_file("jvs"), table.to_string()).expect("write partitions");
    config
}

#[test]
fn long_recordings_are_excluded_and_buckets_partition_the_rest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = corpus(dir.path());

    let metadata = Metadata::from_dataset(&config, "jvs", None, false).expect("metadata");
    assert_eq!(metadata.len(), 5);
    assert!(metadata.lengths().iter().all(|&len| len == 5));

    let dataset = Dataset::new(&config, metadata, vec![Feature::Stem]).expect("dataset");
    let buckets = dataset.buckets().expect("buckets");
    assert_eq!(buckets.len(), 2);
    assert!(buckets.iter().all(|bucket| bucket.len() >= 2));

    let mut seen = BTreeSet::new();
    for bucket in &buckets {
        for index in bucket.indices() {
            assert!(seen.insert(index));
        }
    }
    assert_eq!(seen, (0..5).collect::<BTreeSet<_>>());
}

#[test]
fn lengths_cache_covers_all_stems_and_is_reused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = corpus(dir.path());
    Metadata::from_dataset(&config, "jvs", None, false).expect("first pass");

    let cache_file = config
        .dataset_dir("jvs")
        .join(LengthCache::file_name(None));
    let cache = LengthCache::load(&cache_file)
        .expect("read cache")
        .expect("cache written");
    assert_eq!(cache.lengths.len(), 10);
    assert_eq!(cache.lengths["s0"], 5);
    assert_eq!(cache.lengths["l4"], 100);

    for stem in SHORT_STEMS {
        std::fs::remove_file(config.dataset_dir("jvs").join(format!("{stem}.wav")))
            .expect("remove audio");
    }
    let reused = Metadata::from_dataset(&config, "jvs", None, false).expect("cached pass");
    assert_eq!(reused.len(), 5);
    assert!(Metadata::from_dataset(&config, "jvs", None, true).is_err());
}

#[test]
fn partition_selects_its_own_stems() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = corpus(dir.path());
    let valid = Metadata::from_dataset(&config, "jvs", Some("valid"), false);
    assert!(matches!(valid, Err(DataError::EmptyDataset { .. })));

    let train = Metadata::from_dataset(&config, "jvs", Some("train"), false).expect("train");
    let stems: Vec<&str> = train.entries().iter().map(|e| e.stem.as_str()).collect();
    assert_eq!(stems, SHORT_STEMS);
    assert!(Metadata::from_dataset(&config, "jvs", Some("test"), false).is_err());
}

#[test]
fn extracted_features_feed_the_dataset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = corpus(dir.path());
    let dataset_dir = config.dataset_dir("jvs");

    let pipeline = FeatureExtractorBuilder::new(ExtractionConfig::default())
        .with_encoder(Box::new(StridedEncoder))
        .build()
        .expect("pipeline");
    let pairs: Vec<(PathBuf, PathBuf)> = SHORT_STEMS
        .iter()
        .map(|stem| {
            (
                dataset_dir.join(format!("{stem}.wav")),
                dataset_dir.join(feature_file_name(stem, "w2v2fb")),
            )
        })
        .collect();
    pipeline.from_files_to_files(&pairs).expect("extract");

    let dataset = Dataset::from_dataset(
        &config,
        "jvs",
        Some("train"),
        &["w2v2fb", "phonemes", "length", "stem"],
    )
    .expect("dataset");
    assert_eq!(dataset.len(), 5);

    for index in 0..dataset.len() {
        let example = dataset.get(index).expect("example");
        let labels = example.tensor(&Feature::Phonemes).expect("labels");
        let latents = example
            .tensor(&Feature::Cached("w2v2fb".to_string()))
            .expect("latents");
        let label_count = labels.dim(0).expect("label dim");
        assert!(label_count <= 5);
        assert_eq!(latents.dims(), &[1, 8, label_count]);
        assert!(matches!(
            example.get(&Feature::Length),
            Some(FeatureValue::Length(len)) if *len == label_count
        ));
    }

    let stored = candle_core::safetensors::load(&pairs[0].1, &Device::Cpu).expect("load");
    assert_eq!(stored[FEATURE_TENSOR_KEY].dtype(), DType::F16);
}
