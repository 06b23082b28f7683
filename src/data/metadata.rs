use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio;
use crate::config::DatasetConfig;
use crate::data::partition::PartitionTable;
use crate::error::{DataError, Result};
use crate::types::Entry;

const FILE_LIST_NAME: &str = "<list of files>";

/// Persisted stem -> frame length table of one (dataset, partition).
///
/// The grid it was computed on is stored alongside so a cache written with a
/// different rate or hop size is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthCache {
    pub sample_rate: u32,
    pub hop_size: usize,
    pub lengths: BTreeMap<String, usize>,
}

impl LengthCache {
    pub fn file_name(partition: Option<&str>) -> String {
        match partition {
            Some(partition) => format!("{partition}-lengths.json"),
            None => "lengths.json".to_string(),
        }
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DataError::io("read lengths cache", path, e)),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| DataError::json("parse lengths cache", e))
    }

    /// Write the whole table at once; a concurrent writer of the same content may win.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string(self)
            .map_err(|e| DataError::json("serialize lengths cache", e))?;
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        std::fs::write(&tmp, data).map_err(|e| DataError::io("write lengths cache", &tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| DataError::io("persist lengths cache", path, e))
    }

    fn matches(&self, config: &DatasetConfig) -> bool {
        self.sample_rate == config.sample_rate && self.hop_size == config.hop_size
    }
}

/// Resolved, length-bounded index of a dataset or an ad-hoc file list.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct Metadata {
    name: String,
    dataset_dir: Option<PathBuf>,
    entries: Vec<Entry>,
}

impl Metadata {
    /// Resolve a named dataset through its partition table and length cache.
    pub fn from_dataset(
        config: &DatasetConfig,
        name: &str,
        partition: Option<&str>,
        overwrite_cache: bool,
    ) -> Result<Self> {
        config.validate()?;
        let dataset_dir = config.dataset_dir(name);
        let stems = PartitionTable::load(&config.partition_file(name))?.stems(partition)?;
        let audio_files: Vec<PathBuf> = stems
            .iter()
            .map(|stem| dataset_dir.join(format!("{stem}.wav")))
            .collect();

        let lengths_file = dataset_dir.join(LengthCache::file_name(partition));
        if overwrite_cache {
            match std::fs::remove_file(&lengths_file) {
                Ok(()) => tracing::info!(file = %lengths_file.display(), "removed lengths cache"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DataError::io("remove lengths cache", &lengths_file, e)),
            }
        }

        let lengths = match load_usable_cache(&lengths_file, config)? {
            Some(lengths) => lengths,
            None => {
                let lengths = compute_lengths(config, &stems, &audio_files)?;
                let cache = LengthCache {
                    sample_rate: config.sample_rate,
                    hop_size: config.hop_size,
                    lengths,
                };
                cache.save(&lengths_file)?;
                tracing::info!(
                    file = %lengths_file.display(),
                    entries = cache.lengths.len(),
                    "wrote lengths cache"
                );
                cache.lengths
            }
        };

        Self::resolve(
            name.to_string(),
            Some(dataset_dir),
            stems,
            audio_files,
            &lengths,
            config.max_frames,
        )
    }

    /// Index an explicit list of audio files. Lengths are always recomputed.
    pub fn from_files(config: &DatasetConfig, files: &[PathBuf]) -> Result<Self> {
        config.validate()?;
        let stems: Vec<String> = files.iter().map(PathBuf::as_path).map(stem_of).collect();
        let lengths = compute_lengths(config, &stems, files)?;
        Self::resolve(
            FILE_LIST_NAME.to_string(),
            None,
            stems,
            files.to_vec(),
            &lengths,
            config.max_frames,
        )
    }

    fn resolve(
        name: String,
        dataset_dir: Option<PathBuf>,
        stems: Vec<String>,
        audio_files: Vec<PathBuf>,
        lengths: &BTreeMap<String, usize>,
        max_frames: usize,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(stems.len());
        let mut uncached = 0usize;
        for (stem, audio_path) in stems.into_iter().zip(audio_files) {
            let Some(&frame_length) = lengths.get(&stem) else {
                uncached += 1;
                continue;
            };
            if frame_length > max_frames {
                tracing::warn!(
                    file = %audio_path.display(),
                    length = frame_length,
                    max_frames,
                    "file exceeds max_frames; skipping"
                );
                continue;
            }
            entries.push(Entry {
                stem,
                audio_path,
                frame_length,
            });
        }
        if uncached > 0 {
            tracing::warn!(dataset = %name, uncached, "stems missing from lengths cache; skipping");
        }
        if entries.is_empty() {
            return Err(DataError::EmptyDataset { name });
        }
        Ok(Self {
            name,
            dataset_dir,
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding audio, transcripts and features; `None` for file lists.
    pub fn dataset_dir(&self) -> Option<&Path> {
        self.dataset_dir.as_deref()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries.get(index).ok_or_else(|| {
            DataError::invalid_input(format!(
                "index {index} out of range for dataset of size {}",
                self.entries.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.frame_length).collect()
    }

    /// `<stem>.lab` in the dataset directory, or next to the audio for file lists.
    pub fn transcript_path(&self, entry: &Entry) -> PathBuf {
        self.sibling(&format!("{}.lab", entry.stem))
    }

    /// `<stem>-<feature>.safetensors` in the dataset directory, or next to the audio.
    pub fn feature_path(&self, entry: &Entry, feature: &str) -> PathBuf {
        self.sibling(&feature_file_name(&entry.stem, feature))
    }

    fn sibling(&self, file_name: &str) -> PathBuf {
        match &self.dataset_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// File name of the cached `feature` tensor of `stem`.
pub fn feature_file_name(stem: &str, feature: &str) -> String {
    format!("{stem}-{feature}.safetensors")
}

fn load_usable_cache(
    path: &Path,
    config: &DatasetConfig,
) -> Result<Option<BTreeMap<String, usize>>> {
    let Some(cache) = LengthCache::load(path)? else {
        return Ok(None);
    };
    if cache.lengths.is_empty() {
        return Ok(None);
    }
    if !cache.matches(config) {
        tracing::warn!(
            file = %path.display(),
            cached_sample_rate = cache.sample_rate,
            cached_hop_size = cache.hop_size,
            sample_rate = config.sample_rate,
            hop_size = config.hop_size,
            "lengths cache was built on a different frame grid; recomputing"
        );
        return Ok(None);
    }
    tracing::info!(file = %path.display(), entries = cache.lengths.len(), "loaded lengths cache");
    Ok(Some(cache.lengths))
}

fn compute_lengths(
    config: &DatasetConfig,
    stems: &[String],
    audio_files: &[PathBuf],
) -> Result<BTreeMap<String, usize>> {
    let mut lengths = BTreeMap::new();
    for (stem, audio_file) in stems.iter().zip(audio_files) {
        let info = audio::probe(audio_file)?;
        let length = audio::frame_length(
            info.num_samples,
            info.sample_rate,
            config.sample_rate,
            config.hop_size,
        );
        lengths.insert(stem.clone(), length);
    }
    Ok(lengths)
}

fn stem_of(file: &Path) -> String {
    let stem = file.file_stem().map(PathBuf::from).unwrap_or_default();
    match file.parent() {
        Some(parent) => parent.join(stem).to_string_lossy().into_owned(),
        None => stem.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_silence(path: &Path, num_samples: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for _ in 0..num_samples {
            writer.write_sample(0i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    /// Dataset "toy" with frame lengths 5, 60, 10 at hop 100 / 16 kHz.
    fn toy_dataset(root: &Path) -> DatasetConfig {
        let config = DatasetConfig {
            cache_dir: root.join("cache"),
            partition_dir: root.join("partitions"),
            hop_size: 100,
            max_frames: 50,
            ..DatasetConfig::default()
        };
        let dir = config.dataset_dir("toy");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(&config.partition_dir).unwrap();
        write_silence(&dir.join("s0.wav"), 500, 16_000);
        write_silence(&dir.join("s1.wav"), 6_000, 16_000);
        // 8 kHz source: 500 samples -> 1000 at 16 kHz -> 10 frames.
        write_silence(&dir.join("s2.wav"), 500, 8_000);
        std::fs::write(
            config.partition_file("toy"),
            r#"{"train": ["s0", "s1"], "valid": ["s2"]}"#,
        )
        .unwrap();
        config
    }

    #[test]
    fn dataset_index_excludes_long_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_dataset(dir.path());
        let metadata = Metadata::from_dataset(&config, "toy", None, false).unwrap();
        let stems: Vec<&str> = metadata.entries().iter().map(|e| e.stem.as_str()).collect();
        assert_eq!(stems, vec!["s0", "s2"]);
        assert_eq!(metadata.lengths(), vec![5, 10]);
        assert_eq!(metadata.name(), "toy");
    }

    #[test]
    fn cache_is_written_once_with_every_length() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_dataset(dir.path());
        Metadata::from_dataset(&config, "toy", Some("train"), false).unwrap();

        let cache_file = config.dataset_dir("toy").join("train-lengths.json");
        let cache = LengthCache::load(&cache_file).unwrap().expect("cache exists");
        assert_eq!(cache.lengths.len(), 2);
        assert_eq!(cache.lengths["s0"], 5);
        assert_eq!(cache.lengths["s1"], 60);
        assert_eq!(cache.hop_size, 100);
    }

    #[test]
    fn cache_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lengths.json");
        let cache = LengthCache {
            sample_rate: 16_000,
            hop_size: 160,
            lengths: [("a".to_string(), 3), ("b/c".to_string(), 25_000)]
                .into_iter()
                .collect(),
        };
        cache.save(&path).unwrap();
        assert_eq!(LengthCache::load(&path).unwrap(), Some(cache));
    }

    #[test]
    fn existing_cache_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_dataset(dir.path());
        let cache_file = config.dataset_dir("toy").join("valid-lengths.json");
        LengthCache {
            sample_rate: config.sample_rate,
            hop_size: config.hop_size,
            lengths: [("s2".to_string(), 42)].into_iter().collect(),
        }
        .save(&cache_file)
        .unwrap();

        let metadata = Metadata::from_dataset(&config, "toy", Some("valid"), false).unwrap();
        assert_eq!(metadata.lengths(), vec![42]);

        let rebuilt = Metadata::from_dataset(&config, "toy", Some("valid"), true).unwrap();
        assert_eq!(rebuilt.lengths(), vec![10]);
    }

    #[test]
    fn cache_from_another_grid_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_dataset(dir.path());
        let cache_file = config.dataset_dir("toy").join("valid-lengths.json");
        LengthCache {
            sample_rate: config.sample_rate,
            hop_size: 320,
            lengths: [("s2".to_string(), 5)].into_iter().collect(),
        }
        .save(&cache_file)
        .unwrap();

        let metadata = Metadata::from_dataset(&config, "toy", Some("valid"), false).unwrap();
        assert_eq!(metadata.lengths(), vec![10]);
        let cache = LengthCache::load(&cache_file).unwrap().unwrap();
        assert_eq!(cache.hop_size, 100);
    }

    #[test]
    fn empty_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatasetConfig {
            max_frames: 1,
            ..toy_dataset(dir.path())
        };
        let err = Metadata::from_dataset(&config, "toy", Some("train"), false).unwrap_err();
        assert!(matches!(err, DataError::EmptyDataset { .. }));
    }

    #[test]
    fn file_list_derives_stems_and_skips_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = toy_dataset(dir.path());
        let data_dir = config.dataset_dir("toy");
        let files = vec![data_dir.join("s2.wav"), data_dir.join("s1.wav")];
        let metadata = Metadata::from_files(&config, &files).unwrap();

        assert_eq!(metadata.len(), 1);
        let entry = &metadata.entries()[0];
        assert_eq!(entry.stem, data_dir.join("s2").to_string_lossy());
        assert!(metadata.dataset_dir().is_none());
        assert_eq!(metadata.transcript_path(entry), data_dir.join("s2.lab"));
        assert_eq!(
            metadata.feature_path(entry, "w2v2fb"),
            data_dir.join("s2-w2v2fb.safetensors")
        );
        assert!(!data_dir.join("lengths.json").exists());
    }
}
