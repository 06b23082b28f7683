use std::path::PathBuf;

/// One resolved recording of the dataset index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub stem: String,
    pub audio_path: PathBuf,
    /// Frames at the hop size after resampling to the canonical rate.
    pub frame_length: usize,
}

/// Phoneme interval in seconds. Interval is [start, end), start inclusive/end exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeInterval {
    pub start: f64,
    pub end: f64,
    pub label: String,
}

impl PhonemeInterval {
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Length-homogeneous group of dataset indices, ordered by length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bucket {
    /// `(original_index, length)` pairs.
    pub entries: Vec<(usize, usize)>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|&(index, _)| index)
    }

    pub fn max_length(&self) -> usize {
        self.entries.iter().map(|&(_, len)| len).max().unwrap_or(0)
    }
}
