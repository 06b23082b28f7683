use std::collections::HashMap;

use crate::config::DatasetConfig;
use crate::error::{DataError, Result};

/// Active phoneme set: label to class index, with a silence fallback.
#[derive(Debug, Clone)]
pub struct PhonemeInventory {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    silence_id: usize,
}

impl PhonemeInventory {
    pub fn new(labels: Vec<String>, silence: &str) -> Result<Self> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(DataError::config(format!(
                    "duplicate phoneme label '{label}' in inventory"
                )));
            }
        }
        let silence_id = index.get(silence).copied().ok_or_else(|| {
            DataError::config(format!("silence label '{silence}' missing from inventory"))
        })?;
        Ok(Self {
            labels,
            index,
            silence_id,
        })
    }

    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        Self::new(config.phonemes.clone(), &config.silence)
    }

    /// Class index of `label`; labels outside the inventory map to silence.
    pub fn index_of(&self, label: &str) -> usize {
        self.index.get(label).copied().unwrap_or(self.silence_id)
    }

    pub fn silence_id(&self) -> usize {
        self.silence_id
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inventory_maps_unknown_labels_to_silence() {
        let inventory = PhonemeInventory::from_config(&DatasetConfig::default()).unwrap();
        assert_eq!(inventory.len(), 35);
        assert_eq!(inventory.index_of("a"), 0);
        assert_eq!(inventory.index_of("sh"), 29);
        assert_eq!(inventory.silence_id(), 34);
        assert_eq!(inventory.index_of("sil"), 34);
        assert_eq!(inventory.index_of("pau"), 34);
        assert_eq!(inventory.label(34), Some("<silent>"));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let labels = vec!["a".to_string(), "a".to_string(), "<silent>".to_string()];
        assert!(PhonemeInventory::new(labels, "<silent>").is_err());
    }

    #[test]
    fn missing_silence_is_rejected() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert!(PhonemeInventory::new(labels, "<silent>").is_err());
    }
}
