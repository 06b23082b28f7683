//! Partition tables: JSON objects mapping a partition name to an ordered stem list.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DataError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PartitionTable {
    partitions: BTreeMap<String, Vec<String>>,
}

impl PartitionTable {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DataError::io("read partition table", path, e))?;
        serde_json::from_str(&data).map_err(|e| DataError::json("parse partition table", e))
    }

    /// Stems of `partition`, or of every partition in key order when `None`.
    pub fn stems(&self, partition: Option<&str>) -> Result<Vec<String>> {
        match partition {
            Some(name) => self.partitions.get(name).cloned().ok_or_else(|| {
                DataError::config(format!("partition '{name}' not found in partition table"))
            }),
            None => Ok(self.partitions.values().flatten().cloned().collect()),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }
}
