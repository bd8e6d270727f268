//! Partition map
//!
//! Maps each partition (availability zone) to the endpoint of the storage
//! backend owning ground truth for its volumes. Loaded once at startup from
//! a YAML file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Partition name -> backend endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionMap {
    endpoints: BTreeMap<String, String>,
}

impl PartitionMap {
    /// Build a map from explicit pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            endpoints: pairs
                .into_iter()
                .map(|(partition, endpoint)| (partition.into(), endpoint.into()))
                .collect(),
        }
    }

    /// Load the map from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let map: Self = serde_yaml::from_str(&raw)?;
        if map.endpoints.is_empty() {
            return Err(Error::Configuration(format!(
                "partition map {} defines no partitions",
                path.as_ref().display()
            )));
        }
        Ok(map)
    }

    /// Resolve the backend endpoint for a partition
    pub fn resolve(&self, partition: &str) -> Result<&str> {
        self.endpoints
            .get(partition)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownPartition {
                partition: partition.to_string(),
            })
    }

    /// All configured partition names
    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
