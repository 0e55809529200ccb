//! YAML sync point configuration.
//!
//! ```yaml
//! cephfs_synchronization:
//!   - sync_description: "isos"
//!     source_location: /mnt/cephfs/data/isos
//!     target_location: backup01:/data/isos
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::sync_point::{SyncPlan, SyncPointSpec, TargetLocation};

/// Environment variable that supplies the config file path.
pub const CONFIG_FILE_ENV: &str = "CEPHFS_SYNC_CONF_FILE";

/// One `cephfs_synchronization` entry as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncEntry {
    /// Free-form label.
    pub sync_description: String,
    /// Local source directory.
    pub source_location: String,
    /// `<host>:/<path>` target.
    pub target_location: String,
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Entries in file order.
    pub cephfs_synchronization: Vec<SyncEntry>,
}

impl SyncConfig {
    /// Read and parse the YAML file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Fold entries into a [`SyncPlan`].
    ///
    /// Entries are folded by source location first, so a later entry for the
    /// same source replaces an earlier one before any target is parsed. Every
    /// surviving target is then parsed; the first malformed one is returned
    /// as an error.
    pub fn into_plan(self) -> Result<SyncPlan, ConfigError> {
        let mut folded: Vec<SyncEntry> = Vec::with_capacity(self.cephfs_synchronization.len());
        for entry in self.cephfs_synchronization {
            match folded
                .iter_mut()
                .find(|e| e.source_location == entry.source_location)
            {
                Some(existing) => {
                    tracing::debug!(
                        "Duplicate source {}: target {} replaced by {}",
                        entry.source_location,
                        existing.target_location,
                        entry.target_location
                    );
                    *existing = entry;
                }
                None => folded.push(entry),
            }
        }

        let mut plan = SyncPlan::new();
        for entry in folded {
            let target = TargetLocation::parse(&entry.target_location)?;
            plan.insert(SyncPointSpec {
                description: entry.sync_description,
                source_path: entry.source_location,
                target,
            });
        }
        Ok(plan)
    }
}

/// Read and fold the configuration file at `path`.
pub fn load_plan(path: &Path) -> Result<SyncPlan, ConfigError> {
    SyncConfig::from_file(path)?.into_plan()
}
