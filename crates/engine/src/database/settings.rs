//! Process-wide engine settings, loaded once from `settings.json` (spec
//! §6 "Settings (JSON)").

use columnstore_core::PersistencyMode;
use serde::{Deserialize, Serialize};

fn default_max_ram_percent() -> u8 {
    50
}
fn default_max_persist_percent() -> u8 {
    30
}
fn default_shard_size() -> usize {
    60_000
}
fn default_engine() -> PersistencyMode {
    PersistencyMode::Safe
}
fn default_partition_max_dimensions() -> usize {
    10
}
fn default_analyze_min_items() -> usize {
    1_000
}

/// Recognized settings (spec §6 table). Unrecognized JSON keys are
/// ignored by `serde`'s default field-skipping behavior, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Total memory budget as a percentage of system RAM.
    #[serde(default = "default_max_ram_percent")]
    pub max_ram_percent: u8,
    /// Overrides `max_ram_percent` when nonzero.
    #[serde(default)]
    pub max_ram_bytes: u64,
    /// Persisted (shard + index) budget as a percentage of system RAM.
    #[serde(default = "default_max_persist_percent")]
    pub max_persist_percent: u8,
    /// Overrides `max_persist_percent` when nonzero.
    #[serde(default)]
    pub max_persist_bytes: u64,
    /// Max delta rows before a free shard rolls over (spec §4.D).
    #[serde(default = "default_shard_size")]
    pub shard_size: usize,
    /// Default persistency mode for newly created tables.
    #[serde(default = "default_engine")]
    pub default_engine: PersistencyMode,
    /// Cap on partition dimension count (spec §4.E).
    #[serde(default = "default_partition_max_dimensions")]
    pub partition_max_dimensions: usize,
    /// Row-count threshold below which scans skip statistics logging.
    #[serde(default = "default_analyze_min_items")]
    pub analyze_min_items: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_ram_percent: default_max_ram_percent(),
            max_ram_bytes: 0,
            max_persist_percent: default_max_persist_percent(),
            max_persist_bytes: 0,
            shard_size: default_shard_size(),
            default_engine: default_engine(),
            partition_max_dimensions: default_partition_max_dimensions(),
            analyze_min_items: default_analyze_min_items(),
        }
    }
}

impl Settings {
    /// Load from a `settings.json` file's bytes, falling back to defaults
    /// on a missing or unparseable file.
    pub fn from_json(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// Serialize back to JSON bytes for `UnloadDatabases`'s
    /// `settings.json` persist step.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).expect("Settings always serializes")
    }

    /// Resolved total memory budget in bytes, given the host's total RAM.
    pub fn memory_budget_bytes(&self, total_ram_bytes: u64) -> u64 {
        if self.max_ram_bytes > 0 {
            self.max_ram_bytes
        } else {
            total_ram_bytes * self.max_ram_percent as u64 / 100
        }
    }

    /// Resolved persisted-budget in bytes.
    pub fn persisted_budget_bytes(&self, total_ram_bytes: u64) -> u64 {
        if self.max_persist_bytes > 0 {
            self.max_persist_bytes
        } else {
            total_ram_bytes * self.max_persist_percent as u64 / 100
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let s = Settings::default();
        assert_eq!(s.max_ram_percent, 50);
        assert_eq!(s.max_persist_percent, 30);
        assert_eq!(s.shard_size, 60_000);
        assert_eq!(s.partition_max_dimensions, 10);
    }

    #[test]
    fn unparseable_json_falls_back_to_defaults() {
        let s = Settings::from_json(b"not json");
        assert_eq!(s.shard_size, 60_000);
    }

    #[test]
    fn explicit_bytes_override_percent() {
        let mut s = Settings::default();
        s.max_ram_bytes = 1024;
        assert_eq!(s.memory_budget_bytes(1_000_000), 1024);
    }

    #[test]
    fn round_trips_through_json() {
        let s = Settings::default();
        let bytes = s.to_json();
        let back = Settings::from_json(&bytes);
        assert_eq!(back.shard_size, s.shard_size);
    }
}
