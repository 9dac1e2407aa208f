// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Persistence layer for engine state.
//!
//! Battery history and decision state are written back after every cycle so
//! trend data and hysteresis bookkeeping survive process restarts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use voltion_types::{BatteryHistory, DecisionState};

/// Default path for the engine state file.
/// Uses a relative path for portability (works in both dev and service installs).
pub const DEFAULT_STATE_PATH: &str = "./data/engine_state.json";

/// Durable snapshot of everything the engine must remember across restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub history: BatteryHistory,
    pub state: DecisionState,
}

/// Engine state persistence manager.
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Path to the engine state file.
    state_path: PathBuf,
}

impl StateStore {
    /// Create a new store with the given path.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Create a store using the default production path.
    pub fn default_production() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }

    /// Get the path being used for persistence.
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Load engine state from disk.
    ///
    /// Returns `None` when no state file exists yet (first run). A present
    /// but unreadable file is an error; the caller decides whether that is
    /// fatal.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.state_path.exists() {
            info!(
                "Engine state file not found at {}, starting empty",
                self.state_path.display()
            );
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.state_path).with_context(|| {
            format!(
                "Failed to read engine state from {}",
                self.state_path.display()
            )
        })?;

        let state: PersistedState = serde_json::from_str(&contents).with_context(|| {
            format!(
                "Failed to parse engine state from {}",
                self.state_path.display()
            )
        })?;

        info!(
            "Loaded engine state: mode={}, samples={}, active_rule={:?}",
            state.state.current_mode,
            state.history.len(),
            state.state.active_rule
        );

        Ok(Some(state))
    }

    /// Save engine state to disk.
    ///
    /// Uses atomic write (temp file + rename) to prevent corruption.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize engine state")?;

        // Atomic write using temp file
        let temp_path = self.state_path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.state_path).with_context(|| {
            format!(
                "Failed to rename temp file to {}",
                self.state_path.display()
            )
        })?;

        Ok(())
    }

    /// Check if a state file exists.
    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::default_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;
    use voltion_types::{BatterySample, OperationMode};

    #[test]
    fn test_load_nonexistent_file() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("missing.json"));

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("engine_state.json"));

        let base = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let mut persisted = PersistedState::default();
        for (minute, pct) in [(0, 80.0), (30, 83.0), (60, 86.0)] {
            persisted
                .history
                .append(BatterySample::new(base + Duration::minutes(minute), pct).unwrap())
                .unwrap();
        }
        persisted
            .state
            .record_transition(OperationMode::Backup, 1, 86.0, base + Duration::hours(1));

        store.save(&persisted).unwrap();
        let loaded = store.load().unwrap().unwrap();

        let before: Vec<_> = persisted.history.samples().iter().copied().collect();
        let after: Vec<_> = loaded.history.samples().iter().copied().collect();
        assert_eq!(before, after);
        assert_eq!(loaded.state, persisted.state);
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state/engine_state.json"));

        store.save(&PersistedState::default()).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error_not_a_panic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine_state.json");
        fs::write(&path, "{ not valid json").unwrap();

        let store = StateStore::new(path);
        assert!(store.load().is_err());
    }
}
