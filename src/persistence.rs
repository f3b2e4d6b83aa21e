//! Load/save hooks so aggregates and seen visitors survive restarts.
//!
//! Any store that can hand back and accept an [`AtlasState`] is enough. Two
//! are provided: [`MemoryStateStore`] for tests and embedding, and
//! [`JsonFileStore`], which keeps one JSON document on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{AtlasError, CountryAggregate, GeoObservation, VisitorIdentity};

/// Everything needed to rebuild a tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasState {
    pub aggregates: Vec<CountryAggregate>,
    pub observations: Vec<GeoObservation>,
    pub seen_identities: Vec<VisitorIdentity>,
}

/// Persistence backend.
pub trait StateStore: Send + Sync {
    /// Load the last saved state, or an empty state if nothing was saved.
    fn load(&self) -> Result<AtlasState, AtlasError>;

    /// Replace the saved state.
    fn save(&self, state: &AtlasState) -> Result<(), AtlasError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<AtlasState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<AtlasState, AtlasError> {
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, state: &AtlasState) -> Result<(), AtlasError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}

/// Single JSON document on disk.
///
/// Saves go to a sibling temporary file that is renamed over the target, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<AtlasState, AtlasError> {
        if !self.path.exists() {
            info!("[JsonFileStore] {} not found, starting empty", self.path.display());
            return Ok(AtlasState::default());
        }
        let bytes = fs::read(&self.path)?;
        let state: AtlasState = serde_json::from_slice(&bytes)?;
        info!(
            "[JsonFileStore] Loaded {} countries, {} visitors from {}",
            state.aggregates.len(),
            state.seen_identities.len(),
            self.path.display()
        );
        Ok(state)
    }

    fn save(&self, state: &AtlasState) -> Result<(), AtlasError> {
        let tmp = self.temp_path();
        let json = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        info!(
            "[JsonFileStore] Saved {} countries, {} visitors to {}",
            state.aggregates.len(),
            state.seen_identities.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> AtlasState {
        AtlasState {
            aggregates: vec![CountryAggregate {
                country: "JP".into(),
                count: 1,
                mean_latitude: 35.0,
                mean_longitude: 139.0,
            }],
            observations: vec![GeoObservation::new("JP", 35.0, 139.0).unwrap()],
            seen_identities: vec![VisitorIdentity::from("203.0.113.7")],
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load().unwrap(), AtlasState::default());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap(), sample_state());
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("atlas.json"));
        assert_eq!(store.load().unwrap(), AtlasState::default());
    }

    #[test]
    fn test_json_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("atlas.json"));
        store.save(&sample_state()).unwrap();
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap(), sample_state());
    }

    #[test]
    fn test_json_store_identities_are_plain_strings() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("atlas.json"));
        store.save(&sample_state()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["seen_identities"][0], "203.0.113.7");
    }

    #[test]
    fn test_json_store_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        fs::write(&path, b"{not json").unwrap();
        let result = JsonFileStore::new(path).load();
        assert!(matches!(result, Err(AtlasError::Persistence(_))));
    }

    #[test]
    fn test_json_store_requires_observations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        let legacy = r#"{"aggregates":[{"country":"US","count":5,"mean_latitude":10.0,"mean_longitude":-100.0}],"seen_identities":[]}"#;
        fs::write(&path, legacy).unwrap();
        let result = JsonFileStore::new(path).load();
        assert!(matches!(result, Err(AtlasError::Persistence(_))));
    }

    #[test]
    fn test_json_store_rejects_invalid_observation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        let bad = r#"{"aggregates":[],"observations":[{"country":"","latitude":91.0,"longitude":0.0}],"seen_identities":[]}"#;
        fs::write(&path, bad).unwrap();
        assert!(JsonFileStore::new(path).load().is_err());
    }
}
