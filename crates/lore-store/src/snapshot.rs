use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use lore_catalog::registry::Snapshot;

use crate::error::StoreError;

/// Persisted catalog snapshot: loaded at startup, saved on every mutation.
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Persist the snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Snapshot persisted as one pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no snapshot yet, starting empty");
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, content)?;
        tracing::debug!(path = %self.path.display(), version = snapshot.version, "saved snapshot");
        Ok(())
    }
}

/// In-memory snapshot store for tests and ephemeral catalogs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<Option<Snapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use lore_catalog::model::{CapabilityUnit, Category, SizeClass, TriggerPattern, UnitStatus};

    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            version: 3,
            units: vec![CapabilityUnit {
                id: "payment-retries".into(),
                title: "Payment retries".into(),
                category_id: "billing".into(),
                trigger_patterns: vec![
                    TriggerPattern::Phrase("payment retries".into()),
                    TriggerPattern::Glob("retry-*".into()),
                ],
                related_unit_ids: BTreeSet::from(["idempotency".to_string()]),
                size_class: SizeClass::Small,
                status: UnitStatus::Active,
                updated_at: Utc::now(),
            }],
            categories: vec![Category {
                name: "billing".into(),
                description: "Money movement guidance".into(),
                member_unit_ids: vec!["payment-retries".into()],
                discovery_patterns: vec!["billing-*".into()],
            }],
        }
    }

    #[test]
    fn json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("data").join("catalog.json"));

        assert!(store.load().unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn json_store_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("catalog.json"));

        let mut snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        snapshot.version = 9;
        store.save(&snapshot).unwrap();

        assert_eq!(store.load().unwrap().unwrap().version, 9);
    }

    #[test]
    fn json_store_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonSnapshotStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }
}
