use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use lore_catalog::error::CatalogError;
use lore_catalog::loader::BodyFetcher;

use crate::error::StoreError;

/// Writable capability-unit body storage. The catalog core only ever reads
/// through the [`BodyFetcher`] supertrait; `put` belongs to curation.
pub trait BodyStore: BodyFetcher + Send + Sync {
    /// Store or replace the body for a unit id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unusable as a storage key or the
    /// write fails.
    fn put(&self, id: &str, body: &str) -> Result<(), StoreError>;
}

/// Ids are stable slugs; anything that could escape the storage root is
/// refused outright.
fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// One `<root>/<id>.md` file per unit body.
#[derive(Debug)]
pub struct FsBodyStore {
    root: PathBuf,
}

impl FsBodyStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn body_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.md"))
    }
}

impl BodyFetcher for FsBodyStore {
    fn fetch_body(&self, id: &str) -> Result<String, CatalogError> {
        if validate_id(id).is_err() {
            return Err(CatalogError::Invalid(format!("unusable unit id: {id}")));
        }
        let path = self.body_path(id);
        std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CatalogError::NotFound(id.to_string())
            } else {
                CatalogError::Invalid(format!("cannot read body {}: {e}", path.display()))
            }
        })
    }
}

impl BodyStore for FsBodyStore {
    fn put(&self, id: &str, body: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.body_path(id), body)?;
        tracing::debug!(id, bytes = body.len(), "stored unit body");
        Ok(())
    }
}

/// In-memory body store for tests and ephemeral catalogs.
#[derive(Debug, Default)]
pub struct MemoryBodyStore {
    inner: Mutex<BTreeMap<String, String>>,
}

impl MemoryBodyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BodyFetcher for MemoryBodyStore {
    fn fetch_body(&self, id: &str) -> Result<String, CatalogError> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }
}

impl BodyStore for MemoryBodyStore {
    fn put(&self, id: &str, body: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(id.to_string(), body.to_string());
        Ok(())
    }
}
