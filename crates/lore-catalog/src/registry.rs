use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::index::CatalogIndex;
use crate::model::{CapabilityUnit, Category, UnitStatus};

/// Durable store of capability-unit metadata and category membership.
///
/// Single logical writer; reads may run concurrently. The derived
/// [`CatalogIndex`] is invalidated by every effective mutation and rebuilt
/// lazily on the next read.
#[derive(Debug, Default)]
pub struct Registry {
    units: BTreeMap<String, CapabilityUnit>,
    categories: BTreeMap<String, Category>,
    version: u64,
    index: OnceLock<CatalogIndex>,
}

/// Read-only aggregate counters exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub active_units: usize,
    pub archived_units: usize,
    pub per_category: BTreeMap<String, usize>,
}

/// Serializable registry contents for the persistence seam. The index is
/// deliberately absent: it is always re-derivable from these collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub units: Vec<CapabilityUnit>,
    pub categories: Vec<Category>,
}

impl Registry {
    /// Register a new capability unit, creating its category on first use.
    ///
    /// Re-registering a definition-identical unit is an idempotent no-op
    /// (no version bump, no index invalidation).
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the id already exists with a different
    /// definition; ids are immutable once created, archived ones included.
    pub fn register(&mut self, unit: CapabilityUnit) -> Result<(), CatalogError> {
        if let Some(existing) = self.units.get(&unit.id) {
            if existing.is_active() && existing.same_definition(&unit) {
                tracing::debug!(id = %unit.id, "re-registration of identical unit, no-op");
                return Ok(());
            }
            return Err(CatalogError::DuplicateId(unit.id));
        }
        if unit.id.is_empty() {
            return Err(CatalogError::Invalid("unit id must not be empty".into()));
        }

        let mut unit = unit;
        unit.updated_at = Utc::now();

        let category = self
            .categories
            .entry(unit.category_id.clone())
            .or_insert_with(|| Category {
                name: unit.category_id.clone(),
                ..Category::default()
            });
        if !category.member_unit_ids.contains(&unit.id) {
            category.member_unit_ids.push(unit.id.clone());
        }

        tracing::info!(id = %unit.id, category = %unit.category_id, "registered capability unit");
        self.units.insert(unit.id.clone(), unit);
        self.touch();
        Ok(())
    }

    /// Archive a unit, optionally recording its successor. The unit stays
    /// resolvable by id but drops out of ranking.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn archive(
        &mut self,
        id: &str,
        superseded_by: Option<String>,
    ) -> Result<(), CatalogError> {
        let unit = self
            .units
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        unit.status = UnitStatus::Archived { superseded_by };
        unit.updated_at = Utc::now();
        tracing::info!(id, "archived capability unit");
        self.touch();
        Ok(())
    }

    /// [`Registry::register`] guarded by an optimistic-concurrency check.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` when the registry version moved
    /// since `expected_version` was read; callers retry.
    pub fn register_checked(
        &mut self,
        unit: CapabilityUnit,
        expected_version: u64,
    ) -> Result<(), CatalogError> {
        self.ensure_version(expected_version)?;
        self.register(unit)
    }

    /// [`Registry::archive`] guarded by an optimistic-concurrency check.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` on a version mismatch, otherwise
    /// the same errors as `archive`.
    pub fn archive_checked(
        &mut self,
        id: &str,
        superseded_by: Option<String>,
        expected_version: u64,
    ) -> Result<(), CatalogError> {
        self.ensure_version(expected_version)?;
        self.archive(id, superseded_by)
    }

    /// Create or replace a category definition (description, discovery
    /// patterns). Existing membership is preserved.
    pub fn define_category(&mut self, category: Category) {
        let name = category.name.clone();
        let mut category = category;
        if let Some(existing) = self.categories.get(&name) {
            for id in &existing.member_unit_ids {
                if !category.member_unit_ids.contains(id) {
                    category.member_unit_ids.push(id.clone());
                }
            }
        }
        self.categories.insert(name, category);
        self.touch();
    }

    /// Resolve a unit by id, archived units included.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn lookup_by_id(&self, id: &str) -> Result<&CapabilityUnit, CatalogError> {
        self.units
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Ordered members of a category. Unknown categories yield an empty
    /// list, never an error: categories exist lazily.
    #[must_use]
    pub fn list_by_category(&self, category_id: &str) -> Vec<&CapabilityUnit> {
        let Some(category) = self.categories.get(category_id) else {
            return Vec::new();
        };
        category
            .member_unit_ids
            .iter()
            .filter_map(|id| self.units.get(id))
            .collect()
    }

    #[must_use]
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.get(name)
    }

    pub fn active_units(&self) -> impl Iterator<Item = &CapabilityUnit> {
        self.units.values().filter(|u| u.is_active())
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let active_units = self.units.values().filter(|u| u.is_active()).count();
        let per_category = self
            .categories
            .iter()
            .map(|(name, c)| (name.clone(), c.member_unit_ids.len()))
            .collect();
        RegistryStats {
            active_units,
            archived_units: self.units.len() - active_units,
            per_category,
        }
    }

    /// The derived trigger index, rebuilt on demand after mutations.
    pub fn index(&self) -> &CatalogIndex {
        self.index.get_or_init(|| CatalogIndex::build(self))
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            units: self.units.values().cloned().collect(),
            categories: self.categories.values().cloned().collect(),
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            units: snapshot
                .units
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect(),
            categories: snapshot
                .categories
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            version: snapshot.version,
            index: OnceLock::new(),
        }
    }

    fn ensure_version(&self, expected: u64) -> Result<(), CatalogError> {
        if self.version == expected {
            Ok(())
        } else {
            Err(CatalogError::ConcurrentModification {
                expected,
                actual: self.version,
            })
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.index = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{SizeClass, TriggerPattern};

    fn make_unit(id: &str, category: &str, triggers: &[&str]) -> CapabilityUnit {
        CapabilityUnit {
            id: id.into(),
            title: id.to_uppercase(),
            category_id: category.into(),
            trigger_patterns: triggers
                .iter()
                .map(|t| TriggerPattern::classify(t))
                .collect(),
            related_unit_ids: BTreeSet::new(),
            size_class: SizeClass::Small,
            status: UnitStatus::Active,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();

        let unit = registry.lookup_by_id("deploy-basics").unwrap();
        assert_eq!(unit.title, "DEPLOY-BASICS");
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn register_creates_category_lazily() {
        let mut registry = Registry::default();
        assert!(registry.category("deployment").is_none());
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();

        let category = registry.category("deployment").unwrap();
        assert_eq!(category.member_unit_ids, vec!["deploy-basics".to_string()]);
    }

    #[test]
    fn register_duplicate_active_id_fails() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();

        let mut changed = make_unit("deploy-basics", "deployment", &["deploy"]);
        changed.title = "Different".into();
        let err = registry.register(changed).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(_)));
    }

    #[test]
    fn register_is_idempotent_for_identical_definition() {
        let mut registry = Registry::default();
        let unit = make_unit("deploy-basics", "deployment", &["deploy"]);
        registry.register(unit.clone()).unwrap();
        let version = registry.version();
        let snapshot = registry.snapshot();

        registry.register(unit).unwrap();
        assert_eq!(registry.version(), version);
        assert_eq!(registry.snapshot(), snapshot);
    }

    #[test]
    fn register_over_archived_id_fails() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();
        registry.archive("deploy-basics", None).unwrap();

        let err = registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(_)));
    }

    #[test]
    fn archive_unknown_id_fails() {
        let mut registry = Registry::default();
        let err = registry.archive("ghost", None).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn archived_unit_still_resolves_by_id() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();
        registry
            .archive("deploy-basics", Some("deploy-advanced".into()))
            .unwrap();

        let unit = registry.lookup_by_id("deploy-basics").unwrap();
        assert_eq!(
            unit.status,
            UnitStatus::Archived {
                superseded_by: Some("deploy-advanced".into())
            }
        );
        assert!(!unit.is_active());
    }

    #[test]
    fn list_by_unknown_category_is_empty() {
        let registry = Registry::default();
        assert!(registry.list_by_category("nope").is_empty());
    }

    #[test]
    fn list_by_category_preserves_registration_order() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("z-unit", "ops", &["zeta"]))
            .unwrap();
        registry
            .register(make_unit("a-unit", "ops", &["alpha"]))
            .unwrap();

        let ids: Vec<_> = registry
            .list_by_category("ops")
            .iter()
            .map(|u| u.id.clone())
            .collect();
        assert_eq!(ids, vec!["z-unit".to_string(), "a-unit".to_string()]);
    }

    #[test]
    fn checked_mutations_detect_version_race() {
        let mut registry = Registry::default();
        let stale = registry.version();
        registry
            .register(make_unit("deploy-basics", "deployment", &["deploy"]))
            .unwrap();

        let err = registry
            .register_checked(make_unit("another", "deployment", &["other"]), stale)
            .unwrap_err();
        assert!(matches!(err, CatalogError::ConcurrentModification { .. }));

        let err = registry
            .archive_checked("deploy-basics", None, stale)
            .unwrap_err();
        assert!(matches!(err, CatalogError::ConcurrentModification { .. }));

        let current = registry.version();
        registry
            .archive_checked("deploy-basics", None, current)
            .unwrap();
    }

    #[test]
    fn stats_count_active_and_archived() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("a", "ops", &["alpha"]))
            .unwrap();
        registry
            .register(make_unit("b", "ops", &["beta"]))
            .unwrap();
        registry
            .register(make_unit("c", "data", &["gamma"]))
            .unwrap();
        registry.archive("b", None).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.active_units, 2);
        assert_eq!(stats.archived_units, 1);
        assert_eq!(stats.per_category.get("ops"), Some(&2));
        assert_eq!(stats.per_category.get("data"), Some(&1));
    }

    #[test]
    fn define_category_preserves_membership() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("a", "ops", &["alpha"]))
            .unwrap();
        registry.define_category(Category {
            name: "ops".into(),
            description: "Operational guidance".into(),
            member_unit_ids: Vec::new(),
            discovery_patterns: vec!["ops-*".into()],
        });

        let category = registry.category("ops").unwrap();
        assert_eq!(category.description, "Operational guidance");
        assert_eq!(category.member_unit_ids, vec!["a".to_string()]);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("a", "ops", &["alpha"]))
            .unwrap();
        registry.archive("a", None).unwrap();

        let restored = Registry::from_snapshot(registry.snapshot());
        assert_eq!(restored.version(), registry.version());
        assert_eq!(restored.snapshot(), registry.snapshot());
    }

    #[test]
    fn empty_id_rejected() {
        let mut registry = Registry::default();
        let err = registry.register(make_unit("", "ops", &["x"])).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }
}
