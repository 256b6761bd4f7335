//! Lore: a capability-unit catalog for AI agents.
//!
//! The [`Catalog`] facade wires the core (registry, matcher, progressive
//! loader, gap analyzer, curator) to injected storage adapters: a snapshot
//! store loaded at startup and saved on every mutation, and a body store
//! read lazily at full-content load.

pub use lore_catalog::config::CatalogConfig;
pub use lore_catalog::curator::UnitDraft;
pub use lore_catalog::error::CatalogError;
pub use lore_catalog::gap::{BandEstimate, GapCandidate, GapDecision, RejectReason};
pub use lore_catalog::loader::{LoadLevel, MaterializedContent};
pub use lore_catalog::matcher::{Candidate, MatchReport};
pub use lore_catalog::model::{CapabilityUnit, Category, SizeClass, TriggerPattern, UnitStatus};
pub use lore_catalog::registry::{RegistryStats, Snapshot};
pub use lore_store::body::{BodyStore, FsBodyStore, MemoryBodyStore};
pub use lore_store::error::StoreError;
pub use lore_store::snapshot::{JsonSnapshotStore, MemorySnapshotStore, SnapshotStore};

use lore_catalog::curator::Curator;
use lore_catalog::gap::GapAnalyzer;
use lore_catalog::loader::{BodyFetcher, ProgressiveLoader};
use lore_catalog::matcher::Matcher;
use lore_catalog::registry::Registry;

#[derive(Debug, thiserror::Error)]
pub enum LoreError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The catalog service: single logical writer, side-effect-free reads.
pub struct Catalog {
    registry: Registry,
    matcher: Matcher,
    loader: ProgressiveLoader,
    gaps: GapAnalyzer,
    curator: Curator,
    snapshots: Box<dyn SnapshotStore>,
    bodies: Box<dyn BodyStore>,
}

impl Catalog {
    /// Open a catalog over the given stores, restoring the last persisted
    /// snapshot if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub fn open(
        config: CatalogConfig,
        snapshots: Box<dyn SnapshotStore>,
        bodies: Box<dyn BodyStore>,
    ) -> Result<Self, LoreError> {
        let registry = match snapshots.load()? {
            Some(snapshot) => {
                tracing::info!(version = snapshot.version, units = snapshot.units.len(), "restored catalog snapshot");
                Registry::from_snapshot(snapshot)
            }
            None => Registry::default(),
        };
        Ok(Self {
            registry,
            matcher: Matcher::new(config.matcher),
            loader: ProgressiveLoader::new(config.loader),
            gaps: GapAnalyzer::new(config.gap),
            curator: Curator::new(config.curator),
            snapshots,
            bodies,
        })
    }

    /// Ephemeral catalog backed by in-memory stores, mainly for tests.
    #[must_use]
    pub fn in_memory(config: CatalogConfig) -> Self {
        Self {
            registry: Registry::default(),
            matcher: Matcher::new(config.matcher),
            loader: ProgressiveLoader::new(config.loader),
            gaps: GapAnalyzer::new(config.gap),
            curator: Curator::new(config.curator),
            snapshots: Box::new(MemorySnapshotStore::new()),
            bodies: Box::new(MemoryBodyStore::new()),
        }
    }

    /// Rank active units against a task description or technology tokens.
    #[must_use]
    pub fn search(&self, query: &str) -> MatchReport {
        self.matcher.rank(&self.registry, query)
    }

    /// Materialize candidates at the requested level, under budget.
    ///
    /// # Errors
    ///
    /// See [`lore_catalog::loader::ProgressiveLoader::load`].
    pub fn load(
        &self,
        candidates: &[Candidate],
        level: LoadLevel,
    ) -> Result<MaterializedContent, LoreError> {
        let fetcher: &dyn BodyFetcher = self.bodies.as_ref();
        Ok(self
            .loader
            .load(&self.registry, candidates, level, fetcher)?)
    }

    /// Record one occurrence of an unmatched query domain and return the
    /// updated gap candidate.
    pub fn record_gap_occurrence(
        &mut self,
        domain_key: &str,
        context_snippet: &str,
        estimate: BandEstimate,
    ) -> GapCandidate {
        self.gaps
            .record_occurrence(
                &self.registry,
                &self.matcher,
                domain_key,
                context_snippet,
                estimate,
            )
            .clone()
    }

    /// Gaps currently decided `Create`, awaiting curation.
    #[must_use]
    pub fn review_pending_gaps(&self) -> Vec<GapCandidate> {
        self.gaps.pending_creates().into_iter().cloned().collect()
    }

    /// Curate a create-decided gap into a new capability unit: re-checks
    /// coverage, validates scope, registers the unit, stores the body, and
    /// persists the snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or non-create gap, `DuplicateCoverage`
    /// when the catalog covers the domain by now (the gap is then rejected,
    /// never created), plus any curator or storage error.
    pub fn commit_new_unit(
        &mut self,
        domain_key: &str,
        draft: &UnitDraft,
    ) -> Result<CapabilityUnit, LoreError> {
        let candidate = self
            .gaps
            .get(domain_key)
            .ok_or_else(|| CatalogError::NotFound(format!("no gap tracked for '{domain_key}'")))?
            .clone();

        if let Some(unit_id) =
            self.gaps
                .recheck_coverage(&self.registry, &self.matcher, domain_key)
        {
            return Err(CatalogError::DuplicateCoverage { unit_id }.into());
        }

        let unit = self
            .curator
            .commit(&mut self.registry, &self.matcher, &candidate, draft)?;
        self.bodies.put(&unit.id, &draft.body)?;
        self.snapshots.save(&self.registry.snapshot())?;
        self.gaps.complete(domain_key);
        Ok(unit)
    }

    /// Register a unit directly (imports, migrations) and persist.
    ///
    /// # Errors
    ///
    /// See [`lore_catalog::registry::Registry::register`].
    pub fn register_unit(&mut self, unit: CapabilityUnit) -> Result<(), LoreError> {
        self.registry.register(unit)?;
        self.snapshots.save(&self.registry.snapshot())?;
        Ok(())
    }

    /// Archive a unit, keeping it resolvable by id, and persist.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, plus any storage error.
    pub fn archive_unit(
        &mut self,
        id: &str,
        superseded_by: Option<String>,
    ) -> Result<(), LoreError> {
        self.registry.archive(id, superseded_by)?;
        self.snapshots.save(&self.registry.snapshot())?;
        Ok(())
    }

    /// Create or replace a category definition and persist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be saved.
    pub fn define_category(&mut self, category: Category) -> Result<(), LoreError> {
        self.registry.define_category(category);
        self.snapshots.save(&self.registry.snapshot())?;
        Ok(())
    }

    /// Resolve a unit by id, archived units included.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn lookup_unit(&self, id: &str) -> Result<&CapabilityUnit, LoreError> {
        Ok(self.registry.lookup_by_id(id)?)
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}
