use crate::config::LoaderConfig;
use crate::error::CatalogError;
use crate::matcher::Candidate;
use crate::model::{SizeClass, TriggerPattern};
use crate::registry::Registry;

/// Lazy body access for Level 3 materialization. The catalog core never
/// touches document storage directly; adapters implement this seam.
pub trait BodyFetcher {
    /// Fetch the full body text for a unit id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no body is stored under the id.
    fn fetch_body(&self, id: &str) -> Result<String, CatalogError>;
}

/// Staged materialization levels, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLevel {
    /// Category name and one-line description for the categories touched
    /// by the top-K candidates.
    Gateway,
    /// Full per-unit metadata for the top-K candidates.
    Index,
    /// Complete body text for explicitly confirmed units, budget-guarded.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitSummary {
    pub id: String,
    pub title: String,
    pub category_id: String,
    pub trigger_patterns: Vec<TriggerPattern>,
    pub related_unit_ids: Vec<String>,
    pub size_class: SizeClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContent {
    pub id: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedContent {
    Gateway(Vec<CategorySummary>),
    Index(Vec<UnitSummary>),
    Full(Vec<UnitContent>),
}

/// Enforces the content budget while maximizing relevance. Pure with
/// respect to registry state: `load` never mutates anything.
pub struct ProgressiveLoader {
    config: LoaderConfig,
}

impl ProgressiveLoader {
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Materialize candidates at the requested level.
    ///
    /// Levels 1 and 2 cover the top-K candidates; Level 3 treats the whole
    /// candidate slice as an explicit confirmation list and is rejected
    /// up front when it exceeds the configured maximum, before any body is
    /// fetched.
    ///
    /// # Errors
    ///
    /// `BudgetExceeded` for an oversized Level 3 request, `NotFound` when a
    /// candidate id or its body does not resolve.
    pub fn load(
        &self,
        registry: &Registry,
        candidates: &[Candidate],
        level: LoadLevel,
        fetcher: &dyn BodyFetcher,
    ) -> Result<MaterializedContent, CatalogError> {
        match level {
            LoadLevel::Gateway => self.load_gateway(registry, candidates),
            LoadLevel::Index => self.load_index(registry, candidates),
            LoadLevel::Full => self.load_full(registry, candidates, fetcher),
        }
    }

    fn load_gateway(
        &self,
        registry: &Registry,
        candidates: &[Candidate],
    ) -> Result<MaterializedContent, CatalogError> {
        let mut summaries: Vec<CategorySummary> = Vec::new();
        for candidate in candidates.iter().take(self.config.top_k) {
            let unit = registry.lookup_by_id(&candidate.unit_id)?;
            if summaries.iter().any(|s| s.name == unit.category_id) {
                continue;
            }
            let description = registry
                .category(&unit.category_id)
                .map(|c| c.description.clone())
                .unwrap_or_default();
            summaries.push(CategorySummary {
                name: unit.category_id.clone(),
                description,
            });
        }
        Ok(MaterializedContent::Gateway(summaries))
    }

    fn load_index(
        &self,
        registry: &Registry,
        candidates: &[Candidate],
    ) -> Result<MaterializedContent, CatalogError> {
        let mut summaries = Vec::new();
        for candidate in candidates.iter().take(self.config.top_k) {
            let unit = registry.lookup_by_id(&candidate.unit_id)?;
            summaries.push(UnitSummary {
                id: unit.id.clone(),
                title: unit.title.clone(),
                category_id: unit.category_id.clone(),
                trigger_patterns: unit.trigger_patterns.clone(),
                related_unit_ids: unit.related_unit_ids.iter().cloned().collect(),
                size_class: unit.size_class,
            });
        }
        Ok(MaterializedContent::Index(summaries))
    }

    fn load_full(
        &self,
        registry: &Registry,
        candidates: &[Candidate],
        fetcher: &dyn BodyFetcher,
    ) -> Result<MaterializedContent, CatalogError> {
        if candidates.len() > self.config.max_full_units {
            return Err(CatalogError::BudgetExceeded {
                requested: candidates.len(),
                max: self.config.max_full_units,
            });
        }
        let mut contents = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let unit = registry.lookup_by_id(&candidate.unit_id)?;
            let body = fetcher.fetch_body(&unit.id)?;
            contents.push(UnitContent {
                id: unit.id.clone(),
                title: unit.title.clone(),
                body,
            });
        }
        Ok(MaterializedContent::Full(contents))
    }
}
