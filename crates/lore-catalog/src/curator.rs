use std::collections::BTreeSet;

use chrono::Utc;

use crate::config::CuratorConfig;
use crate::error::CatalogError;
use crate::gap::{GapCandidate, GapDecision};
use crate::matcher::Matcher;
use crate::model::{CapabilityUnit, SizeClass, TriggerPattern, UnitStatus};
use crate::registry::Registry;

/// A proposed capability unit before validation. Raw trigger strings are
/// classified into phrases and globs on commit.
#[derive(Debug, Clone)]
pub struct UnitDraft {
    pub id: String,
    pub title: String,
    pub category_id: String,
    pub trigger_patterns: Vec<String>,
    pub related_unit_ids: BTreeSet<String>,
    pub body: String,
}

/// Turns a create-decided gap candidate into a registered capability unit,
/// enforcing the catalog's scope and coverage rules first.
pub struct Curator {
    config: CuratorConfig,
}

impl Curator {
    #[must_use]
    pub fn new(config: CuratorConfig) -> Self {
        Self { config }
    }

    /// Validate a draft against the gap candidate and register it.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the candidate is not create-decided;
    /// - `ScopeTooNarrow` / `ScopeTooBroad` when the body falls outside the
    ///   configured size band;
    /// - `DuplicateCoverage` when one existing active unit already matches
    ///   every proposed trigger;
    /// - any `Registry::register` error.
    pub fn commit(
        &self,
        registry: &mut Registry,
        matcher: &Matcher,
        candidate: &GapCandidate,
        draft: &UnitDraft,
    ) -> Result<CapabilityUnit, CatalogError> {
        if candidate.decision != GapDecision::Create {
            return Err(CatalogError::NotFound(format!(
                "gap '{}' is not create-decided",
                candidate.domain_key
            )));
        }

        let len = draft.body.len();
        if len < self.config.min_body_len {
            return Err(CatalogError::ScopeTooNarrow {
                len,
                min: self.config.min_body_len,
            });
        }
        if len > self.config.max_body_len {
            return Err(CatalogError::ScopeTooBroad {
                len,
                max: self.config.max_body_len,
            });
        }
        if draft.trigger_patterns.is_empty() {
            return Err(CatalogError::Invalid(
                "at least one trigger pattern is required".into(),
            ));
        }

        if let Some(unit_id) = subsuming_unit(
            registry,
            matcher,
            &draft.trigger_patterns,
            self.config.coverage_threshold,
        ) {
            return Err(CatalogError::DuplicateCoverage { unit_id });
        }

        let mut triggers: Vec<TriggerPattern> = Vec::new();
        for raw in &draft.trigger_patterns {
            let trigger = TriggerPattern::classify(raw);
            if !triggers.contains(&trigger) {
                triggers.push(trigger);
            }
        }

        let unit = CapabilityUnit {
            id: draft.id.clone(),
            title: draft.title.clone(),
            category_id: draft.category_id.clone(),
            trigger_patterns: triggers,
            related_unit_ids: draft.related_unit_ids.clone(),
            size_class: SizeClass::classify(len, self.config.small_max, self.config.medium_max),
            status: UnitStatus::Active,
            updated_at: Utc::now(),
        };

        registry.register(unit)?;
        let created = registry.lookup_by_id(&draft.id)?.clone();
        tracing::info!(
            id = %created.id,
            domain = %candidate.domain_key,
            size = ?created.size_class,
            "curated new capability unit"
        );
        Ok(created)
    }
}

/// One existing active unit whose own patterns match every proposed
/// trigger, if any: full subsumption means the draft adds no retrievable
/// surface. Only hits at or above `coverage_threshold` count, so a
/// category discovery glob brushing every trigger is not coverage.
fn subsuming_unit(
    registry: &Registry,
    matcher: &Matcher,
    triggers: &[String],
    coverage_threshold: u32,
) -> Option<String> {
    let mut common: Option<BTreeSet<String>> = None;
    for trigger in triggers {
        let report = matcher.rank(registry, trigger);
        let ids: BTreeSet<String> = report
            .candidates
            .into_iter()
            .filter(|c| c.score >= coverage_threshold)
            .map(|c| c.unit_id)
            .collect();
        common = Some(match common {
            None => ids,
            Some(prev) => prev.intersection(&ids).cloned().collect(),
        });
        if common.as_ref().is_some_and(BTreeSet::is_empty) {
            return None;
        }
    }
    common.and_then(|ids| ids.into_iter().next())
}
