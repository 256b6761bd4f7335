use std::collections::BTreeMap;

use glob::Pattern;

use crate::model::TriggerPattern;
use crate::registry::Registry;

/// Derived lookup structures for the matcher: trigger phrases, compiled
/// trigger globs, and category discovery globs, for active units only.
///
/// Always re-derivable from registry contents alone; the registry drops it
/// on every mutation and rebuilds it on the next read.
#[derive(Debug)]
pub struct CatalogIndex {
    phrases: Vec<(String, String)>,
    globs: Vec<(Pattern, String)>,
    category_globs: Vec<(Pattern, String)>,
    active_members: BTreeMap<String, Vec<String>>,
}

impl CatalogIndex {
    /// Build the index deterministically: units in id order, patterns in
    /// declaration order, categories in name order.
    #[must_use]
    pub fn build(registry: &Registry) -> Self {
        let mut phrases = Vec::new();
        let mut globs = Vec::new();

        for unit in registry.active_units() {
            for trigger in &unit.trigger_patterns {
                match trigger {
                    TriggerPattern::Phrase(p) => {
                        phrases.push((p.to_lowercase(), unit.id.clone()));
                    }
                    TriggerPattern::Glob(g) => match Pattern::new(&g.to_lowercase()) {
                        Ok(pattern) => globs.push((pattern, unit.id.clone())),
                        Err(e) => {
                            tracing::warn!(id = %unit.id, glob = %g, "skipping invalid trigger glob: {e}");
                        }
                    },
                }
            }
        }

        let mut category_globs = Vec::new();
        let mut active_members = BTreeMap::new();
        for category in registry.categories() {
            for raw in &category.discovery_patterns {
                match Pattern::new(&raw.to_lowercase()) {
                    Ok(pattern) => category_globs.push((pattern, category.name.clone())),
                    Err(e) => {
                        tracing::warn!(category = %category.name, glob = %raw, "skipping invalid discovery glob: {e}");
                    }
                }
            }
            let members: Vec<String> = category
                .member_unit_ids
                .iter()
                .filter(|id| registry.lookup_by_id(id).is_ok_and(|u| u.is_active()))
                .cloned()
                .collect();
            active_members.insert(category.name.clone(), members);
        }

        Self {
            phrases,
            globs,
            category_globs,
            active_members,
        }
    }

    #[must_use]
    pub fn phrases(&self) -> &[(String, String)] {
        &self.phrases
    }

    #[must_use]
    pub fn globs(&self) -> &[(Pattern, String)] {
        &self.globs
    }

    #[must_use]
    pub fn category_globs(&self) -> &[(Pattern, String)] {
        &self.category_globs
    }

    /// Active member ids of a category, in membership order.
    #[must_use]
    pub fn active_members(&self, category: &str) -> &[String] {
        self.active_members
            .get(category)
            .map_or(&[], Vec::as_slice)
    }
}
