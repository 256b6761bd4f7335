use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::MatcherConfig;
use crate::registry::Registry;

/// One ranked match: a unit id and its weighted trigger score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub unit_id: String,
    pub score: u32,
}

/// Ranked candidates plus the secondary "composable" suggestion list built
/// from their related units. Related units are only surfaced, never
/// auto-included in the ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub candidates: Vec<Candidate>,
    pub related: Vec<String>,
}

/// Resolves a free-text task description or detected technology tokens into
/// ranked capability-unit candidates. Pure read over registry state.
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    #[must_use]
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Rank all active units against a query.
    ///
    /// Per unit, the score is the weighted sum of exact trigger-phrase
    /// containment, glob matches against tokens or hyphen-joined bigrams,
    /// and category discovery-pattern matches. Score-0 units are discarded;
    /// ties break by activity timestamp (newer first), then id, so results
    /// are deterministic. An empty query after normalization yields an
    /// empty report, not an error.
    #[must_use]
    pub fn rank(&self, registry: &Registry, query: &str) -> MatchReport {
        let tokens = normalize(query, &self.config.stop_words);
        if tokens.is_empty() {
            return MatchReport::default();
        }
        let bigrams: Vec<String> = tokens
            .windows(2)
            .map(|w| format!("{}-{}", w[0], w[1]))
            .collect();

        let index = registry.index();
        let mut scores: BTreeMap<String, u32> = BTreeMap::new();

        for (phrase, unit_id) in index.phrases() {
            let phrase_tokens = normalize(phrase, &self.config.stop_words);
            if !phrase_tokens.is_empty() && contains_run(&tokens, &phrase_tokens) {
                *scores.entry(unit_id.clone()).or_default() += self.config.phrase_weight;
            }
        }

        for (pattern, unit_id) in index.globs() {
            if tokens.iter().any(|t| pattern.matches(t))
                || bigrams.iter().any(|b| pattern.matches(b))
            {
                *scores.entry(unit_id.clone()).or_default() += self.config.glob_weight;
            }
        }

        for (pattern, category) in index.category_globs() {
            if tokens.iter().any(|t| pattern.matches(t))
                || bigrams.iter().any(|b| pattern.matches(b))
            {
                for unit_id in index.active_members(category) {
                    *scores.entry(unit_id.clone()).or_default() += self.config.category_weight;
                }
            }
        }

        let mut ranked: Vec<(String, u32, DateTime<Utc>)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0)
            .filter_map(|(id, score)| {
                registry
                    .lookup_by_id(&id)
                    .ok()
                    .map(|u| (id, score, u.updated_at))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        let candidates: Vec<Candidate> = ranked
            .into_iter()
            .map(|(unit_id, score, _)| Candidate { unit_id, score })
            .collect();

        let related = related_suggestions(registry, &candidates);
        tracing::debug!(
            candidates = candidates.len(),
            related = related.len(),
            "ranked query"
        );
        MatchReport {
            candidates,
            related,
        }
    }
}

/// Related units of the ranked candidates that are active, not themselves
/// ranked, and not yet suggested, in candidate order.
fn related_suggestions(registry: &Registry, candidates: &[Candidate]) -> Vec<String> {
    let ranked_ids: Vec<&str> = candidates.iter().map(|c| c.unit_id.as_str()).collect();
    let mut related = Vec::new();
    for candidate in candidates {
        let Ok(unit) = registry.lookup_by_id(&candidate.unit_id) else {
            continue;
        };
        for id in &unit.related_unit_ids {
            if ranked_ids.contains(&id.as_str()) || related.contains(id) {
                continue;
            }
            if registry.lookup_by_id(id).is_ok_and(|u| u.is_active()) {
                related.push(id.clone());
            }
        }
    }
    related
}

/// Lowercase, split on non-alphanumeric boundaries, drop stop words.
pub(crate) fn normalize(text: &str, stop_words: &[String]) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !stop_words.iter().any(|s| s == t))
        .map(ToString::to_string)
        .collect()
}

/// Whether `needle` occurs as a contiguous run inside `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
