use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GapConfig;
use crate::matcher::Matcher;
use crate::registry::Registry;

/// Caller-supplied judgment bands for a gap occurrence, each clamped to
/// 0–3. The frequency band is derived from occurrence count, not supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandEstimate {
    /// Does the capability generalize beyond one project?
    pub reusability: u8,
    /// Does it need integration knowledge rather than a single API call?
    pub complexity: u8,
    /// Is the underlying technology's pattern set settled?
    pub stability: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapBands {
    pub frequency: u8,
    pub reusability: u8,
    pub complexity: u8,
    pub stability: u8,
}

/// Worthiness formula over the four bands.
#[must_use]
pub fn worthiness_score(bands: GapBands) -> u32 {
    3 * u32::from(bands.frequency)
        + 3 * u32::from(bands.reusability)
        + 2 * u32::from(bands.complexity)
        + 2 * u32::from(bands.stability)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowScore,
    AlreadyCovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GapDecision {
    Pending,
    Tracking,
    Create,
    Rejected { reason: RejectReason },
}

impl GapDecision {
    /// Rejection is absorbing; a rejected domain is never re-litigated
    /// under the same key.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub at: DateTime<Utc>,
    pub context_snippet: String,
}

/// A tracked, unmatched query domain being evaluated for whether it
/// warrants a new capability unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapCandidate {
    pub domain_key: String,
    pub occurrences: Vec<Occurrence>,
    pub bands: GapBands,
    pub score: u32,
    pub decision: GapDecision,
}

/// Tracks repeated unmatched queries per domain and decides, via the
/// worthiness score, whether a new capability unit is warranted.
pub struct GapAnalyzer {
    gaps: BTreeMap<String, GapCandidate>,
    config: GapConfig,
}

impl GapAnalyzer {
    #[must_use]
    pub fn new(config: GapConfig) -> Self {
        Self {
            gaps: BTreeMap::new(),
            config,
        }
    }

    /// Record one occurrence of an unmatched domain and re-run the state
    /// machine: `new -> tracking -> {create, rejected}`.
    ///
    /// Occurrences are always appended, never dropped, but a rejected
    /// domain stays rejected. A create-decided domain keeps accumulating
    /// occurrences and score until the curator consumes it, and flips to
    /// rejected (already covered) if the catalog has grown a unit that now
    /// covers the domain.
    pub fn record_occurrence(
        &mut self,
        registry: &Registry,
        matcher: &Matcher,
        domain_key: &str,
        context_snippet: &str,
        estimate: BandEstimate,
    ) -> &GapCandidate {
        let key = normalize_domain_key(domain_key);
        let gap = self
            .gaps
            .entry(key.clone())
            .or_insert_with(|| GapCandidate {
                domain_key: key.clone(),
                occurrences: Vec::new(),
                bands: GapBands::default(),
                score: 0,
                decision: GapDecision::Pending,
            });

        gap.occurrences.push(Occurrence {
            at: Utc::now(),
            context_snippet: context_snippet.to_string(),
        });

        if gap.decision.is_rejected() {
            tracing::debug!(domain = %gap.domain_key, "occurrence on rejected gap recorded, decision frozen");
            return gap;
        }

        gap.bands = GapBands {
            frequency: frequency_band(gap.occurrences.len(), self.config.frequency_buckets),
            reusability: estimate.reusability.min(3),
            complexity: estimate.complexity.min(3),
            stability: estimate.stability.min(3),
        };
        gap.score = worthiness_score(gap.bands);

        if gap.score >= self.config.create_threshold || gap.decision == GapDecision::Create {
            if let Some(unit_id) = covering_unit(registry, matcher, &gap.domain_key, self.config.dedup_threshold) {
                tracing::info!(domain = %gap.domain_key, unit = %unit_id, "gap already covered, rejecting");
                gap.decision = GapDecision::Rejected {
                    reason: RejectReason::AlreadyCovered,
                };
            } else {
                if gap.decision != GapDecision::Create {
                    tracing::info!(domain = %gap.domain_key, score = gap.score, "gap crossed create threshold");
                }
                gap.decision = GapDecision::Create;
            }
        } else if gap.occurrences.len() >= self.config.reject_min_occurrences
            && gap.score < self.config.reject_threshold
        {
            tracing::info!(domain = %gap.domain_key, score = gap.score, "gap rejected for low score");
            gap.decision = GapDecision::Rejected {
                reason: RejectReason::LowScore,
            };
        } else {
            gap.decision = GapDecision::Tracking;
        }

        gap
    }

    /// Re-run the dedup check for a create-decided domain. Flips the gap to
    /// rejected (already covered) and returns the covering unit id if the
    /// catalog now covers it; returns `None` when the gap is still open.
    pub fn recheck_coverage(
        &mut self,
        registry: &Registry,
        matcher: &Matcher,
        domain_key: &str,
    ) -> Option<String> {
        let key = normalize_domain_key(domain_key);
        let gap = self.gaps.get_mut(&key)?;
        if gap.decision != GapDecision::Create {
            return None;
        }
        let unit_id = covering_unit(registry, matcher, &key, self.config.dedup_threshold)?;
        tracing::info!(domain = %key, unit = %unit_id, "create-decided gap now covered, rejecting");
        gap.decision = GapDecision::Rejected {
            reason: RejectReason::AlreadyCovered,
        };
        Some(unit_id)
    }

    #[must_use]
    pub fn get(&self, domain_key: &str) -> Option<&GapCandidate> {
        self.gaps.get(&normalize_domain_key(domain_key))
    }

    /// All gaps currently decided `Create`, awaiting curation.
    #[must_use]
    pub fn pending_creates(&self) -> Vec<&GapCandidate> {
        self.gaps
            .values()
            .filter(|g| g.decision == GapDecision::Create)
            .collect()
    }

    /// Remove a gap once the curator has turned it into a unit.
    pub fn complete(&mut self, domain_key: &str) -> Option<GapCandidate> {
        self.gaps.remove(&normalize_domain_key(domain_key))
    }
}

/// Existing active unit whose match score against the domain reaches the
/// dedup threshold, if any.
fn covering_unit(
    registry: &Registry,
    matcher: &Matcher,
    domain_key: &str,
    dedup_threshold: u32,
) -> Option<String> {
    let query = domain_key.replace('-', " ");
    let report = matcher.rank(registry, &query);
    report
        .candidates
        .first()
        .filter(|c| c.score >= dedup_threshold)
        .map(|c| c.unit_id.clone())
}

/// Bucket an occurrence count into a 0–3 frequency band.
fn frequency_band(count: usize, buckets: [usize; 3]) -> u8 {
    if count >= buckets[2] {
        3
    } else if count >= buckets[1] {
        2
    } else if count >= buckets[0] {
        1
    } else {
        0
    }
}

/// Normalize a free-text domain description into a stable key:
/// lowercase, alphanumeric runs joined by single hyphens.
#[must_use]
pub fn normalize_domain_key(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::config::MatcherConfig;
    use crate::model::{CapabilityUnit, SizeClass, TriggerPattern, UnitStatus};

    fn make_unit(id: &str, triggers: &[&str]) -> CapabilityUnit {
        CapabilityUnit {
            id: id.into(),
            title: id.into(),
            category_id: "general".into(),
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

    fn analyzer() -> GapAnalyzer {
        GapAnalyzer::new(GapConfig::default())
    }

    fn matcher() -> Matcher {
        Matcher::new(MatcherConfig::default())
    }

    #[test]
    fn normalize_domain_key_flattens_punctuation() {
        assert_eq!(normalize_domain_key("Payment Retries!"), "payment-retries");
        assert_eq!(normalize_domain_key("  gRPC / load-balancing "), "grpc-load-balancing");
        assert_eq!(normalize_domain_key(""), "");
    }

    #[test]
    fn frequency_band_buckets() {
        let buckets = [1, 2, 3];
        assert_eq!(frequency_band(0, buckets), 0);
        assert_eq!(frequency_band(1, buckets), 1);
        assert_eq!(frequency_band(2, buckets), 2);
        assert_eq!(frequency_band(3, buckets), 3);
        assert_eq!(frequency_band(10, buckets), 3);
    }

    #[test]
    fn worthiness_formula_matches_weights() {
        let bands = GapBands {
            frequency: 3,
            reusability: 2,
            complexity: 2,
            stability: 1,
        };
        assert_eq!(worthiness_score(bands), 21);
        assert_eq!(worthiness_score(GapBands::default()), 0);
    }

    #[test]
    fn high_scoring_domain_reaches_create() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();

        let estimate = BandEstimate {
            reusability: 2,
            complexity: 2,
            stability: 1,
        };
        for i in 0..3 {
            analyzer.record_occurrence(
                &registry,
                &matcher,
                "payment-retries",
                &format!("occurrence {i}"),
                estimate,
            );
        }

        let gap = analyzer.get("payment-retries").unwrap();
        assert_eq!(gap.decision, GapDecision::Create);
        assert_eq!(gap.occurrences.len(), 3);
        assert_eq!(gap.bands.frequency, 3);
        assert_eq!(gap.score, 21);
    }

    #[test]
    fn low_scoring_domain_rejected_after_min_occurrences() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = GapAnalyzer::new(GapConfig {
            // keep frequency from lifting the score past the thresholds
            reject_threshold: 8,
            create_threshold: 20,
            ..GapConfig::default()
        });

        let estimate = BandEstimate::default();
        analyzer.record_occurrence(&registry, &matcher, "one-off-thing", "first", estimate);
        assert_eq!(
            analyzer.get("one-off-thing").unwrap().decision,
            GapDecision::Tracking
        );

        analyzer.record_occurrence(&registry, &matcher, "one-off-thing", "second", estimate);
        assert_eq!(
            analyzer.get("one-off-thing").unwrap().decision,
            GapDecision::Rejected {
                reason: RejectReason::LowScore
            }
        );
    }

    #[test]
    fn rejection_is_absorbing_but_occurrences_still_recorded() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = GapAnalyzer::new(GapConfig {
            reject_threshold: 8,
            create_threshold: 50,
            ..GapConfig::default()
        });

        let weak = BandEstimate::default();
        analyzer.record_occurrence(&registry, &matcher, "niche", "a", weak);
        analyzer.record_occurrence(&registry, &matcher, "niche", "b", weak);
        assert!(analyzer.get("niche").unwrap().decision.is_rejected());

        // even a strong later estimate cannot resurrect the domain
        let strong = BandEstimate {
            reusability: 3,
            complexity: 3,
            stability: 3,
        };
        let gap = analyzer
            .record_occurrence(&registry, &matcher, "niche", "c", strong)
            .clone();
        assert!(gap.decision.is_rejected());
        assert_eq!(gap.occurrences.len(), 3);
    }

    #[test]
    fn covered_domain_rejects_regardless_of_score() {
        let mut registry = Registry::default();
        registry
            .register(make_unit("payments", &["payment retries"]))
            .unwrap();
        let matcher = matcher();
        let mut analyzer = analyzer();

        let strong = BandEstimate {
            reusability: 3,
            complexity: 3,
            stability: 3,
        };
        let gap = analyzer
            .record_occurrence(&registry, &matcher, "payment-retries", "ctx", strong)
            .clone();
        assert_eq!(
            gap.decision,
            GapDecision::Rejected {
                reason: RejectReason::AlreadyCovered
            }
        );
    }

    #[test]
    fn create_flips_to_rejected_when_catalog_catches_up() {
        let mut registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();

        let strong = BandEstimate {
            reusability: 3,
            complexity: 2,
            stability: 2,
        };
        analyzer.record_occurrence(&registry, &matcher, "payment-retries", "ctx", strong);
        assert_eq!(
            analyzer.get("payment-retries").unwrap().decision,
            GapDecision::Create
        );

        registry
            .register(make_unit("payments", &["payment retries"]))
            .unwrap();

        let covering = analyzer.recheck_coverage(&registry, &matcher, "payment-retries");
        assert_eq!(covering, Some("payments".to_string()));
        assert_eq!(
            analyzer.get("payment-retries").unwrap().decision,
            GapDecision::Rejected {
                reason: RejectReason::AlreadyCovered
            }
        );
    }

    #[test]
    fn recheck_on_open_gap_is_none() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();
        analyzer.record_occurrence(
            &registry,
            &matcher,
            "payment-retries",
            "ctx",
            BandEstimate::default(),
        );
        assert!(
            analyzer
                .recheck_coverage(&registry, &matcher, "payment-retries")
                .is_none()
        );
        assert!(
            analyzer
                .recheck_coverage(&registry, &matcher, "never-seen")
                .is_none()
        );
    }

    #[test]
    fn pending_creates_lists_only_create_decided() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();

        let strong = BandEstimate {
            reusability: 3,
            complexity: 2,
            stability: 2,
        };
        analyzer.record_occurrence(&registry, &matcher, "grpc-balancing", "a", strong);
        analyzer.record_occurrence(
            &registry,
            &matcher,
            "something-weak",
            "b",
            BandEstimate::default(),
        );

        let pending = analyzer.pending_creates();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].domain_key, "grpc-balancing");
    }

    #[test]
    fn complete_removes_the_gap() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();
        analyzer.record_occurrence(
            &registry,
            &matcher,
            "payment-retries",
            "ctx",
            BandEstimate::default(),
        );

        assert!(analyzer.complete("payment-retries").is_some());
        assert!(analyzer.get("payment-retries").is_none());
        assert!(analyzer.complete("payment-retries").is_none());
    }

    #[test]
    fn bands_clamped_to_three() {
        let registry = Registry::default();
        let matcher = matcher();
        let mut analyzer = analyzer();
        let wild = BandEstimate {
            reusability: 9,
            complexity: 200,
            stability: 4,
        };
        let gap = analyzer
            .record_occurrence(&registry, &matcher, "clamped", "ctx", wild)
            .clone();
        assert_eq!(gap.bands.reusability, 3);
        assert_eq!(gap.bands.complexity, 3);
        assert_eq!(gap.bands.stability, 3);
    }

    proptest! {
        #[test]
        fn score_is_monotonic_in_each_band(
            frequency in 0u8..=3,
            reusability in 0u8..=3,
            complexity in 0u8..=3,
            stability in 0u8..=3,
        ) {
            let base = GapBands { frequency, reusability, complexity, stability };
            let score = worthiness_score(base);
            for bumped in [
                GapBands { frequency: (frequency + 1).min(3), ..base },
                GapBands { reusability: (reusability + 1).min(3), ..base },
                GapBands { complexity: (complexity + 1).min(3), ..base },
                GapBands { stability: (stability + 1).min(3), ..base },
            ] {
                prop_assert!(worthiness_score(bumped) >= score);
            }
        }

        #[test]
        fn normalize_domain_key_never_panics(raw in ".*") {
            let key = normalize_domain_key(&raw);
            prop_assert!(!key.contains(' '));
        }
    }
}
