use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One trigger attached to a capability unit.
///
/// Strings containing glob metacharacters match against query tokens and
/// hyphen-joined bigrams; everything else is an exact phrase checked for
/// containment in the normalized query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TriggerPattern {
    Phrase(String),
    Glob(String),
}

impl TriggerPattern {
    /// Classify a raw trigger string as a glob or an exact phrase.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if raw.contains(['*', '?', '[']) {
            Self::Glob(raw.to_lowercase())
        } else {
            Self::Phrase(raw.to_lowercase())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Phrase(s) | Self::Glob(s) => s,
        }
    }
}

/// Size class derived from body length, never stored authoritatively
/// anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    /// Derive the size class of a body from its byte length.
    #[must_use]
    pub fn classify(body_len: usize, small_max: usize, medium_max: usize) -> Self {
        if body_len <= small_max {
            Self::Small
        } else if body_len <= medium_max {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitStatus {
    Active,
    Archived { superseded_by: Option<String> },
}

impl UnitStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A single retrievable guidance document's metadata. The body lives in
/// external storage and is fetched lazily by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityUnit {
    pub id: String,
    pub title: String,
    pub category_id: String,
    pub trigger_patterns: Vec<TriggerPattern>,
    #[serde(default)]
    pub related_unit_ids: BTreeSet<String>,
    pub size_class: SizeClass,
    pub status: UnitStatus,
    /// Status activity timestamp, stamped by the registry on every
    /// effective mutation.
    pub updated_at: DateTime<Utc>,
}

impl CapabilityUnit {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Definition equality, ignoring the registry-stamped activity timestamp.
    ///
    /// Re-registering a definition-identical unit is an idempotent no-op.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.category_id == other.category_id
            && self.trigger_patterns == other.trigger_patterns
            && self.related_unit_ids == other.related_unit_ids
            && self.size_class == other.size_class
            && self.status == other.status
    }
}

/// Explicit category with a membership list. Created lazily on first member
/// registration; description and discovery patterns are filled in by the
/// curator or the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub member_unit_ids: Vec<String>,
    #[serde(default)]
    pub discovery_patterns: Vec<String>,
}
