//! Knowledge entry types.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Structured metadata attached to an entry.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A stored knowledge entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Store-assigned id, never reused.
    pub id: i64,
    /// Contributing agent.
    pub agent: String,
    /// Feature (knowledge branch) the entry belongs to.
    pub feature: String,
    /// Free-text content.
    pub summary: String,
    /// Git branch, if one was given.
    pub branch: Option<String>,
    /// Caller-supplied structured data.
    pub metadata: Option<Metadata>,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// An entry to be inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub agent: String,
    pub feature: String,
    pub summary: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Explicit timestamp; the store uses the current time when absent.
    #[serde(skip)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    /// Create a new entry with the required fields.
    #[must_use]
    pub fn new(
        agent: impl Into<String>,
        feature: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            feature: feature.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Set the branch.
    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Record the entry at an explicit point in time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check that the required fields are present and not blank.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (field, value) in [
            ("agent", &self.agent),
            ("feature", &self.feature),
            ("summary", &self.summary),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::Validation { field });
            }
        }
        Ok(())
    }
}

/// Conjunctive filter for [`query`](super::KnowledgeStore::query).
///
/// `None` imposes no constraint; `Some("")` matches the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub feature: Option<String>,
    pub branch: Option<String>,
    pub agent: Option<String>,
}

impl EntryFilter {
    /// Filter on a single feature.
    #[must_use]
    pub fn feature(feature: impl Into<String>) -> Self {
        Self {
            feature: Some(feature.into()),
            ..Default::default()
        }
    }

    /// Also filter on branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Also filter on agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// Per-feature aggregate computed from stored entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub feature: String,
    pub entry_count: u64,
    pub latest_update: DateTime<Utc>,
    pub contributing_agents: Vec<String>,
}

/// Store-wide counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStats {
    pub total_entries: u64,
    pub total_features: u64,
    pub total_agents: u64,
}

/// Outcome of a health probe. Never an error: failures become `Unhealthy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    Healthy(HealthStats),
    Unhealthy { error: String },
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }
}

/// What a bulk delete targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    Feature(String),
    All,
}

/// Whether a bulk delete removed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    NoAction,
}

impl DeleteStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::NoAction => "no_action",
        }
    }
}

/// Result of a confirmed bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeletion {
    pub scope: DeleteScope,
    pub count: u64,
}

impl BulkDeletion {
    /// `NoAction` when nothing matched.
    #[must_use]
    pub fn status(&self) -> DeleteStatus {
        if self.count == 0 {
            DeleteStatus::NoAction
        } else {
            DeleteStatus::Deleted
        }
    }
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision with a `Z` suffix keeps lexical order equal to
/// chronological order, which the `timestamp DESC` indexes rely on.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether `timestamp` falls in the years [`format_timestamp`] writes as
/// fixed-width text.
#[must_use]
pub fn is_storable_timestamp(timestamp: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&timestamp.year())
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns the chrono parse error if the text is not RFC 3339.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc))
}
