//! Request and response types for the knowledge HTTP endpoints.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{BulkDeletion, DeleteScope, EntryFilter, HealthStats, KnowledgeEntry};

/// Maximum `limit` accepted by `/retrieve` and `/recent`.
pub const MAX_LIMIT: usize = 100;

/// Look-back window used by `/recent` when none is given.
pub const DEFAULT_RECENT_HOURS: i64 = 24;

/// Longest look-back window accepted by `/recent` (one week).
pub const MAX_RECENT_HOURS: i64 = 168;

/// Result count used by `/recent` when none is given.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

fn clamp_limit(limit: Option<i64>, default: usize) -> usize {
    match limit {
        Some(n) => usize::try_from(n.max(1)).map_or(MAX_LIMIT, |n| n.min(MAX_LIMIT)),
        None => default.clamp(1, MAX_LIMIT),
    }
}

/// Query parameters for GET /retrieve.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveQuery {
    pub feature: Option<String>,
    pub branch: Option<String>,
    pub agent: Option<String>,
    pub limit: Option<i64>,
}

impl RetrieveQuery {
    /// The requested limit clamped to `1..=MAX_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self, default: usize) -> usize {
        clamp_limit(self.limit, default)
    }

    #[must_use]
    pub fn filter(&self) -> EntryFilter {
        EntryFilter {
            feature: self.feature.clone(),
            branch: self.branch.clone(),
            agent: self.agent.clone(),
        }
    }
}

/// Query parameters for GET /recent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentQuery {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

impl RecentQuery {
    /// The requested window in hours, clamped to `1..=MAX_RECENT_HOURS`.
    #[must_use]
    pub fn effective_hours(&self) -> i64 {
        self.hours
            .unwrap_or(DEFAULT_RECENT_HOURS)
            .clamp(1, MAX_RECENT_HOURS)
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::hours(self.effective_hours())
    }

    #[must_use]
    pub fn effective_limit(&self) -> usize {
        clamp_limit(self.limit, DEFAULT_RECENT_LIMIT)
    }
}

/// Confirmation flag for bulk deletes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Response for POST /share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareResponse {
    pub status: String,
    pub message: String,
    pub id: i64,
    pub agent: String,
    pub feature: String,
    pub branch: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<KnowledgeEntry> for ShareResponse {
    fn from(entry: KnowledgeEntry) -> Self {
        Self {
            status: "success".to_string(),
            message: "Knowledge shared successfully".to_string(),
            id: entry.id,
            agent: entry.agent,
            feature: entry.feature,
            branch: entry.branch,
            timestamp: entry.timestamp,
        }
    }
}

/// Response for the delete endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// `deleted` or `no_action`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub message: String,
}

impl DeleteResponse {
    /// A single entry was removed.
    #[must_use]
    pub fn entry(id: i64) -> Self {
        Self {
            status: "deleted".to_string(),
            id: Some(id),
            feature: None,
            count: None,
            message: format!("Knowledge entry {id} deleted successfully"),
        }
    }
}

impl From<BulkDeletion> for DeleteResponse {
    fn from(deletion: BulkDeletion) -> Self {
        let status = deletion.status().as_str().to_string();
        let count = deletion.count;
        let (feature, message) = match deletion.scope {
            DeleteScope::Feature(feature) => {
                let message = if count == 0 {
                    format!("No entries found for feature '{feature}'")
                } else {
                    format!("Deleted {count} entries for feature '{feature}'")
                };
                (Some(feature), message)
            }
            DeleteScope::All => {
                let message = if count == 0 {
                    "Database is already empty".to_string()
                } else {
                    format!("Deleted all {count} entries. Database is now empty.")
                };
                (None, message)
            }
        };

        Self {
            status,
            id: None,
            feature,
            count: Some(count),
            message,
        }
    }
}

/// Response for GET /health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<HealthStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub server_time: DateTime<Utc>,
}

impl HealthResponse {
    #[must_use]
    pub fn healthy(stats: HealthStats, database_path: Option<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            database: Some("connected".to_string()),
            database_path,
            statistics: Some(stats),
            error: None,
            server_time: Utc::now(),
        }
    }

    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            database: None,
            database_path: None,
            statistics: None,
            error: Some(error.into()),
            server_time: Utc::now(),
        }
    }
}

/// Body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    /// Error category, e.g. `not_found`.
    pub error: String,
    pub detail: String,
}

/// Usage guide served at GET /.
#[must_use]
pub fn guide() -> serde_json::Value {
    serde_json::json!({
        "service": concat!("Agent Knowledge Server v", env!("CARGO_PKG_VERSION")),
        "description": "Share knowledge between agents working on different features. \
                        Each feature is a knowledge branch that agents contribute to.",
        "how_to_use": {
            "1_check_existing": "Before starting work, retrieve existing knowledge: GET /retrieve?feature=your-feature",
            "2_share_progress": "After implementing something, share it: POST /share",
            "3_be_consistent": "Use consistent feature names across all agents",
            "4_be_specific": "Include concrete details (endpoints, schemas, decisions) in summaries"
        },
        "naming_conventions": {
            "features": "kebab-case: user-auth, payment-api, admin-dashboard",
            "agents": "backend-agent, frontend-agent, database-agent",
            "branches": "optional git branches: feature/user-auth, main, hotfix/bug-123"
        },
        "summary_template": {
            "format": "[ACTION] [WHAT] - [DETAILS]",
            "examples": [
                "CREATED POST /api/auth/login - Accepts {email, password}, returns {token, expiresIn}",
                "UPDATED User model - Added 'last_login' and 'failed_attempts' fields"
            ]
        },
        "endpoints": {
            "POST /share": "Share new knowledge about a feature",
            "GET /retrieve": "Get knowledge with filters (feature, branch, agent, limit 1-100)",
            "GET /recent": "Get recent updates across all features (hours 1-168, limit 1-100)",
            "GET /features": "List all knowledge branches with statistics",
            "DELETE /delete/{id}": "Delete a specific knowledge entry",
            "DELETE /delete/feature/{feature}?confirm=true": "Delete all entries for a feature",
            "DELETE /delete/all?confirm=true": "Clear the entire database",
            "GET /health": "Check server status"
        }
    })
}
