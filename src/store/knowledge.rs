//! Knowledge store backed by a single `SQLite` table.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::sync::Mutex;

use super::codec::{JsonCodec, MetadataCodec};
use super::error::StoreError;
use super::schema::{FILE_PRAGMAS, SCHEMA};
use super::types::{
    format_timestamp, is_storable_timestamp, parse_timestamp, BulkDeletion, DeleteScope,
    EntryFilter, FeatureSummary, HealthReport, HealthStats, KnowledgeEntry, NewEntry,
};

const ENTRY_COLUMNS: &str = "id, agent, feature, branch, summary, metadata, timestamp";

/// Default busy timeout for file-backed databases.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Returns the default path for the knowledge database.
///
/// This is `~/.agent_knowledge/knowledge.db`.
#[must_use]
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent_knowledge")
        .join("knowledge.db")
}

/// Settings used to open a [`KnowledgeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// File-backed store at `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// In-memory store, discarded when the last handle is dropped.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::file(default_db_path())
    }
}

/// Durable store of knowledge entries.
///
/// One connection is shared behind an async mutex; each operation runs on the
/// blocking pool and holds the lock for a single statement or transaction.
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    codec: Arc<dyn MetadataCodec>,
    path: Option<PathBuf>,
}

impl fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("path", &self.path)
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}

impl KnowledgeStore {
    /// Open a store with the given configuration.
    ///
    /// Creates parent directories if they don't exist and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database cannot
    /// be opened, or the schema cannot be applied.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let Some(path) = config.path.clone() else {
            return Self::open_in_memory().await;
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let busy_timeout = StdDuration::from_millis(config.busy_timeout_ms);
        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| StoreError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(FILE_PRAGMAS)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)??;

        tracing::info!(path = %path.display(), "Knowledge database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            codec: Arc::new(JsonCodec),
            path: Some(path),
        })
    }

    /// Open an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, StoreError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            codec: Arc::new(JsonCodec),
            path: None,
        })
    }

    /// Replace the metadata codec (builder pattern).
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn MetadataCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &dyn MetadataCodec) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut *conn, codec.as_ref())
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)?
    }

    /// Insert a new entry and return it as stored.
    ///
    /// The timestamp defaults to now and is truncated to the stored precision.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be encoded or the insert fails.
    pub async fn insert(&self, entry: NewEntry) -> Result<KnowledgeEntry, StoreError> {
        let timestamp = entry.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);
        check_storable("insert", &timestamp)?;
        let metadata = entry
            .metadata
            .as_ref()
            .map(|m| self.codec.encode(m))
            .transpose()?;

        let stored = self
            .with_conn(move |conn, _| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO knowledge (agent, feature, branch, summary, metadata, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.agent,
                        entry.feature,
                        entry.branch,
                        entry.summary,
                        metadata,
                        format_timestamp(&timestamp)
                    ],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;

                Ok(KnowledgeEntry {
                    id,
                    agent: entry.agent,
                    feature: entry.feature,
                    summary: entry.summary,
                    branch: entry.branch,
                    metadata: entry.metadata,
                    timestamp,
                })
            })
            .await?;

        tracing::info!(
            id = stored.id,
            agent = %stored.agent,
            feature = %stored.feature,
            "Knowledge shared"
        );
        Ok(stored)
    }

    /// Fetch a single entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row cannot be decoded.
    pub async fn get(&self, id: i64) -> Result<Option<KnowledgeEntry>, StoreError> {
        self.with_conn(move |conn, codec| {
            let raw = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM knowledge WHERE id = ?1"),
                    [id],
                    RawEntry::from_row,
                )
                .optional()?;
            raw.map(|r| r.decode(codec)).transpose()
        })
        .await
    }

    /// Query entries matching every given filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `limit` is zero, or an error
    /// if the query fails.
    pub async fn query(
        &self,
        filter: &EntryFilter,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let limit = sql_limit("query", limit)?;
        let owned = filter.clone();

        let entries: Vec<KnowledgeEntry> = self
            .with_conn(move |conn, codec| {
                let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM knowledge WHERE 1 = 1");
                let mut values: Vec<&dyn ToSql> = Vec::new();

                if let Some(feature) = &owned.feature {
                    sql.push_str(" AND feature = ?");
                    values.push(feature);
                }
                if let Some(branch) = &owned.branch {
                    sql.push_str(" AND branch = ?");
                    values.push(branch);
                }
                if let Some(agent) = &owned.agent {
                    sql.push_str(" AND agent = ?");
                    values.push(agent);
                }
                sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
                values.push(&limit);

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(values.as_slice(), RawEntry::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(|r| r.decode(codec)).collect()
            })
            .await?;

        tracing::debug!(
            count = entries.len(),
            feature = ?filter.feature,
            branch = ?filter.branch,
            agent = ?filter.agent,
            "Retrieved knowledge entries"
        );
        Ok(entries)
    }

    /// Entries recorded within `window` of now, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `window` is not positive or
    /// `limit` is zero, or an error if the query fails.
    pub async fn query_recent(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        if window <= Duration::zero() {
            return Err(StoreError::invalid(
                "query_recent",
                format!("window must be positive, got {window}"),
            ));
        }
        let cutoff = Utc::now().checked_sub_signed(window).ok_or_else(|| {
            StoreError::invalid("query_recent", format!("window {window} is out of range"))
        })?;
        self.query_since("query_recent", cutoff, limit).await
    }

    /// Entries with a timestamp strictly after `cutoff`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `limit` is zero, or an error
    /// if the query fails.
    pub async fn query_after(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.query_since("query_after", cutoff, limit).await
    }

    async fn query_since(
        &self,
        operation: &'static str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let limit = sql_limit(operation, limit)?;
        check_storable(operation, &cutoff)?;
        let cutoff_text = format_timestamp(&cutoff);

        let entries: Vec<KnowledgeEntry> = self
            .with_conn(move |conn, codec| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM knowledge
                     WHERE timestamp > ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![cutoff_text, limit], RawEntry::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(|r| r.decode(codec)).collect()
            })
            .await?;

        tracing::debug!(count = entries.len(), cutoff = %cutoff, "Retrieved recent entries");
        Ok(entries)
    }

    /// Summarize every feature, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_features(&self) -> Result<Vec<FeatureSummary>, StoreError> {
        let features: Vec<FeatureSummary> = self
            .with_conn(|conn, _| {
                let mut stmt = conn.prepare(
                    "SELECT feature, COUNT(*), MAX(timestamp), json_group_array(DISTINCT agent)
                     FROM knowledge
                     GROUP BY feature
                     ORDER BY MAX(timestamp) DESC, feature ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut result = Vec::with_capacity(rows.len());
                for (feature, count, latest, agents) in rows {
                    let mut contributing_agents: Vec<String> = serde_json::from_str(&agents)?;
                    contributing_agents.sort();
                    result.push(FeatureSummary {
                        feature,
                        entry_count: count.unsigned_abs(),
                        latest_update: parse_stored_timestamp(&latest, 2)?,
                        contributing_agents,
                    });
                }
                Ok(result)
            })
            .await?;

        tracing::debug!(count = features.len(), "Listed features");
        Ok(features)
    }

    /// Delete one entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for a non-positive id,
    /// [`StoreError::NotFound`] if no such entry exists, or an error if the
    /// delete fails.
    pub async fn delete_by_id(&self, id: i64) -> Result<u64, StoreError> {
        if id <= 0 {
            return Err(StoreError::invalid(
                "delete_by_id",
                format!("id must be positive, got {id}"),
            ));
        }

        let deleted = self
            .with_conn(move |conn, _| {
                Ok(conn.execute("DELETE FROM knowledge WHERE id = ?1", [id])?)
            })
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound { id });
        }
        tracing::info!(id, "Deleted entry");
        Ok(deleted as u64)
    }

    /// Delete every entry for `feature`. Requires `confirmed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfirmationRequired`] without touching data when
    /// `confirmed` is false, or an error if the delete fails.
    pub async fn delete_by_feature(
        &self,
        feature: &str,
        confirmed: bool,
    ) -> Result<BulkDeletion, StoreError> {
        if !confirmed {
            tracing::warn!(feature, "Rejected unconfirmed feature delete");
            return Err(StoreError::ConfirmationRequired {
                operation: "delete_by_feature",
            });
        }

        let owned = feature.to_string();
        let count = self
            .with_conn(move |conn, _| {
                let tx = conn.transaction()?;
                let count = tx.execute("DELETE FROM knowledge WHERE feature = ?1", [&owned])?;
                tx.commit()?;
                Ok(count as u64)
            })
            .await?;

        tracing::info!(feature, count, "Deleted feature entries");
        Ok(BulkDeletion {
            scope: DeleteScope::Feature(feature.to_string()),
            count,
        })
    }

    /// Delete every entry. Requires `confirmed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfirmationRequired`] without touching data when
    /// `confirmed` is false, or an error if the delete fails.
    pub async fn delete_all(&self, confirmed: bool) -> Result<BulkDeletion, StoreError> {
        if !confirmed {
            tracing::warn!("Rejected unconfirmed delete of all entries");
            return Err(StoreError::ConfirmationRequired {
                operation: "delete_all",
            });
        }

        let count = self
            .with_conn(|conn, _| {
                let tx = conn.transaction()?;
                let count = tx.execute("DELETE FROM knowledge", [])?;
                tx.commit()?;
                Ok(count as u64)
            })
            .await?;

        tracing::info!(count, "Deleted all entries");
        Ok(BulkDeletion {
            scope: DeleteScope::All,
            count,
        })
    }

    /// Count entries, distinct features and distinct agents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be read.
    pub async fn stats(&self) -> Result<HealthStats, StoreError> {
        self.with_conn(|conn, _| {
            let (entries, features, agents): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT feature), COUNT(DISTINCT agent) FROM knowledge",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(HealthStats {
                total_entries: entries.unsigned_abs(),
                total_features: features.unsigned_abs(),
                total_agents: agents.unsigned_abs(),
            })
        })
        .await
        .map_err(|err| match err {
            unavailable @ StoreError::Unavailable(_) => unavailable,
            other => StoreError::Unavailable(other.to_string()),
        })
    }

    /// Probe the store. Failures are reported, never returned.
    pub async fn health(&self) -> HealthReport {
        match self.stats().await {
            Ok(stats) => HealthReport::Healthy(stats),
            Err(err) => {
                tracing::warn!(error = %err, "Health check failed");
                HealthReport::Unhealthy {
                    error: err.to_string(),
                }
            }
        }
    }
}

fn sql_limit(operation: &'static str, limit: usize) -> Result<i64, StoreError> {
    if limit == 0 {
        return Err(StoreError::invalid(operation, "limit must be at least 1, got 0"));
    }
    Ok(i64::try_from(limit).unwrap_or(i64::MAX))
}

/// Timestamps outside years 0..=9999 do not format as fixed-width text.
fn check_storable(operation: &'static str, timestamp: &DateTime<Utc>) -> Result<(), StoreError> {
    if is_storable_timestamp(timestamp) {
        Ok(())
    } else {
        Err(StoreError::invalid(
            operation,
            format!("timestamp {timestamp} is outside years 0000-9999"),
        ))
    }
}

fn parse_stored_timestamp(text: &str, column: usize) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(text).map_err(|err| {
        StoreError::Query(rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            Box::new(err),
        ))
    })
}

/// A row as read from the table, before metadata and timestamp decoding.
struct RawEntry {
    id: i64,
    agent: String,
    feature: String,
    branch: Option<String>,
    summary: String,
    metadata: Option<String>,
    timestamp: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            agent: row.get(1)?,
            feature: row.get(2)?,
            branch: row.get(3)?,
            summary: row.get(4)?,
            metadata: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }

    fn decode(self, codec: &dyn MetadataCodec) -> Result<KnowledgeEntry, StoreError> {
        Ok(KnowledgeEntry {
            id: self.id,
            agent: self.agent,
            feature: self.feature,
            summary: self.summary,
            branch: self.branch,
            metadata: self.metadata.map(|m| codec.decode(&m)).transpose()?,
            timestamp: parse_stored_timestamp(&self.timestamp, 6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{DeleteStatus, Metadata};
    use chrono::TimeZone;
    use serde_json::json;

    fn metadata(value: serde_json::Value) -> Metadata {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    async fn seeded() -> KnowledgeStore {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let base = Utc::now() - Duration::minutes(30);
        let rows = [
            ("backend", "user-auth", Some("feature/auth"), "CREATED POST /login"),
            ("frontend", "user-auth", Some("feature/auth"), "CONSUMED /login"),
            ("backend", "payments", None, "CONFIGURED Stripe webhook"),
            ("db", "user-auth", Some("main"), "UPDATED users table"),
        ];
        for (i, (agent, feature, branch, summary)) in rows.into_iter().enumerate() {
            let mut entry =
                NewEntry::new(agent, feature, summary).at(base + Duration::minutes(i as i64));
            entry.branch = branch.map(String::from);
            store.insert(entry).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        assert!(store.path().is_none());
        assert!(format!("{store:?}").contains("json"));
    }

    #[tokio::test]
    async fn test_open_with_in_memory_config() {
        let store = KnowledgeStore::open(&StoreConfig::in_memory()).await.unwrap();
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("deep").join("knowledge.db");

        let store = KnowledgeStore::open(&StoreConfig::file(&db_path))
            .await
            .unwrap();
        assert_eq!(store.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with(".agent_knowledge/knowledge.db"));
        assert_eq!(StoreConfig::default().path, Some(path));
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();

        let mut last = 0;
        for i in 0..5 {
            let entry = store
                .insert(NewEntry::new("agent", "feature", format!("update {i}")))
                .await
                .unwrap();
            assert!(entry.id > last);
            last = entry.id;
        }
    }

    #[tokio::test]
    async fn test_insert_echoes_stored_entry() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();

        let inserted = store
            .insert(NewEntry::new("backend", "user-auth", "CREATED POST /login").branch("main"))
            .await
            .unwrap();
        let fetched = store.get(inserted.id).await.unwrap().unwrap();

        assert_eq!(fetched, inserted);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let original = metadata(json!({"a": 1, "b": [1, 2, 3]}));

        let entry = store
            .insert(NewEntry::new("a", "f", "s").metadata(original.clone()))
            .await
            .unwrap();
        let fetched = store.get(entry.id).await.unwrap().unwrap();

        assert_eq!(fetched.metadata, Some(original));
    }

    #[tokio::test]
    async fn test_absent_and_empty_optionals_stay_distinct() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();

        let bare = store.insert(NewEntry::new("a", "f", "s")).await.unwrap();
        let empty = store
            .insert(
                NewEntry::new("a", "f", "s")
                    .branch("")
                    .metadata(Metadata::new()),
            )
            .await
            .unwrap();

        let bare = store.get(bare.id).await.unwrap().unwrap();
        let empty = store.get(empty.id).await.unwrap().unwrap();
        assert_eq!(bare.branch, None);
        assert_eq!(bare.metadata, None);
        assert_eq!(empty.branch, Some(String::new()));
        assert_eq!(empty.metadata, Some(Metadata::new()));

        let only_empty = store
            .query(&EntryFilter::default().with_branch(""), 10)
            .await
            .unwrap();
        assert_eq!(only_empty.len(), 1);
        assert_eq!(only_empty[0].id, empty.id);
    }

    #[tokio::test]
    async fn test_query_newest_first_with_limit() {
        let store = seeded().await;

        let all = store.query(&EntryFilter::default(), 10).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let limited = store.query(&EntryFilter::default(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].summary, "UPDATED users table");
    }

    #[tokio::test]
    async fn test_query_filters_are_conjunctive() {
        let store = seeded().await;

        let auth = store
            .query(&EntryFilter::feature("user-auth"), 10)
            .await
            .unwrap();
        assert_eq!(auth.len(), 3);
        assert!(auth.iter().all(|e| e.feature == "user-auth"));

        let narrowed = store
            .query(
                &EntryFilter::feature("user-auth")
                    .with_branch("feature/auth")
                    .with_agent("backend"),
                10,
            )
            .await
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].summary, "CREATED POST /login");
    }

    #[tokio::test]
    async fn test_query_unknown_feature_is_empty() {
        let store = seeded().await;
        let none = store
            .query(&EntryFilter::feature("no-such-feature"), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_query_zero_limit_is_invalid() {
        let store = seeded().await;
        let err = store.query(&EntryFilter::default(), 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidArgument {
                operation: "query",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_same_timestamp_orders_by_id() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let at = Utc::now();

        let first = store
            .insert(NewEntry::new("a", "f", "first").at(at))
            .await
            .unwrap();
        let second = store
            .insert(NewEntry::new("b", "f", "second").at(at))
            .await
            .unwrap();

        let entries = store.query(&EntryFilter::feature("f"), 10).await.unwrap();
        assert_eq!(entries[0].id, second.id);
        assert_eq!(entries[1].id, first.id);
    }

    #[tokio::test]
    async fn test_query_recent_window() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let now = Utc::now();

        store
            .insert(NewEntry::new("a", "f", "old").at(now - Duration::hours(3)))
            .await
            .unwrap();
        store
            .insert(NewEntry::new("a", "f", "fresh").at(now - Duration::minutes(30)))
            .await
            .unwrap();

        let recent = store.query_recent(Duration::hours(1), 20).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].summary, "fresh");

        let wider = store.query_recent(Duration::hours(4), 20).await.unwrap();
        assert_eq!(wider.len(), 2);
    }

    #[tokio::test]
    async fn test_query_after_boundary_is_exclusive() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let at = Utc::now().trunc_subsecs(6) - Duration::hours(2);
        store
            .insert(NewEntry::new("a", "f", "edge").at(at))
            .await
            .unwrap();

        assert!(store.query_after(at, 10).await.unwrap().is_empty());
        let just_before = at - Duration::microseconds(1);
        assert_eq!(store.query_after(just_before, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_recent_rejects_bad_arguments() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();

        let err = store.query_recent(Duration::zero(), 10).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = store.query_recent(Duration::hours(1), 0).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_query_recent_window_past_calendar_range() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        store.insert(NewEntry::new("a", "f", "s")).await.unwrap();

        let err = store
            .query_recent(Duration::days(1_000_000_000), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidArgument {
                operation: "query_recent",
                ..
            }
        ));

        // A window reaching before year 0 cannot be compared as stored text
        let err = store
            .query_recent(Duration::days(365 * 3000), 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_insert_rejects_unstorable_timestamp() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        store.insert(NewEntry::new("a", "f", "kept")).await.unwrap();

        let far_future = Utc::now() + Duration::days(365 * 9000);
        let err = store
            .insert(NewEntry::new("a", "f", "too late").at(far_future))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidArgument {
                operation: "insert",
                ..
            }
        ));

        let before_year_zero = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap() - Duration::days(1);
        let err = store
            .insert(NewEntry::new("a", "f", "too early").at(before_year_zero))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let entries = store.query(&EntryFilter::default(), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "kept");
        assert_eq!(store.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_query_after_rejects_unstorable_cutoff() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let err = store
            .query_after(DateTime::<Utc>::MIN_UTC, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_list_features() {
        let store = seeded().await;

        let features = store.list_features().await.unwrap();
        assert_eq!(features.len(), 2);

        // user-auth has the most recent entry
        assert_eq!(features[0].feature, "user-auth");
        assert_eq!(features[0].entry_count, 3);
        assert_eq!(
            features[0].contributing_agents,
            vec!["backend", "db", "frontend"]
        );
        assert_eq!(features[1].feature, "payments");
        assert_eq!(features[1].contributing_agents, vec!["backend"]);

        let auth = store
            .query(&EntryFilter::feature("user-auth"), 100)
            .await
            .unwrap();
        assert_eq!(features[0].latest_update, auth[0].timestamp);
    }

    #[tokio::test]
    async fn test_list_features_keeps_agents_with_commas() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        store
            .insert(NewEntry::new("agent, the first", "f", "s"))
            .await
            .unwrap();

        let features = store.list_features().await.unwrap();
        assert_eq!(features[0].contributing_agents, vec!["agent, the first"]);
    }

    #[tokio::test]
    async fn test_list_features_empty_store() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        assert!(store.list_features().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id_twice() {
        let store = seeded().await;
        let target = store.query(&EntryFilter::default(), 1).await.unwrap()[0].id;

        assert_eq!(store.delete_by_id(target).await.unwrap(), 1);
        let err = store.delete_by_id(target).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id } if id == target));
        assert!(store.get(target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_id_rejects_non_positive() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let err = store.delete_by_id(0).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let first = store.insert(NewEntry::new("a", "f", "s")).await.unwrap();
        store.delete_by_id(first.id).await.unwrap();

        let second = store.insert(NewEntry::new("a", "f", "s")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_delete_by_feature_requires_confirmation() {
        let store = seeded().await;
        let filter = EntryFilter::feature("user-auth");
        let before = store.query(&filter, 100).await.unwrap();

        let err = store
            .delete_by_feature("user-auth", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConfirmationRequired { .. }));
        assert_eq!(store.query(&filter, 100).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_by_feature_confirmed() {
        let store = seeded().await;

        let deletion = store.delete_by_feature("user-auth", true).await.unwrap();
        assert_eq!(deletion.count, 3);
        assert_eq!(deletion.status(), DeleteStatus::Deleted);
        assert_eq!(deletion.scope, DeleteScope::Feature("user-auth".to_string()));

        let remaining = store.query(&EntryFilter::default(), 100).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].feature, "payments");

        let again = store.delete_by_feature("user-auth", true).await.unwrap();
        assert_eq!(again.count, 0);
        assert_eq!(again.status(), DeleteStatus::NoAction);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = seeded().await;

        let err = store.delete_all(false).await.unwrap_err();
        assert_eq!(err.kind(), "confirmation_required");
        assert_eq!(store.stats().await.unwrap().total_entries, 4);

        let deletion = store.delete_all(true).await.unwrap();
        assert_eq!(deletion.count, 4);
        assert_eq!(deletion.scope, DeleteScope::All);

        let empty = store.delete_all(true).await.unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.status(), DeleteStatus::NoAction);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = seeded().await;
        let stats = store.stats().await.unwrap();

        assert_eq!(
            stats,
            HealthStats {
                total_entries: 4,
                total_features: 2,
                total_agents: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_health_reports_unhealthy_instead_of_failing() {
        let store = seeded().await;
        assert!(store.health().await.is_healthy());

        store
            .conn
            .lock()
            .await
            .execute_batch("DROP TABLE knowledge")
            .unwrap();

        match store.health().await {
            HealthReport::Unhealthy { error } => {
                assert!(error.contains("Storage unavailable"), "{error}");
            }
            HealthReport::Healthy(stats) => panic!("expected unhealthy, got {stats:?}"),
        }
        assert!(store.stats().await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_surfaces_codec_error() {
        let store = KnowledgeStore::open_in_memory().await.unwrap();
        let entry = store.insert(NewEntry::new("a", "f", "s")).await.unwrap();

        store
            .conn
            .lock()
            .await
            .execute(
                "UPDATE knowledge SET metadata = 'not json' WHERE id = ?1",
                [entry.id],
            )
            .unwrap();

        let err = store.get(entry.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[tokio::test]
    async fn test_custom_codec_is_used() {
        struct UpperKeys;

        impl MetadataCodec for UpperKeys {
            fn name(&self) -> &'static str {
                "upper"
            }

            fn encode(&self, metadata: &Metadata) -> Result<String, StoreError> {
                let upper: Metadata = metadata
                    .iter()
                    .map(|(k, v)| (k.to_uppercase(), v.clone()))
                    .collect();
                JsonCodec.encode(&upper)
            }

            fn decode(&self, text: &str) -> Result<Metadata, StoreError> {
                JsonCodec.decode(text)
            }
        }

        let store = KnowledgeStore::open_in_memory()
            .await
            .unwrap()
            .with_codec(Arc::new(UpperKeys));
        let entry = store
            .insert(NewEntry::new("a", "f", "s").metadata(metadata(json!({"key": 1}))))
            .await
            .unwrap();

        let fetched = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.metadata, Some(metadata(json!({"KEY": 1}))));
    }
}
