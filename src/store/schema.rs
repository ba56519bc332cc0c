//! Database schema for the knowledge store.

/// SQL schema for the knowledge database.
///
/// `AUTOINCREMENT` keeps ids from being reused after deletion.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS knowledge (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent TEXT NOT NULL,
    feature TEXT NOT NULL,
    branch TEXT,
    summary TEXT NOT NULL,
    metadata TEXT,
    timestamp TEXT NOT NULL
);

-- Every read path filters by feature and/or orders by recency
CREATE INDEX IF NOT EXISTS idx_feature ON knowledge(feature);
CREATE INDEX IF NOT EXISTS idx_feature_timestamp ON knowledge(feature, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_timestamp ON knowledge(timestamp DESC);
";

/// Pragmas applied to file-backed databases before the schema.
pub const FILE_PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";
