//! Knowledge store: one `SQLite` table of agent-posted entries.

mod codec;
mod error;
mod knowledge;
mod schema;
mod types;

pub use codec::{JsonCodec, MetadataCodec};
pub use error::StoreError;
pub use knowledge::{default_db_path, KnowledgeStore, StoreConfig, DEFAULT_BUSY_TIMEOUT_MS};
pub use schema::SCHEMA;
pub use types::{
    format_timestamp, is_storable_timestamp, parse_timestamp, BulkDeletion, DeleteScope,
    DeleteStatus, EntryFilter, FeatureSummary, HealthReport, HealthStats, KnowledgeEntry,
    Metadata, NewEntry,
};
