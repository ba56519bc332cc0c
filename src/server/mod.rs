//! HTTP façade over the knowledge store.

mod api;
mod error;
mod handlers;
mod router;

pub use api::{
    guide, ConfirmQuery, DeleteResponse, ErrorResponse, HealthResponse, RecentQuery,
    RetrieveQuery, ShareResponse, DEFAULT_RECENT_HOURS, DEFAULT_RECENT_LIMIT, MAX_LIMIT,
    MAX_RECENT_HOURS,
};
pub use error::{ApiError, ServerError};
pub use handlers::AppState;
pub use router::KnowledgeServer;
