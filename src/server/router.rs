//! Knowledge HTTP server with axum router and graceful shutdown.

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{
    delete_all, delete_entry, delete_feature, get_features, get_guide, get_health, get_recent,
    get_retrieve, post_share, AppState,
};
use crate::config::ServerConfig;
use crate::store::KnowledgeStore;

/// HTTP front end for a [`KnowledgeStore`].
pub struct KnowledgeServer {
    /// Server configuration.
    config: ServerConfig,
    /// Application state shared across handlers.
    state: AppState,
    /// Cancellation token for graceful shutdown.
    cancel: CancellationToken,
}

impl KnowledgeServer {
    /// Create a new server over an opened store.
    #[must_use]
    pub fn new(store: KnowledgeStore, config: ServerConfig) -> Self {
        let state = AppState::new(store).with_default_limit(config.default_limit);
        Self {
            config,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Open the store named by `config` and build a server over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub async fn open(config: ServerConfig) -> Result<Self, ServerError> {
        let store = KnowledgeStore::open(&config.store_config()).await?;
        Ok(Self::new(store, config))
    }

    /// Token that stops the server when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// The store this server fronts.
    #[must_use]
    pub fn store(&self) -> &KnowledgeStore {
        &self.state.store
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(get_guide))
            .route("/share", post(post_share))
            .route("/retrieve", get(get_retrieve))
            .route("/recent", get(get_recent))
            .route("/features", get(get_features))
            .route("/health", get(get_health))
            // Static segment wins over the id parameter
            .route("/delete/all", delete(delete_all))
            .route("/delete/feature/:feature", delete(delete_feature))
            .route("/delete/:id", delete(delete_entry))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server, binding to the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindError {
                address: addr.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until the cancel token fires.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.cancel.clone();
        let app = self.build_router();

        let local = listener
            .local_addr()
            .map_or_else(|_| self.address(), |a| a.to_string());
        tracing::info!(
            address = %local,
            database = ?self.state.store.path(),
            "Starting knowledge server"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Knowledge server shutting down gracefully");
            })
            .await
            .map_err(ServerError::Serve)
    }
}
