//! Server error types and their HTTP mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::api::ErrorResponse;
use crate::store::StoreError;

/// Errors that can occur while starting or running the server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Server error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An error returned from a handler.
#[derive(Debug)]
pub enum ApiError {
    /// The store rejected or failed the operation.
    Store(StoreError),
    /// The request body, path or query string could not be extracted.
    Rejected { status: StatusCode, detail: String },
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// HTTP status for the error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::Validation { .. } | StoreError::InvalidArgument { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::ConfirmationRequired { .. }) => StatusCode::BAD_REQUEST,
            Self::Store(err) if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected { status, .. } => *status,
        }
    }

    /// Error category reported in the response body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(err) => err.kind(),
            Self::Rejected { status, .. } if *status == StatusCode::UNPROCESSABLE_ENTITY => {
                "validation_error"
            }
            Self::Rejected { .. } => "invalid_request",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Store(err @ StoreError::ConfirmationRequired { .. }) => {
                format!("{err}. Add ?confirm=true to proceed")
            }
            Self::Store(err) => err.to_string(),
            Self::Rejected { detail, .. } => detail.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            tracing::error!(error = %detail, "Request failed");
        }
        let body = ErrorResponse {
            status: "error".to_string(),
            error: self.kind().to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}
