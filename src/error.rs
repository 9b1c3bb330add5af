//! Top-level error type and its `axum` `IntoResponse` mapping.
//!
//! The teacher threads `color_eyre::Result` through its command layer for
//! ad-hoc diagnostics; at the HTTP boundary we need a closed, typed set
//! of failure modes so each one maps to a specific status code (spec.md
//! §7), so this crate adds a `thiserror` enum at that seam the way the
//! pack's HTTP-serving examples (e.g. `giorgiobrullo-cider-api`) do,
//! while still using `color_eyre`-style context internally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::codec::CodecError;
use crate::query::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum EuphonyError {
    #[error("mpd connection failed: {0}")]
    MpdConnection(#[source] std::io::Error),

    #[error("mpd returned an error for `{command}`: {message}")]
    MpdCommand { command: String, message: String },

    #[error("malformed dmap body: {0}")]
    Codec(#[from] CodecError),

    #[error("bad query: {0}")]
    Query(#[from] QueryError),

    #[error("no such {kind} with id {id}")]
    NotFound { kind: &'static str, id: u64 },

    #[error("pairing guid {0} is not recognized")]
    LoginFailed(String),

    #[error("pairing code was rejected")]
    PairingRejected,

    #[error("artwork unavailable for this track")]
    ArtworkUnavailable,

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] color_eyre::eyre::Error),
}

impl IntoResponse for EuphonyError {
    fn into_response(self) -> Response {
        let status = match &self {
            EuphonyError::MpdConnection(_) | EuphonyError::Storage(_) | EuphonyError::Internal(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EuphonyError::MpdCommand { .. } => StatusCode::BAD_GATEWAY,
            EuphonyError::Codec(CodecError::UnknownTag { .. }) => StatusCode::NOT_FOUND,
            EuphonyError::Codec(_) => StatusCode::BAD_REQUEST,
            EuphonyError::Query(_) => StatusCode::BAD_REQUEST,
            EuphonyError::NotFound { .. } => StatusCode::NOT_FOUND,
            EuphonyError::LoginFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            EuphonyError::PairingRejected => StatusCode::FORBIDDEN,
            EuphonyError::ArtworkUnavailable => StatusCode::NOT_FOUND,
            EuphonyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self, %status, "request failed");
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EuphonyError>;
