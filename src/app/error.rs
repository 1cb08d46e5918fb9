use thiserror::Error;

use crate::auth::AuthState;
use crate::domain::ListKind;

/// Failure classes of a remote call.
///
/// This is what a `Failed` cache entry carries and what shared in-flight
/// fetches resolve to, so it has to stay `Copy`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    #[error("network failure")]
    NetworkFailure,

    #[error("unauthorized: missing or invalid session")]
    Unauthorized,

    #[error("resource not found")]
    NotFound,

    #[error("rate limited by remote API")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("unknown remote error")]
    Unknown,
}

impl ApiErrorKind {
    /// Whether a transport may try the same request again.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ApiErrorKind::NetworkFailure | ApiErrorKind::RateLimited | ApiErrorKind::Timeout
        )
    }
}

#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiErrorKind),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: AuthState, action: &'static str },

    #[error("A {list} toggle for item {item_id} is already in flight")]
    TogglePending { item_id: u64, list: ListKind },

    #[error("Invalid rating {0}: expected 0.5 to 10.0 in steps of 0.5")]
    InvalidRating(f64),
}

impl ReelError {
    /// The remote failure class, if this error came from the API.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            ReelError::Api(kind) => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReelError>;
