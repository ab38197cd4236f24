//! Error types for token acquisition

/// Errors from token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token request failed: {0}")]
    TokenRequest(String),

    #[error("invalid client credentials: {0}")]
    InvalidCredentials(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
