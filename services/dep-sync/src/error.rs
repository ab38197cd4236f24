//! Service-specific error types

use thiserror::Error;

/// Shell errors that are not remote-call or configuration failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("terminal prompt failed: {0}")]
    Prompt(String),

    #[error("terminal raw mode unavailable: {0}")]
    Terminal(String),

    #[error("metrics exporter failed to start on {addr}: {reason}")]
    MetricsExporter { addr: String, reason: String },
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Prompt(err.to_string())
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
