//! Error types for scheduling and removal

use enrollment_client::ClientError;

/// Errors from the scheduler and the removal workflow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("listing enrollment tokens failed: {0}")]
    Listing(#[source] ClientError),

    #[error("invalid {field} timestamp {value:?} on token {token_id}: {reason}")]
    Timestamp {
        token_id: String,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("reading status of token {token_id} failed: {source}")]
    Status {
        token_id: String,
        source: ClientError,
    },

    #[error("sync trigger for token {token_id} failed: {source}")]
    Trigger {
        token_id: String,
        source: ClientError,
    },

    #[error("resolving serial {serial} failed: {source}")]
    Resolve { serial: String, source: ClientError },

    #[error("deleting managed device {device_id} failed: {source}")]
    ManagedDeviceDelete {
        device_id: String,
        source: ClientError,
    },

    #[error(
        "managed device {device_id} still present {settle_secs}s after deletion; enrollment roster left untouched"
    )]
    VerificationFailed { device_id: String, settle_secs: u64 },

    #[error("verifying removal of serial {serial} failed: {source}")]
    VerificationRead { serial: String, source: ClientError },
}

/// Result alias for scheduler and workflow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_error_names_token_and_cause() {
        let err = Error::Trigger {
            token_id: "dep-1".into(),
            source: ClientError::RateLimited("sync enrollment token dep-1: TooManyRequests".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("dep-1"), "got: {msg}");
        assert!(msg.contains("TooManyRequests"), "got: {msg}");
    }

    #[test]
    fn verification_error_mentions_untouched_roster() {
        let err = Error::VerificationFailed {
            device_id: "md-1".into(),
            settle_secs: 10,
        };
        assert_eq!(
            err.to_string(),
            "managed device md-1 still present 10s after deletion; enrollment roster left untouched"
        );
    }

    #[test]
    fn source_chain_is_preserved() {
        use std::error::Error as _;
        let err = Error::ManagedDeviceDelete {
            device_id: "md-1".into(),
            source: ClientError::Http("connection reset".into()),
        };
        assert!(err.source().is_some());
    }
}
