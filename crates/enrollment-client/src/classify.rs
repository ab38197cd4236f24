//! HTTP status classification for Graph responses
//!
//! Maps a non-success status and body to a `ClientError`. Not-found is kept
//! distinct so callers can treat "already absent" as success.

use crate::ClientError;

/// Classify a non-success response into a `ClientError`.
///
/// 404 is `NotFound`, 401/403 are `Unauthorized` (missing permission or
/// expired token), 429 is `RateLimited`, everything else is `Api`.
pub fn classify_status(status: u16, body: &str, context: &str) -> ClientError {
    match status {
        404 => ClientError::NotFound(context.to_string()),
        401 | 403 => ClientError::Unauthorized {
            status,
            body: body.to_string(),
        },
        429 => ClientError::RateLimited(format!("{context}: {body}")),
        _ => ClientError::Api {
            status,
            body: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_is_not_found_with_context() {
        let err = classify_status(404, "{}", "managed device md-1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: managed device md-1");
    }

    #[test]
    fn status_401_is_unauthorized() {
        assert!(matches!(
            classify_status(401, "InvalidAuthenticationToken", "x"),
            ClientError::Unauthorized { status: 401, .. }
        ));
    }

    #[test]
    fn status_403_is_unauthorized() {
        assert!(matches!(
            classify_status(403, "Forbidden", "x"),
            ClientError::Unauthorized { status: 403, .. }
        ));
    }

    #[test]
    fn status_429_is_rate_limited() {
        let err = classify_status(429, "TooManyRequests", "sync dep-1");
        assert!(matches!(err, ClientError::RateLimited(_)));
        assert!(err.to_string().contains("sync dep-1"));
    }

    #[test]
    fn server_errors_keep_status_and_body() {
        match classify_status(503, "service unavailable", "x") {
            ClientError::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "service unavailable");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_client_error_is_api() {
        assert!(matches!(
            classify_status(409, "conflict", "x"),
            ClientError::Api { status: 409, .. }
        ));
    }
}
