//! Remote service client for device enrollment and device management
//!
//! Defines the `EnrollmentService` trait that decouples the scheduler and the
//! removal workflow from the wire protocol. `GraphClient` implements it over
//! Microsoft Graph; tests implement it in memory.
//!
//! Registries behind the trait:
//! - enrollment tokens (Apple enrollment program onboarding settings), each with
//!   a sync trigger and a paginated roster of imported device identities
//! - managed devices, looked up by serial number and deleted by record id

pub mod classify;
pub mod graph;
pub mod model;
pub mod pages;

pub use classify::classify_status;
pub use graph::GraphClient;
pub use model::{EnrolledDeviceIdentity, EnrollmentToken, ManagedDeviceRecord, Page};
pub use pages::enrolled_identities;

use std::future::Future;
use std::pin::Pin;

/// Errors from remote service operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("remote service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether the remote entity is already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<graph_auth::Error> for ClientError {
    fn from(err: graph_auth::Error) -> Self {
        ClientError::Auth(err.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Boxed future returned by `EnrollmentService` methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations consumed from the remote enrollment and device registries.
///
/// Uses boxed futures for dyn-compatibility (`Arc<dyn EnrollmentService>`).
/// Every call is a single request except `list_enrollment_tokens`, which
/// follows continuation links until the listing is complete.
pub trait EnrollmentService: Send + Sync {
    /// All enrollment tokens, in the order the service returns them.
    fn list_enrollment_tokens(&self) -> BoxFuture<'_, Result<Vec<EnrollmentToken>>>;

    /// Fresh status of a single token.
    fn get_enrollment_token<'a>(&'a self, token_id: &'a str)
    -> BoxFuture<'a, Result<EnrollmentToken>>;

    /// Ask the service to sync the token's roster with the upstream program.
    /// The service enforces its own cooldown; calls made during it may be ignored.
    fn trigger_enrollment_sync<'a>(&'a self, token_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Exact serial-number lookup in the device-management registry.
    fn find_managed_device<'a>(
        &'a self,
        serial_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<ManagedDeviceRecord>>>;

    fn delete_managed_device<'a>(&'a self, device_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// One page of a token's roster. Pass `None` for the first page and the
    /// previous page's `next_link` afterwards.
    fn list_enrolled_device_identities<'a>(
        &'a self,
        token_id: &'a str,
        next_link: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Page<EnrolledDeviceIdentity>>>;

    /// Remove one identity from a token's roster. Returns `ClientError::NotFound`
    /// when the identity is already gone.
    fn remove_enrolled_device_identity<'a>(
        &'a self,
        token_id: &'a str,
        identity_id: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}
