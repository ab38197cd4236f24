//! App-only authentication against the Microsoft identity platform
//!
//! The sync and removal tooling never performs interactive sign-in. It either
//! receives a pre-acquired bearer token or acquires one itself with the OAuth
//! client-credentials grant, then caches it until shortly before expiry.
//!
//! Token flow:
//! 1. Config builds `AppCredentials` (tenant, client id, client secret)
//! 2. `TokenSource::client_credentials()` wraps them with an empty cache
//! 3. Every Graph request calls `TokenSource::bearer()`
//! 4. `bearer()` calls `token::acquire_token()` when the cache is empty or
//!    the cached token expires within `REFRESH_MARGIN`

pub mod constants;
pub mod error;
pub mod source;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use source::TokenSource;
pub use token::{AppCredentials, TokenResponse, acquire_token};
