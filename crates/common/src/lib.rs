//! Shared types for the dep-sync workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
