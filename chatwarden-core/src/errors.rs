//! errors.rs - Custom error types for the chatwarden-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//!
//! License: MIT OR Apache-2.0

use thiserror::Error;

use chatwarden_store::StoreError;

/// This enum represents all possible error types in the `chatwarden-core`
/// library.
///
/// `#[non_exhaustive]` signals to consumers that new variants may be added in
/// future versions, so they must not match exhaustively.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WardenError {
    #[error("Failed to compile the tier {0} matcher: {1}")]
    TierCompilation(u8, regex::Error),

    #[error("Term '{0}': decoded pattern length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("Forbidden-term list is invalid: {0}")]
    InvalidTermList(String),

    #[error("Moderation policy is invalid: {0}")]
    InvalidPolicy(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("A critical system error occurred: {0}")]
    AnyhowWrapper(#[from] anyhow::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}
