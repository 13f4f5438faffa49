//! Error types for Lodestone

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Lodestone error types
///
/// Every fallible operation in the workspace surfaces one of these
/// categories; the raising policy per layer is documented on the
/// operation itself.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input (bad hex, bech32, key length, payload shape)
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Relay transport or protocol failure
    #[error("relay error: {0}")]
    Relay(String),

    /// Per-call deadline elapsed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Wrong keys, or a malformed encrypted container
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Catch-all for failures outside the named categories
    #[error("{0}")]
    Internal(String),
}
