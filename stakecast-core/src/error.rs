//! Error types for stakecast-core

use thiserror::Error;

/// Result type alias for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Error types for market operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed or out-of-range input
    #[error("invalid input: {0}")]
    Validation(String),

    /// Wrong signer for the attempted operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not valid for the market's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown market id
    #[error("market not found: {0}")]
    NotFound(String),

    /// Address has already claimed on this market
    #[error("already claimed by {0}")]
    AlreadyClaimed(String),

    /// Zero-value claim or no stake on the winning side
    #[error("nothing to claim: {0}")]
    NothingToClaim(String),

    /// Command carried an op the router does not recognize
    #[error("unknown op: {0}")]
    UnknownOp(String),

    /// Record encode/decode errors
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Persisted record carries a codec version this build cannot read
    #[error("unsupported record version: {0}")]
    UnsupportedVersion(u32),

    /// Failure reported by the opaque key-value store
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}
