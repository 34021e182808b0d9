use std::string::FromUtf8Error;

use thiserror::Error;

/// Error type for durakv.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error, raised by the log writer on append/sync failure.
    ///
    /// Fatal to the operation in progress: the caller must not treat the
    /// mutation as acknowledged.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization error.
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    /// Key or value is an invalid UTF-8 sequence.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),
    /// The store has been closed; no further mutations are permitted.
    #[error("store is closed")]
    Closed,
    /// The client request could not be parsed as JSON.
    #[error("invalid_json")]
    InvalidJson,
    /// `get`/`delete` requires a `key` field.
    #[error("missing_key")]
    MissingKey,
    /// `set` requires both `key` and `value`.
    #[error("missing_key_or_value")]
    MissingKeyOrValue,
    /// The request's `op` field did not name a known operation.
    #[error("unknown_op")]
    UnknownOp,
    /// `bulk_set`'s `items` field was not a list of 2-element pairs.
    #[error("invalid_items")]
    InvalidItems,
    /// `search_text`/`search_embedding` requires a `query` field.
    #[error("missing_query")]
    MissingQuery,
    /// `search_embedding`'s `top_k` field was present but not a non-negative integer.
    #[error("invalid_top_k")]
    InvalidTopK,
    /// Coordinator cluster: every node in the fixed ordering is `Down`.
    #[error("no available node in cluster")]
    NoAvailableNode,
    /// Quorum cluster: fewer than a majority of nodes were `Up` before the
    /// operation was attempted.
    #[error("insufficient nodes for quorum: need {need}, have {have}")]
    InsufficientNodes { need: usize, have: usize },
    /// Quorum cluster: a majority could not be reached after contacting every
    /// `Up` node.
    #[error("failed to reach quorum: {got}/{need}")]
    QuorumUnreached { need: usize, got: usize },
    /// Catch-all for error conditions with no dedicated variant.
    #[error("{0}")]
    StringError(String),
}

/// Custom result type for StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// The wire-level error tag sent back to clients, matching the
    /// dispatcher's `{"status":"error","error":<kind>}` response schema.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            StoreError::InvalidJson => "invalid_json",
            StoreError::MissingKey => "missing_key",
            StoreError::MissingKeyOrValue => "missing_key_or_value",
            StoreError::UnknownOp => "unknown_op",
            StoreError::InvalidItems => "invalid_items",
            StoreError::MissingQuery => "missing_query",
            StoreError::InvalidTopK => "invalid_top_k",
            StoreError::Io(_) => "io_error",
            _ => "error",
        }
    }
}
