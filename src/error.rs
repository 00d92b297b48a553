//! Error types for forwardr operations.
//!
//! Subsystem errors that cross module boundaries live here:
//! - Dispatching content to a publishing target
//! - Releasing shared content assets
//! - Operator-facing queue operations
//!
//! Storage, processor and configuration errors are defined next to the
//! code that raises them.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors a dispatcher can report for a single delivery attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Target rejected the content: {0}")]
    Rejected(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Target responded with status {code}: {body}")]
    Status { code: u16, body: String },
}

/// Errors raised while releasing a content asset.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Release failed: {0}")]
    Other(String),
}

/// Errors returned by the operator-facing queue surface.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Target '{0}' is not registered")]
    UnknownTarget(String),

    #[error("No eligible targets for this content")]
    NoTargets,
}
