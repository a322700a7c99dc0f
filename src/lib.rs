//! Boardwalk - swimlane diagram generation for collaboration boards.
//!
//! This library provides the core functionality for the `bwk` CLI tool:
//! loading and validating chart plans, computing swimlane geometry, driving
//! a board's REST API in rate-limited batches, recording every created item
//! in a durable run ledger, auditing the rendered result by reading it back,
//! and tearing runs down in dependency order.

pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod layout;
pub mod ledger;
pub mod plan;
pub mod remote;
pub mod validate;

/// Library-level error type for boardwalk operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The chart plan violated a document invariant. The message lists every
    /// offending path (e.g. `nodes[3].lane`). Raised before any remote call.
    #[error("invalid chart plan:\n{0}")]
    InvalidPlan(String),

    /// A patch operation could not be applied: missing path, bad index, or
    /// the patched document failed re-validation.
    #[error("patch error: {0}")]
    Patch(String),

    /// Board API failure that exhausted the retry budget, or a non-retryable
    /// error response.
    #[error("board API error: {0}")]
    Remote(#[from] remote::RemoteError),

    /// Required configuration is absent (access token, board id).
    #[error("missing configuration: {0}")]
    Config(String),

    /// The run ledger is malformed or inconsistent.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// A generation run aborted after partial creation. The ledger remains
    /// the authoritative record of what exists remotely.
    #[error(
        "run {run_id} failed: {source}\nledger: {ledger_path} (run `bwk cleanup {ledger_path}` to remove partial output)"
    )]
    RunFailed {
        run_id: String,
        ledger_path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for boardwalk operations.
pub type Result<T> = std::result::Result<T, Error>;
