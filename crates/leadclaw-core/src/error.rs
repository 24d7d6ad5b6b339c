//! Error taxonomy for the outreach engine.
//!
//! `Validation` and `NotFound` surface synchronously to API callers;
//! `Dispatch` is caught per step inside the runner and never reaches the
//! batch caller; `Persistence` covers store reads/writes.

use thiserror::Error;

/// All errors produced by LeadClaw crates.
#[derive(Debug, Error)]
pub enum LeadClawError {
    /// Malformed input: missing recipients/steps/sequence name, negative delay.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown sequence or recipient.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate recipient at the lifecycle layer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A channel send failed: transport error or unsupported step type.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Store read/write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Transport-level failure (connection, API rejection).
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeadClawError {
    /// Whether this error is the caller's fault (maps to a 4xx status).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LeadClawError>;
