//! Operation-level error types

use crate::calendar::{CalendarError, FailureKind};
use crate::ots::CodecError;
use std::fmt;
use thiserror::Error;

/// Main error type for stamping, upgrading and verifying
#[derive(Debug, Error)]
pub enum OtsError {
    // ========== Local Errors ==========
    /// Bad endpoint set, quorum, key material or URL
    #[error("configuration error: {0}")]
    Config(String),

    /// Proof bytes or structure cannot be interpreted
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Stamping Errors ==========
    /// Fewer calendars than required answered
    #[error("{0}")]
    QuorumNotReached(QuorumFailure),

    /// Single calendar failure surfaced directly
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),

    // ========== Verification Errors ==========
    /// File does not hash to the digest the proof commits to
    #[error("digest mismatch: proof commits to {expected}, file hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Block header needed for verification could not be fetched
    #[error("block header lookup failed: {0}")]
    BlockHeader(String),

    // ========== Internal Errors ==========
    /// Task panicked or was cancelled
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CodecError> for OtsError {
    fn from(e: CodecError) -> Self {
        OtsError::InvalidProof(e.to_string())
    }
}

/// Result type alias
pub type OtsResult<T> = Result<T, OtsError>;

/// Why one endpoint did not contribute to a stamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub url: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Diagnostics for a stamp that did not reach quorum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumFailure {
    pub required: usize,
    pub succeeded: usize,
    pub failures: Vec<EndpointFailure>,
}

impl fmt::Display for QuorumFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quorum not reached: {} of {} required calendars responded",
            self.succeeded, self.required
        )?;
        if !self.failures.is_empty() {
            let details: Vec<String> = self
                .failures
                .iter()
                .map(|e| format!("{} ({}: {})", e.url, e.kind, e.detail))
                .collect();
            write!(f, "; failed: {}", details.join(", "))?;
        }
        Ok(())
    }
}
