//! Per-calendar error types

use std::fmt;
use thiserror::Error;

/// Failure of a single calendar round-trip
///
/// These never cross the fan-out boundary as operation errors; the stamper
/// and upgrader record them per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Calendar returned an error status
    #[error("service error: {0}")]
    ServiceError(String),

    /// Response body could not be decoded as a timestamp
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request timeout
    #[error("timeout after {0} ms")]
    Timeout(u64),

    /// Local configuration problem (bad URL, bad key)
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The call itself crashed before producing a result
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in quorum diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    Transport,
    Service,
    Protocol,
    Configuration,
    Internal,
    /// Still in flight when quorum became unreachable
    Abandoned,
}

impl CalendarError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CalendarError::Network(_) => FailureKind::Transport,
            CalendarError::ServiceError(_) => FailureKind::Service,
            CalendarError::InvalidResponse(_) => FailureKind::Protocol,
            CalendarError::Timeout(_) => FailureKind::Timeout,
            CalendarError::NotConfigured(_) => FailureKind::Configuration,
            CalendarError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Map a reqwest failure, separating timeouts from other transport errors
    pub(crate) fn from_reqwest(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            CalendarError::Timeout(timeout_ms)
        } else {
            CalendarError::Network(e.to_string())
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Service => "service",
            FailureKind::Protocol => "protocol",
            FailureKind::Configuration => "configuration",
            FailureKind::Internal => "internal",
            FailureKind::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}
