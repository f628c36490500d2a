//! Calendar round-trip interface

use async_trait::async_trait;
use std::time::Duration;

use crate::calendar::{CalendarEndpoint, CalendarError};
use crate::ots::Timestamp;

/// Answer to an upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeReply {
    /// Calendar returned a (possibly settled) timestamp for the commitment
    Upgraded(Timestamp),
    /// Calendar has nothing newer yet
    StillPending,
}

/// One network round-trip against one calendar
///
/// Implementations must tolerate concurrent calls to distinct endpoints.
/// Callers bound every call with their own timeout as well, so an
/// implementation that ignores `timeout` still cannot stall a caller.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Submit a digest for timestamping
    ///
    /// # Arguments
    /// * `endpoint` - Calendar to contact; private endpoints sign the request
    /// * `digest` - Message to commit to
    /// * `timeout` - Upper bound for the round-trip
    ///
    /// # Returns
    /// * `Timestamp` fragment rooted at `digest`
    ///
    /// # Errors
    /// * `CalendarError::Timeout` - No answer within `timeout`
    /// * `CalendarError::Network` / `ServiceError` - Transport or HTTP failure
    /// * `CalendarError::InvalidResponse` - Body is not a valid timestamp
    async fn submit(
        &self,
        endpoint: &CalendarEndpoint,
        digest: &[u8],
        timeout: Duration,
    ) -> Result<Timestamp, CalendarError>;

    /// Ask a calendar for the completed timestamp of a pending commitment
    ///
    /// # Arguments
    /// * `calendar_url` - URL recorded in the pending attestation
    /// * `commitment` - Message the pending attestation is attached to
    /// * `timeout` - Upper bound for the round-trip
    ///
    /// # Returns
    /// * `UpgradeReply::Upgraded` with a timestamp rooted at `commitment`
    /// * `UpgradeReply::StillPending` if the calendar has nothing yet
    async fn fetch_upgrade(
        &self,
        calendar_url: &str,
        commitment: &[u8],
        timeout: Duration,
    ) -> Result<UpgradeReply, CalendarError>;
}
