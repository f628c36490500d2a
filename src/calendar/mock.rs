//! Mock calendar for testing
//!
//! Scripted per-URL behavior for submissions and upgrades, no network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::client::parse_fragment;
use super::endpoint::CalendarEndpoint;
use super::error::CalendarError;
use crate::ots::attestation::bitcoin;
use crate::ots::{Attestation, Op, Timestamp};
use crate::traits::{Calendar, UpgradeReply};

/// How a mock endpoint answers a submission
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Return a pending fragment immediately
    Respond,
    /// Return a pending fragment after a delay
    Delay(Duration),
    /// Fail with the given error
    Fail(CalendarError),
    /// Return bytes that do not decode
    Garbage,
    /// Panic inside the call
    Panic,
}

/// How a mock endpoint answers an upgrade
#[derive(Debug, Clone)]
pub enum UpgradeBehavior {
    StillPending,
    /// Settle every commitment in the Bitcoin block at this height
    Settle { height: u64 },
    Fail(CalendarError),
}

/// Mock calendar
///
/// Unknown URLs respond to submissions and stay pending on upgrade.
pub struct MockCalendar {
    submit: HashMap<String, SubmitBehavior>,
    upgrade: Mutex<HashMap<String, UpgradeBehavior>>,
    submit_call_count: AtomicUsize,
    upgrade_call_count: AtomicUsize,
}

impl Default for MockCalendar {
    fn default() -> Self {
        Self {
            submit: HashMap::new(),
            upgrade: Mutex::new(HashMap::new()),
            submit_call_count: AtomicUsize::new(0),
            upgrade_call_count: AtomicUsize::new(0),
        }
    }
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script submissions to `url`
    pub fn with_submit(mut self, url: &str, behavior: SubmitBehavior) -> Self {
        self.submit.insert(url.to_string(), behavior);
        self
    }

    /// Script upgrades from `url`; can change while the mock is shared
    pub fn set_upgrade(&self, url: &str, behavior: UpgradeBehavior) {
        if let Ok(mut map) = self.upgrade.lock() {
            map.insert(url.to_string(), behavior);
        }
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_call_count.load(Ordering::SeqCst)
    }

    pub fn upgrade_calls(&self) -> usize {
        self.upgrade_call_count.load(Ordering::SeqCst)
    }
}

/// Pending fragment a mock calendar returns for `digest`
///
/// Each calendar URL gets its own path so fragments from different
/// calendars form separate branches.
pub fn pending_fragment(url: &str, digest: &[u8]) -> Result<Timestamp, CalendarError> {
    let mut ts = Timestamp::new(digest.to_vec());
    let salt = Op::Sha256.execute(url.as_bytes());
    ts.add_op(Op::Append(salt[..8].to_vec()))
        .and_then(|node| node.add_op(Op::Sha256))
        .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?
        .attest(Attestation::Pending {
            uri: url.to_string(),
        });
    Ok(ts)
}

/// Settled timestamp a mock calendar returns for `commitment`
pub fn settled_fragment(commitment: &[u8], height: u64) -> Result<Timestamp, CalendarError> {
    let mut ts = Timestamp::new(commitment.to_vec());
    ts.add_op(Op::Sha256)
        .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?
        .attest(bitcoin(height));
    Ok(ts)
}

#[async_trait]
impl Calendar for MockCalendar {
    async fn submit(
        &self,
        endpoint: &CalendarEndpoint,
        digest: &[u8],
        _timeout: Duration,
    ) -> Result<Timestamp, CalendarError> {
        self.submit_call_count.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .submit
            .get(endpoint.url())
            .cloned()
            .unwrap_or(SubmitBehavior::Respond);

        match behavior {
            SubmitBehavior::Respond => pending_fragment(endpoint.url(), digest),
            SubmitBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                pending_fragment(endpoint.url(), digest)
            }
            SubmitBehavior::Fail(e) => Err(e),
            SubmitBehavior::Garbage => parse_fragment(digest, &[0x42, 0x42, 0x42]),
            SubmitBehavior::Panic => panic!("mock calendar {} panicked", endpoint.url()),
        }
    }

    async fn fetch_upgrade(
        &self,
        calendar_url: &str,
        commitment: &[u8],
        _timeout: Duration,
    ) -> Result<UpgradeReply, CalendarError> {
        self.upgrade_call_count.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .upgrade
            .lock()
            .ok()
            .and_then(|map| map.get(calendar_url).cloned())
            .unwrap_or(UpgradeBehavior::StillPending);

        match behavior {
            UpgradeBehavior::StillPending => Ok(UpgradeReply::StillPending),
            UpgradeBehavior::Settle { height } => {
                Ok(UpgradeReply::Upgraded(settled_fragment(commitment, height)?))
            }
            UpgradeBehavior::Fail(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_mock_default_responds() {
        let calendar = MockCalendar::new();
        let ep = CalendarEndpoint::public("https://a.example");

        let fragment = calendar.submit(&ep, &[0u8; 32], T).await.unwrap();
        assert_eq!(fragment.msg, vec![0u8; 32]);
        assert_eq!(calendar.submit_calls(), 1);

        let commitment = fragment.pending_leaves()[0].commitment.clone();
        let reply = calendar
            .fetch_upgrade("https://a.example", &commitment, T)
            .await
            .unwrap();
        assert_eq!(reply, UpgradeReply::StillPending);
        assert_eq!(calendar.upgrade_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let calendar = MockCalendar::new().with_submit(
            "https://a.example",
            SubmitBehavior::Fail(CalendarError::Network("mock submit failure".into())),
        );
        let result = calendar
            .submit(&CalendarEndpoint::public("https://a.example"), &[0u8; 32], T)
            .await;
        assert!(matches!(result, Err(CalendarError::Network(_))));
    }

    #[tokio::test]
    async fn test_mock_garbage_is_invalid_response() {
        let calendar = MockCalendar::new().with_submit("https://a.example", SubmitBehavior::Garbage);
        let result = calendar
            .submit(&CalendarEndpoint::public("https://a.example"), &[0u8; 32], T)
            .await;
        assert!(matches!(result, Err(CalendarError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_mock_settles() {
        let calendar = MockCalendar::new();
        calendar.set_upgrade("https://a.example", UpgradeBehavior::Settle { height: 800_000 });
        let reply = calendar
            .fetch_upgrade("https://a.example", &[1u8; 32], T)
            .await
            .unwrap();
        match reply {
            UpgradeReply::Upgraded(ts) => assert!(ts.is_settled()),
            UpgradeReply::StillPending => panic!("expected settlement"),
        }
    }

    #[test]
    fn test_fragments_differ_per_calendar() {
        let a = pending_fragment("https://a.example", &[0u8; 32]).unwrap();
        let b = pending_fragment("https://b.example", &[0u8; 32]).unwrap();
        assert_ne!(a, b);
        let mut merged = a.clone();
        merged.merge(b).unwrap();
        assert_eq!(merged.branch_count(), 2);
    }
}
