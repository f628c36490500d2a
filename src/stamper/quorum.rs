//! M-of-N stamping against calendar servers
//!
//! A digest is submitted to every configured calendar at once. The stamp
//! succeeds as soon as `quorum` calendars returned a well-formed fragment;
//! it fails as soon as that became impossible.

use futures::FutureExt;
use rand::RngCore;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::calendar::{CalendarEndpoint, CalendarError, FailureKind};
use crate::config::OtsConfig;
use crate::error::{EndpointFailure, OtsError, OtsResult, QuorumFailure};
use crate::ots::commitment::digest_file;
use crate::ots::{DetachedTimestampFile, Op, Timestamp};
use crate::traits::Calendar;

/// Random bytes appended to the digest before submission
pub const NONCE_LENGTH: usize = 16;

/// Pick M for a stamp over `n` calendars
///
/// An explicit quorum must lie in `1..=n`. Otherwise the configured default
/// is used, capped at `n`; without a default every calendar is required.
pub fn resolve_quorum(explicit: Option<usize>, default: Option<usize>, n: usize) -> OtsResult<usize> {
    if n == 0 {
        return Err(OtsError::Config("no calendars configured".into()));
    }
    match explicit {
        Some(m) if m == 0 || m > n => Err(OtsError::Config(format!(
            "quorum {} out of range for {} calendars",
            m, n
        ))),
        Some(m) => Ok(m),
        None => Ok(default.map_or(n, |d| d.clamp(1, n))),
    }
}

/// Settings shared by every stamp of one invocation
#[derive(Debug, Clone)]
pub struct StampParams {
    pub endpoints: Vec<CalendarEndpoint>,
    pub quorum: usize,
    pub timeout: Duration,
    pub straggler_grace: Duration,
}

impl StampParams {
    /// Build params for `endpoints`, resolving the quorum against `config`
    pub fn from_config(
        config: &OtsConfig,
        endpoints: Vec<CalendarEndpoint>,
        quorum: Option<usize>,
    ) -> OtsResult<Self> {
        let quorum = resolve_quorum(quorum, config.default_quorum, endpoints.len())?;
        Ok(Self {
            endpoints,
            quorum,
            timeout: config.timeout(),
            straggler_grace: config.straggler_grace(),
        })
    }

    /// Request for one digest with a fresh nonce
    pub fn request(&self, digest: Vec<u8>) -> StampRequest {
        StampRequest {
            digest,
            endpoints: self.endpoints.clone(),
            quorum: self.quorum,
            timeout: self.timeout,
            straggler_grace: self.straggler_grace,
            nonce: random_nonce(),
        }
    }
}

/// One digest to stamp
#[derive(Debug, Clone)]
pub struct StampRequest {
    pub digest: Vec<u8>,
    pub endpoints: Vec<CalendarEndpoint>,
    /// Calendars that must answer (M)
    pub quorum: usize,
    /// Bound on each calendar call
    pub timeout: Duration,
    /// How long to keep collecting fragments once quorum is met
    pub straggler_grace: Duration,
    /// Blinds the digest so calendars never see it
    pub nonce: Vec<u8>,
}

impl StampRequest {
    pub fn new(digest: Vec<u8>, endpoints: Vec<CalendarEndpoint>, quorum: usize, timeout: Duration) -> Self {
        Self {
            digest,
            endpoints,
            quorum,
            timeout,
            straggler_grace: Duration::ZERO,
            nonce: random_nonce(),
        }
    }

    #[must_use]
    pub fn with_straggler_grace(mut self, grace: Duration) -> Self {
        self.straggler_grace = grace;
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = nonce;
        self
    }

    /// Check everything that can be checked without the network
    pub fn validate(&self) -> OtsResult<()> {
        if self.endpoints.is_empty() {
            return Err(OtsError::Config("no calendars configured".into()));
        }
        if self.digest.is_empty() {
            return Err(OtsError::Config("empty digest".into()));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if !seen.insert(endpoint.url()) {
                return Err(OtsError::Config(format!(
                    "calendar listed twice: {}",
                    endpoint.url()
                )));
            }
        }

        let n = self.endpoints.len();
        if self.quorum == 0 || self.quorum > n {
            return Err(OtsError::Config(format!(
                "quorum {} out of range for {} calendars",
                self.quorum, n
            )));
        }
        if self.timeout.is_zero() {
            return Err(OtsError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

fn random_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Union calendar fragments rooted at `msg`
///
/// The tree keeps its branches sorted, so the result is the same whatever
/// order the fragments arrive in.
pub fn merge_fragments<I>(msg: &[u8], fragments: I) -> OtsResult<Timestamp>
where
    I: IntoIterator<Item = Timestamp>,
{
    let mut merged = Timestamp::new(msg.to_vec());
    for fragment in fragments {
        merged.merge(fragment)?;
    }
    Ok(merged)
}

type CallResult = (usize, Result<Timestamp, CalendarError>);

/// Submits digests to N calendars and accepts M answers
#[derive(Clone)]
pub struct QuorumStamper {
    calendar: Arc<dyn Calendar>,
}

impl QuorumStamper {
    pub fn new(calendar: Arc<dyn Calendar>) -> Self {
        Self { calendar }
    }

    /// Stamp `data`, returning a detached proof over its SHA-256 digest
    pub async fn stamp_file(&self, data: &[u8], params: &StampParams) -> OtsResult<DetachedTimestampFile> {
        let digest = digest_file(&Op::Sha256, data)?;
        let timestamp = self.stamp(params.request(digest)).await?;
        Ok(DetachedTimestampFile::new(Op::Sha256, timestamp)?)
    }

    /// Stamp a digest; the returned tree is rooted at `request.digest`
    pub async fn stamp(&self, request: StampRequest) -> OtsResult<Timestamp> {
        request.validate()?;

        let mut root = Timestamp::new(request.digest.clone());
        let blinded = root
            .add_op(Op::Append(request.nonce.clone()))?
            .add_op(Op::Sha256)?;
        let submitted = blinded.msg.clone();

        let request = Arc::new(request);
        let required = request.quorum;
        let mut set: JoinSet<CallResult> = JoinSet::new();

        for index in 0..request.endpoints.len() {
            let calendar = Arc::clone(&self.calendar);
            let request = Arc::clone(&request);
            let submitted = submitted.clone();
            set.spawn(async move {
                let endpoint = &request.endpoints[index];
                let call = AssertUnwindSafe(calendar.submit(endpoint, &submitted, request.timeout))
                    .catch_unwind();
                let result = match tokio::time::timeout(request.timeout, call).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(CalendarError::Internal(panic_message(&*panic))),
                    Err(_) => Err(CalendarError::Timeout(request.timeout.as_millis() as u64)),
                };
                (index, result)
            });
        }

        let mut tally = Tally::new(request.endpoints.len());

        while let Some(joined) = set.join_next().await {
            tally.record(&request, joined);

            if tally.succeeded() >= required {
                break;
            }
            if tally.succeeded() + set.len() < required {
                set.abort_all();
                return Err(OtsError::QuorumNotReached(tally.into_failure(&request)));
            }
        }

        if tally.succeeded() < required {
            return Err(OtsError::QuorumNotReached(tally.into_failure(&request)));
        }

        // Collect whatever else finishes within the grace period; the poll
        // happens even when the deadline has already passed.
        let deadline = Instant::now() + request.straggler_grace;
        while !set.is_empty() {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(joined)) => tally.record(&request, joined),
                Ok(None) | Err(_) => break,
            }
        }

        if !set.is_empty() {
            tracing::debug!(
                outstanding = set.len(),
                "Quorum reached, leaving slower calendars to finish in the background"
            );
            set.detach_all();
        }

        tracing::info!(
            succeeded = tally.succeeded(),
            required,
            total = request.endpoints.len(),
            "Digest accepted by calendar quorum"
        );

        let merged = merge_fragments(&submitted, tally.into_fragments())?;
        root.node_at_mut(&[Op::Append(request.nonce.clone()), Op::Sha256])
            .ok_or_else(|| OtsError::Internal("blinding path missing".into()))?
            .merge(merged)?;
        Ok(root)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("calendar call panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("calendar call panicked: {s}")
    } else {
        "calendar call panicked".to_string()
    }
}

/// Per-endpoint results as they arrive
struct Tally {
    fragments: Vec<Option<Timestamp>>,
    failures: Vec<Option<EndpointFailure>>,
    succeeded: usize,
}

impl Tally {
    fn new(n: usize) -> Self {
        Self {
            fragments: vec![None; n],
            failures: vec![None; n],
            succeeded: 0,
        }
    }

    fn succeeded(&self) -> usize {
        self.succeeded
    }

    fn record(&mut self, request: &StampRequest, joined: Result<CallResult, JoinError>) {
        let (index, result) = match joined {
            Ok(call) => call,
            Err(e) => {
                // panics are caught inside the task, so this is a cancellation
                tracing::error!(error = %e, "Calendar task did not complete");
                return;
            }
        };
        let url = request.endpoints[index].url();

        match result {
            Ok(fragment) => {
                tracing::debug!(calendar_url = %url, "Calendar returned fragment");
                self.fragments[index] = Some(fragment);
                self.succeeded += 1;
            }
            Err(e) => {
                tracing::warn!(calendar_url = %url, error = %e, "Calendar submission failed");
                self.failures[index] = Some(EndpointFailure {
                    url: url.to_string(),
                    kind: e.kind(),
                    detail: e.to_string(),
                });
            }
        }
    }

    fn into_fragments(self) -> impl Iterator<Item = Timestamp> {
        self.fragments.into_iter().flatten()
    }

    /// Diagnostics in endpoint order; endpoints that never reported are abandoned
    fn into_failure(self, request: &StampRequest) -> QuorumFailure {
        let failures = self
            .failures
            .into_iter()
            .zip(&self.fragments)
            .zip(&request.endpoints)
            .filter_map(|((failure, fragment), endpoint)| match (failure, fragment) {
                (Some(failure), _) => Some(failure),
                (None, Some(_)) => None,
                (None, None) => Some(EndpointFailure {
                    url: endpoint.url().to_string(),
                    kind: FailureKind::Abandoned,
                    detail: "no answer before quorum became unreachable".into(),
                }),
            })
            .collect();

        QuorumFailure {
            required: request.quorum,
            succeeded: self.succeeded,
            failures,
        }
    }
}
