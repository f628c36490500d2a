//! Completing pending proofs
//!
//! Every pending attestation names the calendar that issued it. The upgrade
//! asks those calendars (whitelisted ones only) whether the commitment has
//! been anchored yet and grafts whatever comes back onto the tree.

mod persist;

pub use persist::upgrade_file;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::calendar::{CalendarError, CalendarWhitelist};
use crate::error::{OtsError, OtsResult};
use crate::ots::{Attestation, DetachedTimestampFile, PendingLeaf};
use crate::traits::{Calendar, UpgradeReply};

/// What happened to one pending attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafUpgrade {
    /// Calendar returned more of the path; `settled` when it reached a chain
    Upgraded { settled: bool },
    /// Calendar has not anchored the commitment yet
    StillPending,
    /// Calendar is not on the whitelist
    Skipped,
    /// Reply did not start at the commitment
    Mismatch,
    Failed(CalendarError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafReport {
    pub calendar_url: String,
    pub status: LeafUpgrade,
}

/// Per-attestation results of one upgrade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    pub leaves: Vec<LeafReport>,
}

impl UpgradeReport {
    pub fn settled(&self) -> usize {
        self.count(|s| matches!(s, LeafUpgrade::Upgraded { settled: true }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, LeafUpgrade::Failed(_) | LeafUpgrade::Mismatch))
    }

    fn count(&self, pred: impl Fn(&LeafUpgrade) -> bool) -> usize {
        self.leaves.iter().filter(|l| pred(&l.status)).count()
    }
}

#[derive(Debug)]
pub struct UpgradeOutcome {
    pub proof: DetachedTimestampFile,
    /// Serialized proof differs from the input
    pub changed: bool,
    pub report: UpgradeReport,
}

type FetchResult = (usize, Result<UpgradeReply, CalendarError>);

/// Queries calendars for the missing parts of pending proofs
#[derive(Clone)]
pub struct UpgradeManager {
    calendar: Arc<dyn Calendar>,
    whitelist: CalendarWhitelist,
    timeout: Duration,
}

impl UpgradeManager {
    pub fn new(calendar: Arc<dyn Calendar>, whitelist: CalendarWhitelist, timeout: Duration) -> Self {
        Self {
            calendar,
            whitelist,
            timeout,
        }
    }

    /// Upgrade a proof in memory
    ///
    /// Calendars that fail or have nothing new leave their branch as it was,
    /// so an upgrade never loses information. `changed` is a byte comparison
    /// of the encoded proofs.
    pub async fn upgrade(&self, proof: &DetachedTimestampFile) -> OtsResult<UpgradeOutcome> {
        let original = proof.to_bytes()?;
        let leaves = proof.timestamp.pending_leaves();

        let mut statuses: Vec<Option<LeafUpgrade>> = vec![None; leaves.len()];
        let mut replies: Vec<Option<UpgradeReply>> = vec![None; leaves.len()];
        let mut set: JoinSet<FetchResult> = JoinSet::new();

        for (index, leaf) in leaves.iter().enumerate() {
            if !self.whitelist.permits(&leaf.uri) {
                tracing::warn!(calendar_url = %leaf.uri, "Ignoring attestation from calendar not on whitelist");
                statuses[index] = Some(LeafUpgrade::Skipped);
                continue;
            }

            let calendar = Arc::clone(&self.calendar);
            let uri = leaf.uri.clone();
            let commitment = leaf.commitment.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let call = calendar.fetch_upgrade(&uri, &commitment, timeout);
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(CalendarError::Timeout(timeout.as_millis() as u64)),
                };
                (index, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(reply))) => replies[index] = Some(reply),
                Ok((index, Err(e))) => {
                    tracing::warn!(calendar_url = %leaves[index].uri, error = %e, "Upgrade request failed");
                    statuses[index] = Some(LeafUpgrade::Failed(e));
                }
                Err(e) => return Err(OtsError::Internal(format!("upgrade task failed: {}", e))),
            }
        }

        let mut upgraded = proof.clone();
        for (index, leaf) in leaves.iter().enumerate() {
            let Some(reply) = replies[index].take() else {
                continue;
            };
            let status = match reply {
                UpgradeReply::StillPending => {
                    tracing::debug!(calendar_url = %leaf.uri, "Commitment not yet anchored");
                    LeafUpgrade::StillPending
                }
                UpgradeReply::Upgraded(fragment) => graft(&mut upgraded, leaf, fragment)?,
            };
            statuses[index] = Some(status);
        }

        let report = UpgradeReport {
            leaves: leaves
                .into_iter()
                .zip(statuses)
                .map(|(leaf, status)| LeafReport {
                    calendar_url: leaf.uri,
                    status: status.unwrap_or(LeafUpgrade::StillPending),
                })
                .collect(),
        };

        let changed = upgraded.to_bytes()? != original;
        Ok(UpgradeOutcome {
            proof: upgraded,
            changed,
            report,
        })
    }
}

/// Merge a calendar reply at the node it answers
fn graft(
    proof: &mut DetachedTimestampFile,
    leaf: &PendingLeaf,
    fragment: crate::ots::Timestamp,
) -> OtsResult<LeafUpgrade> {
    if fragment.msg != leaf.commitment {
        tracing::warn!(calendar_url = %leaf.uri, "Calendar reply does not match commitment");
        return Ok(LeafUpgrade::Mismatch);
    }

    let node = proof
        .timestamp
        .node_at_mut(&leaf.path)
        .ok_or_else(|| OtsError::Internal("pending attestation path vanished".into()))?;
    node.merge(fragment)?;

    let settled = node.is_settled();
    if settled {
        node.remove_attestation(&Attestation::Pending {
            uri: leaf.uri.clone(),
        });
        tracing::info!(calendar_url = %leaf.uri, "Attestation settled");
    }
    Ok(LeafUpgrade::Upgraded { settled })
}
