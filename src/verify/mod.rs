//! Proof verification
//!
//! A proof is valid for a file when the file hashes to the proof's root
//! digest and some branch replays to a Bitcoin block's merkle root. When
//! several blocks attest, the earliest one is reported.

mod bitcoin;
pub mod mock;

pub use bitcoin::{default_providers, ApiProvider, ApiStyle, EsploraHeaderSource};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{OtsError, OtsResult};
use crate::ots::attestation::{bitcoin_height, describe};
use crate::ots::commitment::{digest_file, replay, LeafStatus};
use crate::ots::{Attestation, DetachedTimestampFile, Timestamp};
use crate::traits::BlockHeaderSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Bitcoin,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Bitcoin => f.write_str("Bitcoin"),
        }
    }
}

/// A branch checked against the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAttestation {
    pub chain: Chain,
    pub height: u64,
    /// Block time (Unix seconds)
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Earliest verified attestation
    Settled(VerifiedAttestation),
    /// Nothing settled yet; calendars still holding the commitment
    Pending { calendars: Vec<String> },
}

/// Checks proofs against file contents and block headers
#[derive(Clone)]
pub struct VerifyManager {
    headers: Arc<dyn BlockHeaderSource>,
}

impl VerifyManager {
    pub fn new(headers: Arc<dyn BlockHeaderSource>) -> Self {
        Self { headers }
    }

    /// Verify `proof` for `file`
    ///
    /// # Errors
    /// * `OtsError::DigestMismatch` - File does not match the proof
    /// * `OtsError::BlockHeader` - A settled branch could not be checked and none verified
    /// * `OtsError::InvalidProof` - No branch is valid or pending
    pub async fn verify(&self, proof: &DetachedTimestampFile, file: &[u8]) -> OtsResult<Verification> {
        let actual = digest_file(&proof.hash_op, file)?;
        if actual != proof.digest() {
            return Err(OtsError::DigestMismatch {
                expected: hex::encode(proof.digest()),
                actual: hex::encode(actual),
            });
        }
        self.verify_timestamp(&proof.timestamp).await
    }

    /// Verify a timestamp without a file digest check
    pub async fn verify_timestamp(&self, timestamp: &Timestamp) -> OtsResult<Verification> {
        let mut best: Option<VerifiedAttestation> = None;
        let mut pending = BTreeSet::new();
        let mut header_errors = Vec::new();
        let mut invalid = Vec::new();

        for leaf in replay(timestamp) {
            match (&leaf.status, &leaf.attestation) {
                (LeafStatus::Settled, attestation) => {
                    let Some(height) = bitcoin_height(attestation) else {
                        invalid.push(format!("{}: not a block attestation", describe(attestation)));
                        continue;
                    };
                    let header = match self.headers.block_header(height).await {
                        Ok(header) => header,
                        Err(e) => {
                            tracing::warn!(height, error = %e, "Block header unavailable");
                            header_errors.push(e.to_string());
                            continue;
                        }
                    };
                    if leaf.msg != header.merkle_root {
                        tracing::warn!(height, "Attestation does not match block merkle root");
                        invalid.push(format!("block {} merkle root mismatch", height));
                        continue;
                    }

                    let candidate = VerifiedAttestation {
                        chain: Chain::Bitcoin,
                        height,
                        time: header.time,
                    };
                    if best.map_or(true, |b| (candidate.time, candidate.height) < (b.time, b.height)) {
                        best = Some(candidate);
                    }
                }
                (LeafStatus::Pending, Attestation::Pending { uri }) => {
                    pending.insert(uri.clone());
                }
                (LeafStatus::Unsupported, attestation) => {
                    tracing::debug!(attestation = %describe(attestation), "Skipping unsupported attestation");
                }
                (LeafStatus::Invalid(reason), _) => invalid.push(reason.clone()),
                (status, attestation) => {
                    invalid.push(format!("{}: unexpected status {status:?}", describe(attestation)));
                }
            }
        }

        if let Some(verified) = best {
            tracing::info!(height = verified.height, time = verified.time, "Proof verified");
            return Ok(Verification::Settled(verified));
        }
        // a block attestation that could not be checked outranks pending ones
        if !header_errors.is_empty() {
            return Err(OtsError::BlockHeader(header_errors.join("; ")));
        }
        if !pending.is_empty() {
            return Ok(Verification::Pending {
                calendars: pending.into_iter().collect(),
            });
        }
        if invalid.is_empty() {
            return Err(OtsError::InvalidProof("no verifiable attestation".into()));
        }
        Err(OtsError::InvalidProof(invalid.join("; ")))
    }
}
