//! Commitment engine: file digests and path replay

use opentimestamps::attestation::Attestation;
use opentimestamps::op::Op;

use super::attestation::describe as describe_attestation;
use super::codec::CodecError;
use super::op::{apply, describe, is_hash};
use super::timestamp::Timestamp;

/// Outcome of replaying one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafStatus {
    /// Path is consistent and ends in a Bitcoin attestation
    Settled,
    /// Path is consistent and ends in a calendar promise
    Pending,
    /// Attestation type that cannot be checked here
    Unsupported,
    /// Path or attestation is malformed
    Invalid(String),
}

/// One replayed branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedLeaf {
    /// Message at the attested node
    pub msg: Vec<u8>,
    pub attestation: Attestation,
    pub status: LeafStatus,
}

/// Digest file contents with a hash operation
pub fn digest_file(hash_op: &Op, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if !is_hash(hash_op) {
        return Err(CodecError::UnsupportedHashOp(describe(hash_op)));
    }
    Ok(hash_op.execute(data))
}

/// Re-execute every operation in the tree and classify each branch
///
/// A node whose recorded message differs from what its operation produces
/// invalidates every branch below it.
pub fn replay(timestamp: &Timestamp) -> Vec<ReplayedLeaf> {
    let mut out = Vec::new();
    replay_node(timestamp, None, &mut out);
    out
}

fn replay_node(node: &Timestamp, broken: Option<&str>, out: &mut Vec<ReplayedLeaf>) {
    for attestation in node.attestations() {
        let status = match broken {
            Some(reason) => LeafStatus::Invalid(reason.to_string()),
            None => classify(&node.msg, attestation),
        };
        out.push(ReplayedLeaf {
            msg: node.msg.clone(),
            attestation: attestation.clone(),
            status,
        });
    }

    for (op, child) in node.ops() {
        let reason = match (broken, apply(op, &node.msg)) {
            (Some(reason), _) => Some(reason.to_string()),
            (None, Ok(result)) if result == child.msg => None,
            (None, Ok(_)) => Some(format!(
                "'{}' does not produce the recorded message",
                describe(op)
            )),
            (None, Err(e)) => Some(format!("'{}' failed: {e}", describe(op))),
        };
        replay_node(child, reason.as_deref(), out);
    }
}

fn classify(msg: &[u8], attestation: &Attestation) -> LeafStatus {
    match attestation {
        Attestation::Pending { .. } => LeafStatus::Pending,
        Attestation::Bitcoin { .. } if msg.len() == 32 => LeafStatus::Settled,
        Attestation::Bitcoin { .. } => LeafStatus::Invalid(format!(
            "{} on {}-byte message, expected 32",
            describe_attestation(attestation),
            msg.len()
        )),
        Attestation::Unknown { .. } => LeafStatus::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ots::attestation::bitcoin;

    #[test]
    fn test_digest_file_sha256() {
        let digest = digest_file(&Op::Sha256, b"hello").unwrap();
        assert_eq!(
            hex::encode(digest),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_file_rejects_non_hash() {
        assert!(digest_file(&Op::Append(vec![1]), b"x").is_err());
    }

    #[test]
    fn test_replay_consistent_tree() {
        let mut ts = Timestamp::new(vec![1u8; 32]);
        let node = ts.add_op(Op::Append(vec![2])).unwrap().add_op(Op::Sha256).unwrap();
        node.attest(bitcoin(10));
        node.attest(Attestation::Pending {
            uri: "https://x.example".into(),
        });

        let leaves = replay(&ts);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].status, LeafStatus::Settled);
        assert_eq!(leaves[1].status, LeafStatus::Pending);
    }

    #[test]
    fn test_replay_detects_tampered_message() {
        let mut ts = Timestamp::new(vec![1u8; 32]);
        let mut bogus = Timestamp::new(vec![9u8; 32]);
        bogus.attest(bitcoin(10));
        ts.set_child(Op::Sha256, bogus);

        let leaves = replay(&ts);
        assert_eq!(leaves.len(), 1);
        assert!(matches!(leaves[0].status, LeafStatus::Invalid(_)));
    }

    #[test]
    fn test_replay_invalidates_descendants() {
        let mut ts = Timestamp::new(vec![1u8; 32]);
        let mut bogus = Timestamp::new(vec![9u8; 32]);
        bogus.add_op(Op::Sha256).unwrap().attest(Attestation::Pending {
            uri: "https://x.example".into(),
        });
        ts.set_child(Op::Sha256, bogus);

        let leaves = replay(&ts);
        assert!(matches!(leaves[0].status, LeafStatus::Invalid(_)));
    }

    #[test]
    fn test_replay_short_bitcoin_message_invalid() {
        let mut ts = Timestamp::new(vec![1u8; 20]);
        ts.attest(bitcoin(1));
        assert!(matches!(replay(&ts)[0].status, LeafStatus::Invalid(_)));
    }

    #[test]
    fn test_replay_other_chains_unsupported() {
        let mut ts = Timestamp::new(vec![1u8; 32]);
        // litecoin block header attestation tag
        ts.attest(Attestation::Unknown {
            tag: vec![0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45],
            data: vec![0x01],
        });
        assert_eq!(replay(&ts)[0].status, LeafStatus::Unsupported);
    }
}
