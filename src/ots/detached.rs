//! Detached timestamp file (`.ots`) encoding

use opentimestamps::op::Op;
use opentimestamps::ser::DigestType;
use opentimestamps::DetachedTimestampFile as WireFile;

use super::codec::{expect_consumed, CodecError};
use super::op::{describe, digest_len};
use super::timestamp::Timestamp;

/// A proof detached from the file it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    /// Hash operation used to digest the original file
    pub hash_op: Op,
    /// Commitment tree rooted at the file digest
    pub timestamp: Timestamp,
}

fn digest_type(op: &Op) -> Result<DigestType, CodecError> {
    match op {
        Op::Sha1 => Ok(DigestType::Sha1),
        Op::Sha256 => Ok(DigestType::Sha256),
        Op::Ripemd160 => Ok(DigestType::Ripemd160),
        other => Err(CodecError::UnsupportedHashOp(describe(other))),
    }
}

fn hash_op(digest_type: DigestType) -> Op {
    match digest_type {
        DigestType::Sha1 => Op::Sha1,
        DigestType::Sha256 => Op::Sha256,
        DigestType::Ripemd160 => Op::Ripemd160,
    }
}

impl DetachedTimestampFile {
    /// Wrap a timestamp, checking the root digest fits `hash_op`
    pub fn new(hash_op: Op, timestamp: Timestamp) -> Result<Self, CodecError> {
        let expected =
            digest_len(&hash_op).ok_or_else(|| CodecError::UnsupportedHashOp(describe(&hash_op)))?;
        if timestamp.msg.len() != expected {
            return Err(CodecError::DigestLength {
                op: describe(&hash_op),
                expected,
                actual: timestamp.msg.len(),
            });
        }
        Ok(Self { hash_op, timestamp })
    }

    /// Root digest the proof commits to
    pub fn digest(&self) -> &[u8] {
        &self.timestamp.msg
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let wire = WireFile::from_reader(bytes)?;
        expect_consumed(bytes, encode_wire(&wire)?.len())?;

        let op = hash_op(wire.digest_type);
        let timestamp = Timestamp::from_wire(wire.timestamp)?;
        Self::new(op, timestamp)
    }

    /// Canonical encoding; equal proofs always give equal bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode_wire(&WireFile {
            digest_type: digest_type(&self.hash_op)?,
            timestamp: self.timestamp.to_wire()?,
        })
    }
}

fn encode_wire(file: &WireFile) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    file.to_writer(&mut out)?;
    Ok(out)
}
