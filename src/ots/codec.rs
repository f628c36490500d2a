//! Wire encoding through the `opentimestamps` crate
//!
//! The crate parses and writes the binary format. This module adds the
//! checks it leaves to the caller: trailing bytes and an error type that
//! fits the rest of the library.

use opentimestamps::ser::{Deserializer, Serializer};
use opentimestamps::timestamp::Timestamp as WireTimestamp;
use thiserror::Error;

use super::timestamp::Timestamp;

/// Decoding/encoding failures for proof bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Rejected by the OpenTimestamps parser or serializer
    #[error("{0}")]
    Format(String),

    /// Bytes left over after a complete value
    #[error("{0} trailing bytes after end of value")]
    TrailingBytes(usize),

    /// Operation produced a message above the allowed size
    #[error("operation result too long: {0} bytes")]
    ResultTooLong(usize),

    /// Merging timestamps with different messages
    #[error("cannot merge timestamps for different messages")]
    MessageMismatch,

    /// Node with neither attestations nor operations
    #[error("timestamp node has no attestations or operations")]
    EmptyTimestamp,

    /// File hash operation is not a digest the format supports
    #[error("unsupported file hash operation: {0}")]
    UnsupportedHashOp(String),

    /// Digest length does not match the file hash operation
    #[error("digest length {actual} does not match {op} ({expected} bytes)")]
    DigestLength {
        op: String,
        expected: usize,
        actual: usize,
    },
}

impl From<opentimestamps::error::Error> for CodecError {
    fn from(e: opentimestamps::error::Error) -> Self {
        CodecError::Format(e.to_string())
    }
}

/// Fail when `consumed` bytes do not cover all of `input`
pub(crate) fn expect_consumed(input: &[u8], consumed: usize) -> Result<(), CodecError> {
    match input.len().checked_sub(consumed) {
        Some(0) | None => Ok(()),
        Some(extra) => Err(CodecError::TrailingBytes(extra)),
    }
}

/// Decode a bare timestamp (no file header) rooted at `msg`
///
/// This is the body calendars send for submissions and upgrades.
pub fn decode_timestamp(msg: &[u8], bytes: &[u8]) -> Result<Timestamp, CodecError> {
    let mut deser = Deserializer::new(bytes);
    let wire = WireTimestamp::deserialize(&mut deser, msg.to_vec())?;

    // the parser stops at the end of the tree; re-encoding what it read
    // tells how far that was
    expect_consumed(bytes, encode_wire(&wire)?.len())?;
    Timestamp::from_wire(wire)
}

/// Encode a bare timestamp (no file header)
pub fn encode_timestamp(timestamp: &Timestamp) -> Result<Vec<u8>, CodecError> {
    encode_wire(&timestamp.to_wire()?)
}

fn encode_wire(wire: &WireTimestamp) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    wire.serialize(&mut Serializer::new(&mut out))?;
    Ok(out)
}
