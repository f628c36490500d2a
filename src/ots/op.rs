//! Commitment operations
//!
//! `Op` itself comes from the `opentimestamps` crate; this adds the ordering
//! the canonical tree needs, digest sizes and bounded application.

use opentimestamps::op::Op;
use std::cmp::Ordering;

use super::codec::CodecError;

/// Maximum length of a message produced by a non-hash operation
pub const MAX_RESULT_LENGTH: usize = 4096;

/// Opcode and argument, the order operations take in a canonical tree
fn sort_key(op: &Op) -> (u8, &[u8]) {
    match op {
        Op::Sha1 => (0x02, &[]),
        Op::Ripemd160 => (0x03, &[]),
        Op::Sha256 => (0x08, &[]),
        Op::Append(arg) => (0xf0, arg.as_slice()),
        Op::Prepend(arg) => (0xf1, arg.as_slice()),
        Op::Reverse => (0xf2, &[]),
        Op::Hexlify => (0xf3, &[]),
    }
}

pub(crate) fn cmp_ops(a: &Op, b: &Op) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

/// Digest length for hash operations, `None` otherwise
pub fn digest_len(op: &Op) -> Option<usize> {
    match op {
        Op::Sha1 | Op::Ripemd160 => Some(20),
        Op::Sha256 => Some(32),
        _ => None,
    }
}

pub fn is_hash(op: &Op) -> bool {
    digest_len(op).is_some()
}

/// Apply `op` to a message inside a tree
///
/// Hashes take any input; every other result is capped at
/// [`MAX_RESULT_LENGTH`].
pub fn apply(op: &Op, msg: &[u8]) -> Result<Vec<u8>, CodecError> {
    let out = op.execute(msg);
    if !is_hash(op) && out.len() > MAX_RESULT_LENGTH {
        return Err(CodecError::ResultTooLong(out.len()));
    }
    Ok(out)
}

/// `sha256`, `append 01ff`, ...
pub fn describe(op: &Op) -> String {
    match op {
        Op::Sha1 => "sha1".to_string(),
        Op::Ripemd160 => "ripemd160".to_string(),
        Op::Sha256 => "sha256".to_string(),
        Op::Append(arg) => format!("append {}", hex::encode(arg)),
        Op::Prepend(arg) => format!("prepend {}", hex::encode(arg)),
        Op::Reverse => "reverse".to_string(),
        Op::Hexlify => "hexlify".to_string(),
    }
}
