//! Quorum stamping
//!
//! - `quorum`: one digest against N calendars, accepted once M answered
//! - `multistamp`: independent quorum stamps for a batch of files

mod multistamp;
mod quorum;

pub use multistamp::{multistamp, StampOutcome};
pub use quorum::{merge_fragments, resolve_quorum, QuorumStamper, StampParams, StampRequest, NONCE_LENGTH};
