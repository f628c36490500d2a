//! OpenTimestamps proof format
//!
//! The binary format is read and written by the `opentimestamps` crate. This
//! module keeps proofs in a canonical tree so fragments from several
//! calendars merge deterministically, and adds the commitment engine that
//! digests files and replays commitment paths. Orchestration code only goes
//! through `DetachedTimestampFile::{from_bytes, to_bytes}`, `Timestamp`
//! merging and the functions in [`commitment`].

pub mod attestation;
mod codec;
pub mod commitment;
mod detached;
pub mod info;
pub mod op;
mod timestamp;

pub use codec::{decode_timestamp, encode_timestamp, CodecError};
pub use detached::DetachedTimestampFile;
pub use opentimestamps::attestation::Attestation;
pub use opentimestamps::op::Op;
pub use timestamp::{PendingLeaf, Timestamp};
