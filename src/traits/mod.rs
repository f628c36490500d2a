//! Trait definitions for calendar and blockchain access

pub mod block_header;
pub mod calendar;

pub use block_header::{BlockHeader, BlockHeaderSource};
pub use calendar::{Calendar, UpgradeReply};
