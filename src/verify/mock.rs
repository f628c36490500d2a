//! Mock block header source for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::OtsError;
use crate::ots::attestation::bitcoin_height;
use crate::ots::Timestamp;
use crate::traits::{BlockHeader, BlockHeaderSource};

/// Serves a fixed set of headers; unknown heights fail
#[derive(Default)]
pub struct MockHeaderSource {
    headers: HashMap<u64, BlockHeader>,
    call_count: AtomicUsize,
}

impl MockHeaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, height: u64, merkle_root: [u8; 32], time: u64) -> Self {
        self.headers.insert(
            height,
            BlockHeader {
                height,
                merkle_root,
                time,
            },
        );
        self
    }

    /// Headers that make every Bitcoin attestation in `timestamp` valid,
    /// with block time given by `time_of(height)`
    pub fn matching(timestamp: &Timestamp, time_of: impl Fn(u64) -> u64) -> Self {
        timestamp
            .all_attestations()
            .into_iter()
            .filter_map(|(msg, attestation)| {
                let height = bitcoin_height(attestation)?;
                let root: [u8; 32] = msg.try_into().ok()?;
                Some((height, root))
            })
            .fold(Self::new(), |source, (height, root)| {
                source.with_header(height, root, time_of(height))
            })
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockHeaderSource for MockHeaderSource {
    async fn block_header(&self, height: u64) -> Result<BlockHeader, OtsError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.headers
            .get(&height)
            .copied()
            .ok_or_else(|| OtsError::BlockHeader(format!("block {height}: not in mock")))
    }
}
