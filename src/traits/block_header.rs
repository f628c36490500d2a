//! Bitcoin block header lookup interface

use async_trait::async_trait;

use crate::error::OtsError;

/// Header fields needed to check a Bitcoin attestation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    /// Merkle root in internal byte order (as committed in the proof)
    pub merkle_root: [u8; 32],
    /// Block time (Unix seconds)
    pub time: u64,
}

/// Source of block headers by height
#[async_trait]
pub trait BlockHeaderSource: Send + Sync {
    /// Fetch the header of the block at `height`
    ///
    /// # Errors
    /// * `OtsError::BlockHeader` - Header could not be obtained from any provider
    async fn block_header(&self, height: u64) -> Result<BlockHeader, OtsError>;
}
