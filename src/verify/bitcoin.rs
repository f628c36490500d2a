//! Bitcoin block header lookup via public blockchain APIs
//!
//! Providers are tried in order until one answers. Results are cached per
//! height for the lifetime of the source.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::OtsError;
use crate::traits::{BlockHeader, BlockHeaderSource};

/// Shape of a provider's API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    /// Esplora (blockstream, mempool): GET /block-height/{h} -> hash,
    /// GET /block/{hash} -> { "merkle_root", "timestamp" }
    Esplora,
    /// blockchain.info: GET /block-height/{h}?format=json ->
    /// { "blocks": [{ "mrkl_root", "time", "main_chain" }] }
    BlockchainInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiProvider {
    pub name: String,
    /// Base URL without trailing slash
    pub base_url: String,
    pub style: ApiStyle,
}

impl ApiProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, style: ApiStyle) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            style,
        }
    }
}

/// blockstream.info, then mempool.space, then blockchain.info
pub fn default_providers() -> Vec<ApiProvider> {
    vec![
        ApiProvider::new("blockstream.info", "https://blockstream.info/api", ApiStyle::Esplora),
        ApiProvider::new("mempool.space", "https://mempool.space/api", ApiStyle::Esplora),
        ApiProvider::new("blockchain.info", "https://blockchain.info", ApiStyle::BlockchainInfo),
    ]
}

/// Block headers from public explorers
pub struct EsploraHeaderSource {
    client: reqwest::Client,
    providers: Vec<ApiProvider>,
    cache: RwLock<HashMap<u64, BlockHeader>>,
}

impl EsploraHeaderSource {
    pub fn new(timeout: Duration) -> Result<Self, OtsError> {
        Self::with_providers(default_providers(), timeout)
    }

    pub fn with_providers(providers: Vec<ApiProvider>, timeout: Duration) -> Result<Self, OtsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OtsError::BlockHeader(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            providers,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn cached(&self, height: u64) -> Option<BlockHeader> {
        self.cache.read().ok()?.get(&height).copied()
    }

    fn store(&self, header: BlockHeader) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(header.height, header);
        }
    }

    async fn fetch_from_provider(&self, provider: &ApiProvider, height: u64) -> Result<BlockHeader, String> {
        let (merkle_hex, time) = match provider.style {
            ApiStyle::Esplora => self.fetch_esplora(&provider.base_url, height).await?,
            ApiStyle::BlockchainInfo => self.fetch_blockchain_info(&provider.base_url, height).await?,
        };

        Ok(BlockHeader {
            height,
            merkle_root: internal_byte_order(&merkle_hex)?,
            time,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, String> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?
            .error_for_status()
            .map_err(|e| format!("HTTP status error: {e}"))?
            .text()
            .await
            .map_err(|e| format!("Read error: {e}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| format!("JSON error: {e}"))
    }

    async fn fetch_esplora(&self, base_url: &str, height: u64) -> Result<(String, u64), String> {
        let hash = self.get_text(&format!("{base_url}/block-height/{height}")).await?;
        let block: EsploraBlock = self.get_json(&format!("{base_url}/block/{}", hash.trim())).await?;
        Ok((block.merkle_root, block.timestamp))
    }

    async fn fetch_blockchain_info(&self, base_url: &str, height: u64) -> Result<(String, u64), String> {
        let response: BlockchainInfoHeight = self
            .get_json(&format!("{base_url}/block-height/{height}?format=json"))
            .await?;

        // stale blocks share the height; prefer the main chain one
        let main = response.blocks.iter().position(|b| b.main_chain == Some(true));
        let block = response
            .blocks
            .into_iter()
            .nth(main.unwrap_or(0))
            .ok_or("Empty 'blocks' array in response")?;
        Ok((block.mrkl_root, block.time))
    }
}

/// Esplora `GET /block/{hash}` (fields we use)
#[derive(Debug, Deserialize)]
struct EsploraBlock {
    merkle_root: String,
    timestamp: u64,
}

/// blockchain.info `GET /block-height/{h}?format=json`
#[derive(Debug, Deserialize)]
struct BlockchainInfoHeight {
    blocks: Vec<BlockchainInfoBlock>,
}

#[derive(Debug, Deserialize)]
struct BlockchainInfoBlock {
    mrkl_root: String,
    time: u64,
    #[serde(default)]
    main_chain: Option<bool>,
}

/// Explorers print the merkle root reversed relative to the block header
fn internal_byte_order(display_hex: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(display_hex.trim()).map_err(|e| format!("bad merkle root: {e}"))?;
    let mut root: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("merkle root has {} bytes", b.len()))?;
    root.reverse();
    Ok(root)
}

#[async_trait]
impl BlockHeaderSource for EsploraHeaderSource {
    async fn block_header(&self, height: u64) -> Result<BlockHeader, OtsError> {
        if let Some(header) = self.cached(height) {
            return Ok(header);
        }

        let mut errors = Vec::new();

        for provider in &self.providers {
            match self.fetch_from_provider(provider, height).await {
                Ok(header) => {
                    self.store(header);
                    return Ok(header);
                }
                Err(e) => {
                    tracing::warn!(
                        height = height,
                        provider = %provider.name,
                        error = %e,
                        "Failed to fetch block header, trying next provider"
                    );
                    errors.push(format!("{}: {}", provider.name, e));
                }
            }
        }

        Err(OtsError::BlockHeader(format!(
            "block {}: {}",
            height,
            errors.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_MERKLE: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
    const GENESIS_TIME: u64 = 1_231_006_505;

    fn genesis_root() -> [u8; 32] {
        let mut root: [u8; 32] = hex::decode(GENESIS_MERKLE).unwrap().try_into().unwrap();
        root.reverse();
        root
    }

    #[test]
    fn test_internal_byte_order() {
        let root = internal_byte_order(GENESIS_MERKLE).unwrap();
        assert_eq!(root[0], 0x3b);
        assert_eq!(root[31], 0x4a);
        assert!(internal_byte_order("abcd").is_err());
        assert!(internal_byte_order("zz").is_err());
    }

    #[test]
    fn test_default_providers() {
        let providers = default_providers();
        assert_eq!(providers.len(), 3);
        assert_eq!(providers[0].name, "blockstream.info");
        assert_eq!(providers[0].style, ApiStyle::Esplora);
        assert_eq!(providers[1].base_url, "https://mempool.space/api");
        assert_eq!(providers[2].style, ApiStyle::BlockchainInfo);
    }

    #[tokio::test]
    async fn test_esplora_two_step_lookup() {
        let mut server = mockito::Server::new_async().await;
        let hash_mock = server
            .mock("GET", "/block-height/0")
            .with_status(200)
            .with_body("000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f\n")
            .expect(1)
            .create_async()
            .await;
        let block_mock = server
            .mock(
                "GET",
                "/block/000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
            )
            .with_status(200)
            .with_body(format!(
                r#"{{"height":0,"merkle_root":"{GENESIS_MERKLE}","timestamp":{GENESIS_TIME}}}"#
            ))
            .expect(1)
            .create_async()
            .await;

        let source = EsploraHeaderSource::with_providers(
            vec![ApiProvider::new("test", server.url(), ApiStyle::Esplora)],
            Duration::from_secs(5),
        )
        .unwrap();

        let header = source.block_header(0).await.unwrap();
        assert_eq!(header.merkle_root, genesis_root());
        assert_eq!(header.time, GENESIS_TIME);

        // second lookup is served from the cache
        let again = source.block_header(0).await.unwrap();
        assert_eq!(again, header);
        hash_mock.assert_async().await;
        block_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_blockchain_info() {
        let mut server = mockito::Server::new_async().await;
        let _broken = server
            .mock("GET", "/esplora/block-height/0")
            .with_status(503)
            .create_async()
            .await;
        let _info = server
            .mock("GET", "/info/block-height/0?format=json")
            .with_status(200)
            .with_body(format!(
                r#"{{"blocks":[
                    {{"mrkl_root":"{}","time":1,"main_chain":false}},
                    {{"mrkl_root":"{GENESIS_MERKLE}","time":{GENESIS_TIME},"main_chain":true}}
                ]}}"#,
                "00".repeat(32)
            ))
            .create_async()
            .await;

        let source = EsploraHeaderSource::with_providers(
            vec![
                ApiProvider::new("esplora", format!("{}/esplora", server.url()), ApiStyle::Esplora),
                ApiProvider::new("info", format!("{}/info", server.url()), ApiStyle::BlockchainInfo),
            ],
            Duration::from_secs(5),
        )
        .unwrap();

        let header = source.block_header(0).await.unwrap();
        assert_eq!(header.merkle_root, genesis_root());
        assert_eq!(header.time, GENESIS_TIME);
    }

    #[tokio::test]
    async fn test_error_details_include_all_providers() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a/block-height/5")
            .with_status(404)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b/block-height/5?format=json")
            .with_status(200)
            .with_body(r#"{"blocks":[]}"#)
            .create_async()
            .await;

        let source = EsploraHeaderSource::with_providers(
            vec![
                ApiProvider::new("first", format!("{}/a", server.url()), ApiStyle::Esplora),
                ApiProvider::new("second", format!("{}/b", server.url()), ApiStyle::BlockchainInfo),
            ],
            Duration::from_secs(5),
        )
        .unwrap();

        match source.block_header(5).await {
            Err(OtsError::BlockHeader(details)) => {
                assert!(details.contains("first"));
                assert!(details.contains("second"));
            }
            other => panic!("expected BlockHeader error, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_real_api_genesis_block() {
        let source = EsploraHeaderSource::new(Duration::from_secs(10)).unwrap();
        let header = source.block_header(0).await.unwrap();
        assert_eq!(header.time, GENESIS_TIME);
        assert_eq!(header.merkle_root, genesis_root());
    }
}
