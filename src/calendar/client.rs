//! Calendar server communication over HTTP

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

use super::endpoint::CalendarEndpoint;
use super::error::CalendarError;
use super::signing::{sign_digest, PUBLIC_KEY_HEADER, SIGNATURE_HEADER};
use crate::ots::{decode_timestamp, Timestamp};
use crate::traits::{Calendar, UpgradeReply};

const OTS_ACCEPT: &str = "application/vnd.opentimestamps.v1";

/// Calendar responses larger than this are rejected unparsed
pub const MAX_RESPONSE_SIZE: usize = 10_000;

/// Calendar client for HTTP communication with OTS servers
///
/// Holds one connection pool shared by every concurrent call.
pub struct HttpCalendar {
    /// HTTP client
    client: reqwest::Client,

    /// Default timeout
    timeout: Duration,
}

impl HttpCalendar {
    /// Create a new calendar client
    pub fn new(timeout: Duration) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CalendarError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn read_body(response: reqwest::Response, timeout_ms: u64) -> Result<Vec<u8>, CalendarError> {
        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE as u64 {
                return Err(CalendarError::InvalidResponse(format!(
                    "response of {len} bytes exceeds {MAX_RESPONSE_SIZE}"
                )));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CalendarError::from_reqwest(e, timeout_ms))?;
        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(CalendarError::InvalidResponse(format!(
                "response of {} bytes exceeds {MAX_RESPONSE_SIZE}",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }
}

/// Decode a calendar response body as a timestamp rooted at `msg`
pub fn parse_fragment(msg: &[u8], body: &[u8]) -> Result<Timestamp, CalendarError> {
    decode_timestamp(msg, body).map_err(|e| CalendarError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Calendar for HttpCalendar {
    async fn submit(
        &self,
        endpoint: &CalendarEndpoint,
        digest: &[u8],
        timeout: Duration,
    ) -> Result<Timestamp, CalendarError> {
        tracing::debug!(calendar_url = %endpoint.url(), private = endpoint.is_private(), "Submitting to calendar");

        let url = format!("{}/digest", endpoint.url());
        let timeout_ms = timeout.as_millis() as u64;

        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header(ACCEPT, OTS_ACCEPT)
            .header(USER_AGENT, concat!("ots-quorum/", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/x-opentimestamps")
            .body(digest.to_vec());

        if let Some(key) = endpoint.signing_key() {
            let (public_key, signature) = sign_digest(key, digest);
            request = request
                .header(PUBLIC_KEY_HEADER, public_key)
                .header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CalendarError::from_reqwest(e, timeout_ms))?;

        if !response.status().is_success() {
            return Err(CalendarError::ServiceError(format!(
                "Calendar returned status {}",
                response.status()
            )));
        }

        let body = Self::read_body(response, timeout_ms).await?;
        let fragment = parse_fragment(digest, &body)?;

        tracing::info!(calendar_url = %endpoint.url(), "Timestamp submitted successfully");

        Ok(fragment)
    }

    /// Sends GET request to `{calendar_url}/timestamp/{hex_commitment}`
    async fn fetch_upgrade(
        &self,
        calendar_url: &str,
        commitment: &[u8],
        timeout: Duration,
    ) -> Result<UpgradeReply, CalendarError> {
        let url = format!(
            "{}/timestamp/{}",
            calendar_url.trim_end_matches('/'),
            hex::encode(commitment)
        );
        let timeout_ms = timeout.as_millis() as u64;

        tracing::debug!(url = %url, "Fetching timestamp from calendar");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .header(ACCEPT, OTS_ACCEPT)
            .header(USER_AGENT, concat!("ots-quorum/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| CalendarError::from_reqwest(e, timeout_ms))?;

        // 404 = timestamp not yet available
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(calendar_url = %calendar_url, "Timestamp not yet available at calendar");
            return Ok(UpgradeReply::StillPending);
        }

        if !response.status().is_success() {
            return Err(CalendarError::ServiceError(format!(
                "Calendar returned status {}",
                response.status()
            )));
        }

        let body = Self::read_body(response, timeout_ms).await?;
        let upgraded = parse_fragment(commitment, &body)?;

        tracing::info!(calendar_url = %calendar_url, "Timestamp fetched from calendar");

        Ok(UpgradeReply::Upgraded(upgraded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ots::attestation::bitcoin;
    use crate::ots::{encode_timestamp, Attestation, Op};
    use ed25519_dalek::SigningKey;
    use mockito::Server;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn pending_fragment(msg: &[u8], uri: &str) -> Vec<u8> {
        let mut ts = Timestamp::new(msg.to_vec());
        ts.add_op(Op::Append(vec![0x01, 0x02]))
            .unwrap()
            .add_op(Op::Sha256)
            .unwrap()
            .attest(Attestation::Pending {
                uri: uri.to_string(),
            });
        encode_timestamp(&ts).unwrap()
    }

    fn bitcoin_fragment(msg: &[u8], height: u64) -> Vec<u8> {
        let mut ts = Timestamp::new(msg.to_vec());
        ts.add_op(Op::Sha256).unwrap().attest(bitcoin(height));
        encode_timestamp(&ts).unwrap()
    }

    #[test]
    fn test_calendar_client_creation() {
        let client = HttpCalendar::new(Duration::from_secs(15)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_submit_success() {
        let mut server = Server::new_async().await;
        let digest = [3u8; 32];
        let body = pending_fragment(&digest, "https://a.example");

        let mock = server
            .mock("POST", "/digest")
            .match_header("Accept", OTS_ACCEPT)
            .match_header("Content-Type", "application/x-opentimestamps")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let fragment = client
            .submit(&CalendarEndpoint::public(server.url()), &digest, TIMEOUT)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fragment.msg, digest.to_vec());
        assert_eq!(fragment.branch_count(), 1);
        assert_eq!(fragment.pending_leaves()[0].uri, "https://a.example");
    }

    #[tokio::test]
    async fn test_submit_private_calendar_signs_request() {
        let mut server = Server::new_async().await;
        let digest = [4u8; 32];
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let (public_key, signature) = sign_digest(&key, &digest);

        let mock = server
            .mock("POST", "/digest")
            .match_header(PUBLIC_KEY_HEADER, public_key.as_str())
            .match_header(SIGNATURE_HEADER, signature.as_str())
            .with_status(200)
            .with_body(pending_fragment(&digest, "https://p.example"))
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .submit(&CalendarEndpoint::private(server.url(), key), &digest, TIMEOUT)
            .await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_submit_non_success_status() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/digest")
            .with_status(500)
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .submit(&CalendarEndpoint::public(server.url()), &[0u8; 32], TIMEOUT)
            .await;

        mock.assert_async().await;
        match result {
            Err(CalendarError::ServiceError(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected ServiceError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_garbage_is_protocol_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/digest")
            .with_status(200)
            .with_body(vec![0x42, 0x42])
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .submit(&CalendarEndpoint::public(server.url()), &[0u8; 32], TIMEOUT)
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(CalendarError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_submit_empty_response_is_protocol_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/digest")
            .with_status(200)
            .with_body(vec![])
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .submit(&CalendarEndpoint::public(server.url()), &[0u8; 32], TIMEOUT)
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(CalendarError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_submit_oversized_response_rejected() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/digest")
            .with_status(200)
            .with_body(vec![0u8; MAX_RESPONSE_SIZE + 1])
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .submit(&CalendarEndpoint::public(server.url()), &[0u8; 32], TIMEOUT)
            .await;

        mock.assert_async().await;
        match result {
            Err(CalendarError::InvalidResponse(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("Expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_network_error() {
        let client = HttpCalendar::new(Duration::from_secs(1)).unwrap();

        // Invalid URL to trigger network error
        let result = client
            .submit(
                &CalendarEndpoint::public("http://invalid.local:9999"),
                &[0u8; 32],
                Duration::from_secs(1),
            )
            .await;

        // Network error or timeout are both acceptable
        assert!(matches!(
            result,
            Err(CalendarError::Network(_)) | Err(CalendarError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_upgrade_success() {
        let mut server = Server::new_async().await;
        let commitment = vec![1u8; 32];

        let mock = server
            .mock("GET", format!("/timestamp/{}", hex::encode(&commitment)).as_str())
            .with_status(200)
            .with_body(bitcoin_fragment(&commitment, 800_000))
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .fetch_upgrade(&server.url(), &commitment, TIMEOUT)
            .await
            .unwrap();

        mock.assert_async().await;
        match result {
            UpgradeReply::Upgraded(ts) => {
                assert_eq!(ts.msg, commitment);
                assert!(ts.is_settled());
            }
            UpgradeReply::StillPending => panic!("Expected upgraded timestamp"),
        }
    }

    #[tokio::test]
    async fn test_upgrade_not_found_is_still_pending() {
        let mut server = Server::new_async().await;
        let commitment = vec![2u8; 32];

        let mock = server
            .mock("GET", format!("/timestamp/{}", hex::encode(&commitment)).as_str())
            .with_status(404)
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .fetch_upgrade(&server.url(), &commitment, TIMEOUT)
            .await;

        mock.assert_async().await;
        assert_eq!(result, Ok(UpgradeReply::StillPending));
    }

    #[tokio::test]
    async fn test_upgrade_non_success_non_404_status() {
        let mut server = Server::new_async().await;
        let commitment = vec![3u8; 32];

        let mock = server
            .mock("GET", format!("/timestamp/{}", hex::encode(&commitment)).as_str())
            .with_status(503)
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .fetch_upgrade(&server.url(), &commitment, TIMEOUT)
            .await;

        mock.assert_async().await;
        match result {
            Err(CalendarError::ServiceError(msg)) => assert!(msg.contains("503")),
            other => panic!("Expected ServiceError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upgrade_hex_encoding() {
        let mut server = Server::new_async().await;
        let commitment = vec![0xAB, 0xCD, 0xEF];

        let mock = server
            .mock("GET", "/timestamp/abcdef")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let result = client
            .fetch_upgrade(&format!("{}/", server.url()), &commitment, TIMEOUT)
            .await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_upgrade_network_error() {
        let client = HttpCalendar::new(Duration::from_secs(1)).unwrap();

        let result = client
            .fetch_upgrade("http://invalid.local:9999", &[4u8; 32], Duration::from_secs(1))
            .await;

        assert!(matches!(
            result,
            Err(CalendarError::Network(_)) | Err(CalendarError::Timeout(_))
        ));
    }

    #[test]
    fn test_parse_fragment_rejects_trailing_bytes() {
        let mut body = pending_fragment(&[1u8; 32], "https://a.example");
        body.push(0x00);
        assert!(matches!(
            parse_fragment(&[1u8; 32], &body),
            Err(CalendarError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_calendar_submit_live() {
        let client = HttpCalendar::new(TIMEOUT).unwrap();
        let digest = crate::ots::commitment::digest_file(&Op::Sha256, b"test calendar").unwrap();

        let result = client
            .submit(
                &CalendarEndpoint::public("https://a.pool.opentimestamps.org"),
                &digest,
                TIMEOUT,
            )
            .await;
        assert!(result.is_ok());
    }
}
