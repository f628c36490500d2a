//! Private calendar key files and request signing
//!
//! Key file format: one calendar per line, `<url> <hex ed25519 seed>`.
//! Blank lines and lines starting with `#` are ignored.

use ed25519_dalek::{Signer, SigningKey};
use std::path::Path;

use super::endpoint::CalendarEndpoint;
use crate::error::{OtsError, OtsResult};

/// Header carrying the hex-encoded verifying key
pub const PUBLIC_KEY_HEADER: &str = "X-Ots-Public-Key";

/// Header carrying the hex-encoded signature over the submitted digest
pub const SIGNATURE_HEADER: &str = "X-Ots-Signature";

/// Parse key file contents into private endpoints
///
/// Fails on the first malformed line so no network call is ever made with a
/// partially loaded key set.
pub fn parse_key_file(contents: &str) -> OtsResult<Vec<CalendarEndpoint>> {
    let mut endpoints = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let url = parts.next().unwrap_or_default();
        let key_hex = parts.next().ok_or_else(|| {
            OtsError::Config(format!("key file line {line_no}: missing signing key for {url}"))
        })?;
        if parts.next().is_some() {
            return Err(OtsError::Config(format!(
                "key file line {line_no}: unexpected extra fields"
            )));
        }

        let key = parse_signing_key(key_hex)
            .map_err(|e| OtsError::Config(format!("key file line {line_no}: {e}")))?;
        let endpoint = CalendarEndpoint::private(url, key);
        endpoint.validate()?;
        endpoints.push(endpoint);
    }

    Ok(endpoints)
}

/// Read and parse a key file
pub async fn load_key_file(path: &Path) -> OtsResult<Vec<CalendarEndpoint>> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        OtsError::Config(format!("cannot read key file {}: {e}", path.display()))
    })?;
    let endpoints = parse_key_file(&contents)?;
    if endpoints.is_empty() {
        return Err(OtsError::Config(format!(
            "key file {} contains no calendars",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), count = endpoints.len(), "Loaded private calendars");
    Ok(endpoints)
}

fn parse_signing_key(key_hex: &str) -> Result<SigningKey, String> {
    let bytes = hex::decode(key_hex).map_err(|e| format!("signing key is not hex: {e}"))?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("signing key must be 32 bytes, got {}", bytes.len()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign a digest, returning hex `(public_key, signature)`
pub fn sign_digest(key: &SigningKey, digest: &[u8]) -> (String, String) {
    let signature = key.sign(digest);
    (
        hex::encode(key.verifying_key().to_bytes()),
        hex::encode(signature.to_bytes()),
    )
}
