//! Calendar endpoint configuration values

use ed25519_dalek::SigningKey;
use reqwest::Url;
use std::fmt;

use crate::error::{OtsError, OtsResult};

/// Calendar URL plus optional signing key for private calendars
#[derive(Clone)]
pub struct CalendarEndpoint {
    url: String,
    signing_key: Option<SigningKey>,
}

impl CalendarEndpoint {
    /// Public calendar
    pub fn public(url: impl Into<String>) -> Self {
        Self {
            url: normalize(url.into()),
            signing_key: None,
        }
    }

    /// Private calendar that requires signed submissions
    pub fn private(url: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            url: normalize(url.into()),
            signing_key: Some(signing_key),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Check the URL is an absolute http(s) URL
    pub fn validate(&self) -> OtsResult<()> {
        validate_url(&self.url)
    }
}

pub(crate) fn validate_url(url: &str) -> OtsResult<()> {
    let parsed =
        Url::parse(url).map_err(|e| OtsError::Config(format!("invalid calendar URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(OtsError::Config(format!(
            "calendar URL '{url}' must be an http(s) URL with a host"
        ))),
    }
}

fn normalize(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl fmt::Debug for CalendarEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarEndpoint")
            .field("url", &self.url)
            .field("private", &self.is_private())
            .finish()
    }
}

impl PartialEq for CalendarEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.signing_key.as_ref().map(SigningKey::to_bytes)
                == other.signing_key.as_ref().map(SigningKey::to_bytes)
    }
}

impl Eq for CalendarEndpoint {}
