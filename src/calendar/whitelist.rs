//! Calendars trusted for upgrade requests
//!
//! Pending attestations carry whatever URL the calendar wrote into them, so
//! upgrades only follow URLs whose host matches a whitelisted pattern.
//! `*.example.org` matches any subdomain of `example.org`.

use reqwest::Url;

/// Default trusted calendar host patterns
pub const DEFAULT_WHITELIST: &[&str] = &[
    "*.calendar.opentimestamps.org",
    "*.calendar.eternitywall.com",
    "*.calendar.catallaxy.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarWhitelist {
    /// `None` permits every calendar
    patterns: Option<Vec<String>>,
}

impl Default for CalendarWhitelist {
    fn default() -> Self {
        Self::from_patterns(DEFAULT_WHITELIST.iter().copied())
    }
}

impl CalendarWhitelist {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: Some(
                patterns
                    .into_iter()
                    .map(|p| p.as_ref().trim().to_ascii_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        }
    }

    /// Whitelist that permits every http(s) calendar
    pub fn any() -> Self {
        Self { patterns: None }
    }

    /// Add the hosts of explicitly configured calendars
    pub fn with_urls<'a>(mut self, urls: impl IntoIterator<Item = &'a str>) -> Self {
        if let Some(patterns) = self.patterns.as_mut() {
            for url in urls {
                if let Some(host) = host_of(url) {
                    patterns.push(host);
                }
            }
        }
        self
    }

    pub fn permits(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        match &self.patterns {
            None => true,
            Some(patterns) => patterns.iter().any(|p| host_matches(p, &host)),
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(str::to_ascii_lowercase)
}

fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
        None => pattern == host,
    }
}
