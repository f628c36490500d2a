//! Client configuration

use std::time::Duration;

use crate::calendar::{CalendarEndpoint, CalendarWhitelist};

/// Default public calendars
pub const DEFAULT_CALENDARS: &[&str] = &[
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
    "https://btc.calendar.catallaxy.com",
];

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUORUM: usize = 2;
const DEFAULT_MAX_CONCURRENT_FILES: usize = 8;
const DEFAULT_BITCOIN_TIMEOUT_SECS: u64 = 10;

/// OpenTimestamps client configuration
#[derive(Debug, Clone)]
pub struct OtsConfig {
    /// Public calendar server URLs
    pub calendar_urls: Vec<String>,

    /// Per-calendar request timeout in seconds
    pub timeout_secs: u64,

    /// Quorum used when the caller does not pass one; `None` = all calendars
    pub default_quorum: Option<usize>,

    /// Extra wait for slower calendars once quorum is met (milliseconds)
    pub straggler_grace_ms: u64,

    /// Files stamped concurrently by `multistamp`
    pub max_concurrent_files: usize,

    /// Calendars trusted for upgrades
    pub whitelist: CalendarWhitelist,

    /// Timeout per Bitcoin API request in seconds
    pub bitcoin_timeout_secs: u64,
}

impl Default for OtsConfig {
    fn default() -> Self {
        Self {
            calendar_urls: DEFAULT_CALENDARS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_quorum: Some(DEFAULT_QUORUM),
            straggler_grace_ms: 0,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            whitelist: CalendarWhitelist::default(),
            bitcoin_timeout_secs: DEFAULT_BITCOIN_TIMEOUT_SECS,
        }
    }
}

impl OtsConfig {
    /// Create with custom calendar URLs
    #[must_use]
    pub fn with_calendars(urls: Vec<String>) -> Self {
        Self {
            calendar_urls: urls,
            ..Self::default()
        }
    }

    /// Create config from environment variables
    ///
    /// Environment variables:
    /// - `OTS_CALENDAR_URLS`: Comma-separated list of calendar URLs
    /// - `OTS_TIMEOUT_SECS`: Per-calendar timeout in seconds (default: 10)
    /// - `OTS_DEFAULT_QUORUM`: Default M; `all` requires every calendar (default: 2)
    /// - `OTS_STRAGGLER_GRACE_MS`: Wait for stragglers after quorum (default: 0)
    /// - `OTS_MAX_CONCURRENT_FILES`: Concurrent files in multistamp (default: 8)
    /// - `OTS_WHITELIST`: Comma-separated calendar host patterns, `*` for any
    /// - `OTS_BITCOIN_TIMEOUT_SECS`: Bitcoin API timeout in seconds (default: 10)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let calendar_urls = std::env::var("OTS_CALENDAR_URLS")
            .map(|s| split_list(&s))
            .unwrap_or(defaults.calendar_urls);

        let timeout_secs = env_parse("OTS_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs);

        let default_quorum = match std::env::var("OTS_DEFAULT_QUORUM") {
            Ok(s) if s.trim().eq_ignore_ascii_case("all") => None,
            Ok(s) => s
                .trim()
                .parse()
                .ok()
                .filter(|m: &usize| *m > 0)
                .or(defaults.default_quorum),
            Err(_) => defaults.default_quorum,
        };

        let straggler_grace_ms =
            env_parse("OTS_STRAGGLER_GRACE_MS").unwrap_or(defaults.straggler_grace_ms);

        let max_concurrent_files = env_parse("OTS_MAX_CONCURRENT_FILES")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_concurrent_files);

        let whitelist = match std::env::var("OTS_WHITELIST") {
            Ok(s) if s.trim() == "*" => CalendarWhitelist::any(),
            Ok(s) => CalendarWhitelist::from_patterns(split_list(&s)),
            Err(_) => defaults.whitelist,
        };

        let bitcoin_timeout_secs =
            env_parse("OTS_BITCOIN_TIMEOUT_SECS").unwrap_or(defaults.bitcoin_timeout_secs);

        Self {
            calendar_urls,
            timeout_secs,
            default_quorum,
            straggler_grace_ms,
            max_concurrent_files,
            whitelist,
            bitcoin_timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn straggler_grace(&self) -> Duration {
        Duration::from_millis(self.straggler_grace_ms)
    }

    pub fn bitcoin_timeout(&self) -> Duration {
        Duration::from_secs(self.bitcoin_timeout_secs)
    }

    /// Configured calendars as public endpoints
    pub fn public_endpoints(&self) -> Vec<CalendarEndpoint> {
        self.calendar_urls
            .iter()
            .map(|url| CalendarEndpoint::public(url.as_str()))
            .collect()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
