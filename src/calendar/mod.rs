//! Calendar server access
//!
//! HTTP client for OpenTimestamps calendars, endpoint/key configuration and
//! the upgrade whitelist.

mod client;
mod endpoint;
mod error;
pub mod mock;
pub mod signing;
mod whitelist;

pub use client::{parse_fragment, HttpCalendar, MAX_RESPONSE_SIZE};
pub use endpoint::CalendarEndpoint;
pub use error::{CalendarError, FailureKind};
pub use whitelist::{CalendarWhitelist, DEFAULT_WHITELIST};
