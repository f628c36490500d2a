//! ots-quorum library exports

pub mod calendar;
pub mod config;
pub mod error;
pub mod files;
pub mod ots;
pub mod stamper;
pub mod traits;
pub mod upgrade;
pub mod verify;

// Re-exports
pub use calendar::{CalendarEndpoint, CalendarError, HttpCalendar};
pub use config::OtsConfig;
pub use error::{OtsError, OtsResult};
pub use ots::{DetachedTimestampFile, Timestamp};
pub use stamper::{multistamp, QuorumStamper, StampOutcome, StampParams};
pub use traits::{BlockHeaderSource, Calendar};
pub use upgrade::{upgrade_file, UpgradeManager, UpgradeOutcome};
pub use verify::{Verification, VerifyManager};
