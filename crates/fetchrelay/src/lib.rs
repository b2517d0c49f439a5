//! Multi-account mail fetch and relay daemon.
//!
//! Periodically pulls new mail from external IMAP/POP3 mailboxes with
//! getmail and relays every message to a local mail server through msmtp.
//! A one-shot dry run verifies that every account can log in.

pub mod accounts;
pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod materialize;
pub mod probe;
pub mod runner;
pub mod sanitize;
pub mod scheduler;
pub mod shutdown;
pub mod sysexits;
pub mod telemetry;

pub use accounts::{load_accounts, parse_accounts, AccountKey, AccountRecord};
pub use config::{Overrides, Settings};
pub use error::{AccountError, ConfigError, FetchRelayError, Result};
pub use materialize::{AccountConfigBundle, ConfigMaterializer};
pub use runner::{AccountRunner, CycleResult, CycleStatus};
pub use scheduler::{CycleScheduler, CycleSummary, SchedulerState};
pub use shutdown::Shutdown;
