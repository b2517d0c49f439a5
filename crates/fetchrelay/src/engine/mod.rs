//! External mail engines.
//!
//! The daemon never speaks IMAP, POP3 or LMTP on the fetch path itself. It
//! drives two external programs through these capability traits:
//!
//! - a [`FetchEngine`] (getmail) that retrieves new messages for one account
//!   and remembers which ones it has already seen, and
//! - a [`TransportAgent`] (msmtp) that the fetch engine pipes every message
//!   into for delivery to the local mail server.
//!
//! Whether an undelivered message is retried on the next cycle is decided by
//! the fetch engine: getmail only records a message as seen once its
//! destination accepted it. That behaviour is relied upon, not reimplemented.

pub mod getmail;
pub mod transport;

use std::path::{Path, PathBuf};

use crate::config::RelayEndpoint;
use crate::error::AccountError;
use crate::materialize::AccountConfigBundle;

pub use getmail::{classify, EngineOutput, Getmail};
pub use transport::{DiscardTransport, Msmtp};

/// What a successful fetch reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchReport {
    /// Messages retrieved (and handed to the transport agent) this run.
    pub messages: u32,
}

/// Retrieves new mail for one account using its generated configuration.
#[async_trait::async_trait]
pub trait FetchEngine: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Runs one fetch for the account. Every failure is classified into an
    /// [`AccountError`]; this must not panic.
    async fn fetch(&self, bundle: &AccountConfigBundle) -> Result<FetchReport, AccountError>;
}

/// A program the fetch engine pipes each retrieved message into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Delivers messages handed over by the fetch engine.
pub trait TransportAgent: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Contents of the agent's per-account configuration file.
    fn render_config(&self, relay: &RelayEndpoint) -> String;

    /// Command line that delivers one message, read from stdin, to
    /// `target_email` using the configuration at `config_path`.
    fn delivery_command(&self, config_path: &Path, target_email: &str) -> DeliveryCommand;
}
