//! Dry-run verification: log in to every source mailbox, count what is
//! waiting, and change nothing.
//!
//! Nothing here touches the state directory. The probe opens its own
//! read-only sessions instead of going through the fetch engine, which has
//! no check-only mode.

mod imap;
mod pop3;

use std::fmt::Write as _;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use async_native_tls::TlsConnector;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use crate::accounts::{AccountRecord, Endpoint, Protocol};
use crate::config::ProtocolPreference;
use crate::error::AccountError;
use crate::runner::CycleStatus;

pub use pop3::Pop3Session;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

type AsyncTcpStream = async_io::Async<TcpStream>;
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// What a successful probe found in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailboxStat {
    pub messages: u32,
    /// Total size in octets, when the protocol reports it cheaply (POP3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Read-only login check against one source mailbox.
#[async_trait::async_trait]
pub trait MailboxProbe: Send + Sync {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        user: &str,
        password: &SecretString,
    ) -> Result<MailboxStat, AccountError>;
}

/// Probes over the network with implicit TLS.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait::async_trait]
impl MailboxProbe for NetworkProbe {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        user: &str,
        password: &SecretString,
    ) -> Result<MailboxStat, AccountError> {
        let attempt = async {
            let stream = connect_tls(&endpoint.host, endpoint.port).await?;
            match endpoint.protocol {
                Protocol::Imap => imap::examine_inbox(stream, user, password).await,
                Protocol::Pop3 => pop3::stat_mailbox(stream, user, password).await,
            }
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| {
                AccountError::Connection(format!(
                    "no answer from {} within {}s",
                    endpoint,
                    self.timeout.as_secs()
                ))
            })?
    }
}

async fn connect_tls(host: &str, port: u16) -> Result<TlsStream, AccountError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AccountError::Connection(format!("cannot resolve {}: {}", host, e)))?;

    let mut last_error = None;
    let mut tcp = None;
    for addr in addrs {
        match AsyncTcpStream::connect(addr).await {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    let tcp = tcp.ok_or_else(|| {
        AccountError::Connection(match last_error {
            Some(e) => format!("cannot connect to {}:{}: {}", host, port, e),
            None => format!("{} has no addresses", host),
        })
    })?;

    TlsConnector::new()
        .connect(host, tcp)
        .await
        .map_err(|e| AccountError::Connection(format!("TLS handshake with {} failed: {}", host, e)))
}

/// Outcome of probing one account.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub account: String,
    pub endpoint: Endpoint,
    pub status: CycleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<MailboxStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeReport {
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    fn render(&self) -> String {
        let head = format!(
            "[{}] {} {}:{}",
            self.account, self.endpoint.protocol, self.endpoint.host, self.endpoint.port
        );
        match (&self.mailbox, &self.detail) {
            (Some(MailboxStat { messages, size: Some(size) }), _) => {
                format!("{}: ok, {} messages ({} bytes)", head, messages, size)
            }
            (Some(MailboxStat { messages, size: None }), _) => {
                format!("{}: ok, {} messages in INBOX", head, messages)
            }
            (None, detail) => format!(
                "{}: {}: {}",
                head,
                self.status,
                detail.as_deref().unwrap_or("failed")
            ),
        }
    }
}

/// Result of a whole dry run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub checked_at: DateTime<Utc>,
    pub accounts: Vec<ProbeReport>,
}

impl VerificationReport {
    pub fn all_ok(&self) -> bool {
        self.accounts.iter().all(ProbeReport::is_ok)
    }

    pub fn failures(&self) -> usize {
        self.accounts.iter().filter(|r| !r.is_ok()).count()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for report in &self.accounts {
            let _ = writeln!(out, "{}", report.render());
        }
        let _ = writeln!(
            out,
            "{} accounts checked at {}, {} failed",
            self.accounts.len(),
            self.checked_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.failures()
        );
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Probes every account in order, one at a time.
pub async fn run_verification(
    accounts: &[AccountRecord],
    preference: ProtocolPreference,
    probe: &dyn MailboxProbe,
) -> VerificationReport {
    let checked_at = Utc::now();
    let mut reports = Vec::with_capacity(accounts.len());

    for account in accounts {
        let endpoint = account.endpoint(preference);
        let name = account.display_name();
        info!(account = %name, endpoint = %endpoint, "Checking account");

        let started = Instant::now();
        let outcome = probe
            .probe(&endpoint, &account.source_user, &account.source_password)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(stat) => {
                info!(account = %name, messages = stat.messages, elapsed_ms, "Account reachable");
                ProbeReport {
                    account: name,
                    endpoint,
                    status: CycleStatus::Success,
                    mailbox: Some(stat),
                    detail: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                warn!(
                    account = %name,
                    status = %e.status(),
                    error = %e,
                    elapsed_ms,
                    "Account check failed"
                );
                ProbeReport {
                    account: name,
                    endpoint,
                    status: e.status(),
                    mailbox: None,
                    detail: Some(e.to_string()),
                    elapsed_ms,
                }
            }
        };
        reports.push(report);
    }

    VerificationReport {
        checked_at,
        accounts: reports,
    }
}
