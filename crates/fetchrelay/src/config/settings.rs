//! Process-wide settings, read once from the environment at startup.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ConfigError;
use crate::sanitize::redact_url;

pub const DEFAULT_ACCOUNTS_FILE: &str = "/app/accounts.list";
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_DELETE_AFTER_DAYS: i64 = 7;
pub const DEFAULT_RELAY_HOST: &str = "dovecot-mailcow";
pub const DEFAULT_RELAY_PORT: u16 = 24;

/// Source-side retention requested from the fetch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Never ask the source server to delete anything.
    Disabled,
    /// Delete from the source once a message is this many days old.
    DeleteAfterDays(u32),
}

impl Retention {
    /// Zero and negative values disable source-side deletion.
    pub fn from_days(days: i64) -> Self {
        if days <= 0 {
            Retention::Disabled
        } else {
            Retention::DeleteAfterDays(u32::try_from(days).unwrap_or(u32::MAX))
        }
    }

    /// Value for getmail's `delete_after` option, where 0 means "never".
    pub fn delete_after(&self) -> u32 {
        match self {
            Retention::Disabled => 0,
            Retention::DeleteAfterDays(days) => *days,
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Disabled => write!(f, "disabled"),
            Retention::DeleteAfterDays(days) => write!(f, "{} days", days),
        }
    }
}

/// Which retrieval protocol to use for source accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolPreference {
    /// POP3 when the host name mentions `pop`, IMAP otherwise.
    #[default]
    Auto,
    Imap,
    Pop3,
}

impl std::str::FromStr for ProtocolPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(ProtocolPreference::Auto),
            "imap" | "imaps" => Ok(ProtocolPreference::Imap),
            "pop" | "pop3" | "pop3s" => Ok(ProtocolPreference::Pop3),
            other => Err(format!("expected auto, imap or pop3, got '{}'", other)),
        }
    }
}

/// Wire protocol spoken by the transport agent towards the local server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayProtocol {
    #[default]
    Lmtp,
    Smtp,
}

impl RelayProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayProtocol::Lmtp => "lmtp",
            RelayProtocol::Smtp => "smtp",
        }
    }
}

/// The local mail server every account relays to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub host: String,
    pub port: u16,
    pub protocol: RelayProtocol,
}

impl RelayEndpoint {
    /// Rejects endpoints that can never be reached.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidRelay {
                reason: "relay host is not set".to_string(),
            });
        }
        if !is_valid_host(&self.host) {
            return Err(ConfigError::InvalidRelay {
                reason: format!("'{}' is not a valid host name or address", self.host),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidRelay {
                reason: "relay port must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Checks host name syntax (RFC 1123 labels, underscores tolerated for
/// container service names) or an IP literal.
pub fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    let host = host.strip_suffix('.').unwrap_or(host);
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Values taken from the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub accounts_file: Option<PathBuf>,
    pub interval: Option<i64>,
    pub state_dir: Option<PathBuf>,
}

/// Immutable process configuration shared by the materializer, the runner
/// and the scheduler.
#[derive(Debug, Clone)]
pub struct Settings {
    pub accounts_file: PathBuf,
    pub state_root: PathBuf,
    pub interval: Duration,
    pub retention: Retention,
    pub relay: RelayEndpoint,
    pub fetch_protocol: ProtocolPreference,
    pub dry_deliver: bool,
    pub success_hook_url: Option<String>,
    pub getmail_bin: PathBuf,
    pub msmtp_bin: PathBuf,
}

impl Settings {
    /// Builds settings from the process environment.
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), overrides)
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, overrides: &Overrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Interval comes first so that a bad value fails before anything else
        // is looked at.
        let interval = match overrides.interval {
            Some(secs) => parse_interval(&secs.to_string())?,
            None => match var("FETCH_INTERVAL") {
                Some(raw) => parse_interval(&raw)?,
                None => Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
            },
        };

        let retention = match var("DELETE_AFTER_DAYS") {
            Some(raw) => parse_retention(&raw)?,
            None => Retention::from_days(DEFAULT_DELETE_AFTER_DAYS),
        };

        let relay = RelayEndpoint {
            host: lookup("LMTP_HOST")
                .map(|h| h.trim().to_string())
                .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string()),
            port: match var("LMTP_PORT") {
                Some(raw) => parse_setting("LMTP_PORT", &raw)?,
                None => DEFAULT_RELAY_PORT,
            },
            protocol: match var("RELAY_PROTOCOL") {
                Some(raw) => parse_relay_protocol(&raw)?,
                None => RelayProtocol::default(),
            },
        };
        relay.validate()?;

        let fetch_protocol = match var("FETCH_PROTOCOL") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::InvalidSetting {
                    name: "FETCH_PROTOCOL".to_string(),
                    value: raw.clone(),
                    reason,
                })?,
            None => ProtocolPreference::default(),
        };

        let dry_deliver = var("DRY_DELIVER").is_some_and(|v| is_truthy(&v));

        let state_root = match overrides
            .state_dir
            .clone()
            .or_else(|| var("GETMAIL_DIR").map(PathBuf::from))
        {
            Some(dir) => dir,
            None => default_state_root(lookup("HOME").map(PathBuf::from))?,
        };
        let state_root = if dry_deliver {
            dry_state_root(&state_root)
        } else {
            state_root
        };

        let success_hook_url = match var("SUCCESS_HOOK_URL") {
            Some(raw) => Some(parse_hook_url(&raw)?),
            None => None,
        };

        let accounts_file = overrides
            .accounts_file
            .clone()
            .or_else(|| var("ACCOUNTS_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ACCOUNTS_FILE));

        Ok(Self {
            accounts_file,
            state_root,
            interval,
            retention,
            relay,
            fetch_protocol,
            dry_deliver,
            success_hook_url,
            getmail_bin: var("GETMAIL_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("getmail")),
            msmtp_bin: var("MSMTP_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("msmtp")),
        })
    }

    /// Logs the effective configuration, one line per setting.
    pub fn log_summary(&self) {
        info!(accounts_file = %self.accounts_file.display(), "Account list");
        info!(state_root = %self.state_root.display(), "Fetch engine state root");
        info!(interval_secs = self.interval.as_secs(), "Fetch interval");
        info!(retention = %self.retention, "Source retention");
        info!(
            host = %self.relay.host,
            port = self.relay.port,
            protocol = self.relay.protocol.as_str(),
            "Local relay"
        );
        info!(fetch_protocol = ?self.fetch_protocol, "Source protocol");
        match &self.success_hook_url {
            Some(url) => info!(url = %redact_url(url), "Success hook set"),
            None => info!("Success hook not set"),
        }
        if self.dry_deliver {
            warn!("DRY_DELIVER is on: mail is fetched but NOT delivered to local mailboxes");
        }
    }

    /// Directory that holds one sub-directory per account.
    pub fn state_root(&self) -> &Path {
        &self.state_root
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs as u64)),
        _ => Err(ConfigError::InvalidInterval {
            value: raw.to_string(),
        }),
    }
}

fn parse_retention(raw: &str) -> Result<Retention, ConfigError> {
    let days = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidRetention {
            value: raw.to_string(),
        })?;
    if days < 0 {
        warn!(
            days,
            "Negative DELETE_AFTER_DAYS, source-side deletion is disabled"
        );
    }
    Ok(Retention::from_days(days))
}

/// Only absolute http(s) URLs are accepted, so a typo fails at startup
/// instead of once per cycle.
fn parse_hook_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSetting {
        name: "SUCCESS_HOOK_URL".to_string(),
        value: redact_url(raw.trim()),
        reason,
    };
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(invalid(format!("expected http or https, got '{}'", other))),
    }
}

fn parse_relay_protocol(raw: &str) -> Result<RelayProtocol, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "lmtp" => Ok(RelayProtocol::Lmtp),
        "smtp" => Ok(RelayProtocol::Smtp),
        _ => Err(ConfigError::InvalidSetting {
            name: "RELAY_PROTOCOL".to_string(),
            value: raw.to_string(),
            reason: "expected lmtp or smtp".to_string(),
        }),
    }
}

fn parse_setting<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidSetting {
            name: name.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn default_state_root(home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let home = home
        .filter(|h| !h.as_os_str().is_empty())
        .or_else(dirs::home_dir)
        .ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".getmail"))
}

/// Sibling of `root` with a `-dry` suffix. Messages discarded under
/// DRY_DELIVER are recorded there, never in the real de-duplication state.
fn dry_state_root(root: &Path) -> PathBuf {
    let mut name = root
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "getmail".into());
    name.push("-dry");
    root.with_file_name(name)
}
