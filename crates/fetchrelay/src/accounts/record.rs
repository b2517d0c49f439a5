//! The account data model: one declared external mailbox.

use std::fmt;

use secrecy::SecretString;
use serde::Serialize;

use crate::config::ProtocolPreference;
use crate::sanitize::{safe_component, stable_hash};

/// Retrieval protocol for a source mailbox. Always implicit TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    Imap,
    Pop3,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Imap => 993,
            Protocol::Pop3 => 995,
        }
    }

    /// getmail retriever class for this protocol.
    pub fn retriever_type(&self) -> &'static str {
        match self {
            Protocol::Imap => "SimpleIMAPSSLRetriever",
            Protocol::Pop3 => "SimplePOP3SSLRetriever",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Imap => write!(f, "IMAP4_SSL"),
            Protocol::Pop3 => write!(f, "POP3_SSL"),
        }
    }
}

/// Where and how a source mailbox is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.protocol)
    }
}

/// One parsed line of the account list. Immutable once parsed.
#[derive(Debug)]
pub struct AccountRecord {
    pub source_user: String,
    pub source_password: SecretString,
    pub source_host: String,
    pub target_email: String,
    /// 1-based line in the account list, for diagnostics.
    pub line: usize,
}

impl AccountRecord {
    /// Resolves the endpoint for this account.
    ///
    /// Both the fetch path and the dry-run probe go through here so a
    /// successful probe predicts a successful fetch.
    pub fn endpoint(&self, preference: ProtocolPreference) -> Endpoint {
        let protocol = match preference {
            ProtocolPreference::Imap => Protocol::Imap,
            ProtocolPreference::Pop3 => Protocol::Pop3,
            ProtocolPreference::Auto => {
                if self.source_host.to_ascii_lowercase().contains("pop") {
                    Protocol::Pop3
                } else {
                    Protocol::Imap
                }
            }
        };
        Endpoint {
            protocol,
            host: self.source_host.clone(),
            port: protocol.default_port(),
        }
    }

    /// `user@host`, used in log lines. Never includes the password.
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.source_user, self.source_host)
    }

    /// The account's state-directory key.
    ///
    /// `<user>_<host>` with the host lowercased and punctuation flattened to
    /// `_`. The key is plain only when that flattening can be undone: the
    /// user is purely alphanumeric and the host uses nothing but letters,
    /// digits and dots. Any other account gets a stable hash suffix of
    /// `user@host`, so a key depends on its own line alone and never moves
    /// when other accounts are added.
    pub fn key(&self) -> AccountKey {
        let host = self.source_host.to_ascii_lowercase();
        let base = format!("{}_{}", safe_component(&self.source_user), safe_component(&host));

        let plain_user = self.source_user.chars().all(|c| c.is_ascii_alphanumeric());
        let plain_host = !host.contains("..")
            && !host.starts_with('.')
            && !host.ends_with('.')
            && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');

        if plain_user && plain_host {
            AccountKey(base)
        } else {
            let identity = format!("{}@{}", self.source_user, host);
            AccountKey(format!("{}_{}", base, stable_hash(&identity)))
        }
    }
}

/// File-system safe identifier that owns an account's directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AccountKey(String);

impl AccountKey {
    /// Wraps an already file-system safe string without checking it.
    pub fn from_raw(key: impl Into<String>) -> Self {
        AccountKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes one key per account, in input order.
pub fn assign_keys(accounts: &[AccountRecord]) -> Vec<AccountKey> {
    accounts.iter().map(AccountRecord::key).collect()
}
