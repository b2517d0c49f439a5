//! Per-account configuration files for the external engines.
//!
//! Layout under the state root, one directory per account:
//!
//! ```text
//! <state_root>/<account key>/
//!     getmailrc      regenerated every pass
//!     msmtprc        regenerated every pass
//!     getmail.log    written by getmail
//!     oldmail-*      getmail's record of retrieved messages, never touched here
//! ```
//!
//! The rc files hold the source password in plain text, as both engines
//! require. They are created 0600 inside a 0700 directory.

mod render;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::accounts::{assign_keys, AccountKey, AccountRecord, Endpoint};
use crate::config::{ProtocolPreference, RelayEndpoint, Retention, Settings};
use crate::engine::TransportAgent;
use crate::error::{AccountError, ConfigError};

pub const GETMAILRC_FILE: &str = "getmailrc";
pub const MSMTPRC_FILE: &str = "msmtprc";
pub const MESSAGE_LOG_FILE: &str = "getmail.log";

/// Everything generated for one account on one materialization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfigBundle {
    pub key: AccountKey,
    /// `user@host`, for log lines.
    pub display_name: String,
    pub source_user: String,
    /// Fetch engine state directory; also holds the generated files.
    pub account_dir: PathBuf,
    pub getmailrc: PathBuf,
    pub msmtprc: PathBuf,
    pub endpoint: Endpoint,
    pub retention: Retention,
    pub target_email: String,
}

/// Writes fetch and transport configuration for accounts.
pub struct ConfigMaterializer {
    state_root: PathBuf,
    retention: Retention,
    relay: RelayEndpoint,
    protocol: ProtocolPreference,
    transport: Arc<dyn TransportAgent>,
}

impl ConfigMaterializer {
    /// Fails if the relay endpoint can never be reached.
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn TransportAgent>,
    ) -> Result<Self, ConfigError> {
        settings.relay.validate()?;
        Ok(Self {
            state_root: settings.state_root.clone(),
            retention: settings.retention,
            relay: settings.relay.clone(),
            protocol: settings.fetch_protocol,
            transport,
        })
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Materializes every account. A failure for one account does not stop
    /// the others; results come back in input order.
    pub fn materialize_all(
        &self,
        accounts: &[AccountRecord],
    ) -> Vec<(AccountKey, Result<AccountConfigBundle, AccountError>)> {
        assign_keys(accounts)
            .into_iter()
            .zip(accounts)
            .map(|(key, account)| {
                let result = self.materialize(account, &key);
                (key, result)
            })
            .collect()
    }

    /// Writes both configuration files for one account.
    ///
    /// Creates the account directory if needed. Existing getmail state in
    /// that directory is left exactly as it is.
    pub fn materialize(
        &self,
        account: &AccountRecord,
        key: &AccountKey,
    ) -> Result<AccountConfigBundle, AccountError> {
        let account_dir = self.state_root.join(key.as_str());
        ensure_private_dir(&account_dir).map_err(|e| {
            AccountError::Materialize(format!(
                "cannot create '{}': {}",
                account_dir.display(),
                e
            ))
        })?;

        let password = account.source_password.expose_secret();
        if password.trim() != password {
            warn!(
                account = %account.display_name(),
                "Password has leading or trailing whitespace, which getmail strips"
            );
        }

        let endpoint = account.endpoint(self.protocol);
        let msmtprc = account_dir.join(MSMTPRC_FILE);
        let getmailrc = account_dir.join(GETMAILRC_FILE);
        let delivery = self
            .transport
            .delivery_command(&msmtprc, &account.target_email);

        let write = |path: &Path, contents: &str| {
            write_private(path, contents).map_err(|e| {
                AccountError::Materialize(format!("cannot write '{}': {}", path.display(), e))
            })
        };

        write(&msmtprc, &self.transport.render_config(&self.relay))?;
        write(
            &getmailrc,
            &render::getmailrc(
                account,
                &endpoint,
                self.retention,
                &delivery,
                &account_dir.join(MESSAGE_LOG_FILE),
            ),
        )?;

        debug!(
            account = %key,
            dir = %account_dir.display(),
            transport = self.transport.name(),
            "Materialized account configuration"
        );

        Ok(AccountConfigBundle {
            key: key.clone(),
            display_name: account.display_name(),
            source_user: account.source_user.clone(),
            account_dir,
            getmailrc,
            msmtprc,
            endpoint,
            retention: self.retention,
            target_email: account.target_email.clone(),
        })
    }
}

/// Creates `dir` (and parents) if missing and restricts it to the owner.
fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Replaces `path` atomically with an owner-only file holding `contents`.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    // NamedTempFile is created 0600 on unix.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
