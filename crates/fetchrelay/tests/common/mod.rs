//! Shared test utilities for fetchrelay integration tests.
//!
//! - `TestHarness`: a scratch directory with an account list and state root
//! - `ScriptedEngine`: a fetch engine whose outcome is fixed per account
//! - `ScriptedProbe`: a mailbox probe whose outcome is fixed per host

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use secrecy::SecretString;
use tempfile::TempDir;

use fetchrelay::accounts::Endpoint;
use fetchrelay::engine::{FetchEngine, FetchReport};
use fetchrelay::materialize::AccountConfigBundle;
use fetchrelay::probe::{MailboxProbe, MailboxStat};
use fetchrelay::{AccountError, ConfigError, Overrides, Settings, Shutdown};

pub struct TestHarness {
    temp_dir: TempDir,
    pub accounts_file: PathBuf,
    pub state_root: PathBuf,
    env: HashMap<String, String>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let accounts_file = temp_dir.path().join("accounts.list");
        let state_root = temp_dir.path().join("state");

        let mut env = HashMap::new();
        env.insert(
            "ACCOUNTS_FILE".to_string(),
            accounts_file.display().to_string(),
        );
        env.insert("GETMAIL_DIR".to_string(), state_root.display().to_string());
        env.insert("LMTP_HOST".to_string(), "localhost".to_string());

        Self {
            temp_dir,
            accounts_file,
            state_root,
            env,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_accounts(&self, content: &str) -> &Self {
        std::fs::write(&self.accounts_file, content).expect("Failed to write account list");
        self
    }

    pub fn set_env(&mut self, name: &str, value: &str) -> &mut Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn remove_env(&mut self, name: &str) -> &mut Self {
        self.env.remove(name);
        self
    }

    pub fn try_settings(&self) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|name| self.env.get(name).cloned(), &Overrides::default())
    }

    pub fn settings(&self) -> Settings {
        self.try_settings().expect("settings should be valid")
    }

    pub fn account_dir(&self, key: &str) -> PathBuf {
        self.state_root.join(key)
    }

    /// Writes an executable shell script into the scratch directory.
    #[cfg(unix)]
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, body).expect("Failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make script executable");
        path
    }
}

/// Stands in for getmail: checks the rc file it is pointed at, rejects the
/// login for any account whose directory starts with `bob_`, and otherwise
/// reports two retrieved messages the way getmail does.
pub const FAKE_GETMAIL: &str = r#"#!/bin/sh
dir=""
rc=""
for arg in "$@"; do
    case "$arg" in
        --getmaildir=*) dir="${arg#--getmaildir=}" ;;
        --rcfile=*) rc="${arg#--rcfile=}" ;;
    esac
done
if [ ! -f "$dir/$rc" ]; then
    echo "getmailConfigurationError: $dir/$rc does not exist" >&2
    exit 2
fi
echo "getmail version 6.19"
echo "SimpleIMAPSSLRetriever:$(basename "$dir")@example:993:"
case "$(basename "$dir")" in
    bob_*)
        echo "IMAP error during login (b'[AUTHENTICATIONFAILED] Invalid credentials (Failure)')" >&2
        exit 1
        ;;
esac
echo "  2 messages (2048 bytes) retrieved, 0 skipped"
"#;

/// Fetch engine with a fixed outcome per `user@host`. Unlisted accounts
/// succeed with zero messages.
#[derive(Default)]
pub struct ScriptedEngine {
    outcomes: HashMap<String, Result<FetchReport, AccountError>>,
    shutdown_on: Option<(String, Shutdown)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, account: &str, messages: u32) -> Self {
        self.outcomes
            .insert(account.to_string(), Ok(FetchReport { messages }));
        self
    }

    pub fn fail(mut self, account: &str, error: AccountError) -> Self {
        self.outcomes.insert(account.to_string(), Err(error));
        self
    }

    /// Requests shutdown while the given account is being fetched.
    pub fn shutdown_during(mut self, account: &str, shutdown: Shutdown) -> Self {
        self.shutdown_on = Some((account.to_string(), shutdown));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FetchEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, bundle: &AccountConfigBundle) -> Result<FetchReport, AccountError> {
        assert!(
            bundle.getmailrc.exists(),
            "engine ran before configuration was written"
        );
        self.calls.lock().unwrap().push(bundle.display_name.clone());

        if let Some((account, shutdown)) = &self.shutdown_on {
            if *account == bundle.display_name {
                shutdown.request();
            }
        }

        self.outcomes
            .get(&bundle.display_name)
            .cloned()
            .unwrap_or(Ok(FetchReport { messages: 0 }))
    }
}

/// Mailbox probe with a fixed outcome per host. Unlisted hosts are
/// unreachable.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: HashMap<String, Result<MailboxStat, AccountError>>,
    pub seen: Mutex<Vec<(Endpoint, String)>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reachable(mut self, host: &str, messages: u32) -> Self {
        self.outcomes.insert(
            host.to_string(),
            Ok(MailboxStat {
                messages,
                size: None,
            }),
        );
        self
    }

    pub fn rejecting(mut self, host: &str) -> Self {
        self.outcomes.insert(
            host.to_string(),
            Err(AccountError::Auth("LOGIN failed".to_string())),
        );
        self
    }
}

#[async_trait::async_trait]
impl MailboxProbe for ScriptedProbe {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        user: &str,
        _password: &SecretString,
    ) -> Result<MailboxStat, AccountError> {
        self.seen
            .lock()
            .unwrap()
            .push((endpoint.clone(), user.to_string()));
        self.outcomes
            .get(&endpoint.host)
            .cloned()
            .unwrap_or_else(|| {
                Err(AccountError::Connection(format!(
                    "cannot connect to {}",
                    endpoint
                )))
            })
    }
}
