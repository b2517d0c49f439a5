//! getmail as the fetch engine.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{FetchEngine, FetchReport};
use crate::error::AccountError;
use crate::materialize::{AccountConfigBundle, GETMAILRC_FILE};

/// getmail's per-retriever summary, e.g. `3 messages (5120 bytes) retrieved, 0 skipped`.
static RE_RETRIEVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+messages?\s+\(\d+\s+bytes?\)\s+retrieved").unwrap()
});

/// Lines getmail prints on every run: version banner, retriever header
/// (`SimpleIMAPSSLRetriever:bob@imap.example.com:993:`) and summaries. They
/// carry the user and host verbatim and never describe a failure.
static RE_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(getmail version|copyright|\w+retriever:|\d+\s+messages?\s+\()").unwrap()
});

/// `ssl` as a word start: `SSL: CERTIFICATE_VERIFY_FAILED`, `SSLError`, but
/// not `IMAP4_SSL`.
static RE_SSL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bssl").unwrap());

/// getmail reports destination (MDA) failures verbatim, so these are
/// checked before anything else.
const RELAY_MARKERS: &[&str] = &[
    "delivery error",
    "getmaildeliveryerror",
    "mda_external",
    "msmtp",
    "exited",
];

const AUTH_MARKERS: &[&str] = &[
    "login failed",
    "login refused",
    "getmailloginrefusederror",
    "authentication failed",
    "authenticationfailed",
    "invalid credentials",
    "invalid password",
    "bad credentials",
    "[auth]",
];

const CONNECTION_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "name or service not known",
    "temporary failure in name resolution",
    "nodename nor servname",
    "network is unreachable",
    "no route to host",
    "error connecting",
    "socket error",
    "certificate verify failed",
    "eof occurred",
];

/// Captured result of one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last non-empty line of stderr, falling back to stdout.
    fn last_line(&self) -> String {
        let last = |text: &str| {
            text.lines()
                .map(str::trim)
                .rfind(|l| !l.is_empty())
                .map(str::to_string)
        };
        last(&self.stderr)
            .or_else(|| last(&self.stdout))
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Host names, addresses and user names as they appear in getmail output.
static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9._@+\-]+").unwrap());

/// Lowercased failure text: every output line except getmail's banner,
/// with the account's own names masked so they cannot match a marker.
fn error_text(output: &EngineOutput, identity: &[&str]) -> String {
    let masks: Vec<String> = identity
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty() && !RE_BANNER.is_match(line))
        .map(|line| {
            let line = line.to_ascii_lowercase();
            RE_TOKEN
                .replace_all(&line, |caps: &regex::Captures| {
                    if masks.iter().any(|m| *m == caps[0]) {
                        "<account>".to_string()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A POP3 `-ERR` in reply to USER/PASS.
fn pop_login_rejected(text: &str) -> bool {
    text.lines().any(|line| {
        line.contains("-err")
            && ["pass", "login", "logging in", "auth"]
                .iter()
                .any(|w| line.contains(w))
    })
}

/// Maps a finished getmail run onto a report or a classified failure.
///
/// `identity` lists the account's user, host and target address. Tokens
/// equal to one of them are masked before matching, so a user named `msmtp-ops` does not turn every
/// failure into a relay failure.
pub fn classify(output: &EngineOutput, identity: &[&str]) -> Result<FetchReport, AccountError> {
    if output.success() {
        let messages = RE_RETRIEVED
            .captures_iter(&output.stdout)
            .chain(RE_RETRIEVED.captures_iter(&output.stderr))
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .fold(0u32, u32::saturating_add);
        return Ok(FetchReport { messages });
    }

    let text = error_text(output, identity);
    let detail = output.last_line();
    let mentions = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if mentions(RELAY_MARKERS) {
        Err(AccountError::Relay(detail))
    } else if mentions(AUTH_MARKERS) || pop_login_rejected(&text) {
        Err(AccountError::Auth(detail))
    } else if mentions(CONNECTION_MARKERS) || RE_SSL.is_match(&text) {
        Err(AccountError::Connection(detail))
    } else {
        Err(AccountError::Fetch(detail))
    }
}

/// Runs the `getmail` executable against an account directory.
#[derive(Debug, Clone)]
pub struct Getmail {
    program: PathBuf,
}

impl Getmail {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn invoke(&self, bundle: &AccountConfigBundle) -> std::io::Result<EngineOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("--getmaildir={}", bundle.account_dir.display()))
            .arg(format!("--rcfile={}", GETMAILRC_FILE))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // A Ctrl-C in the terminal goes to the whole foreground group; keep
        // getmail out of it so the running account can finish cleanly.
        #[cfg(unix)]
        cmd.process_group(0);

        let output = cmd.output().await?;
        Ok(EngineOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait::async_trait]
impl FetchEngine for Getmail {
    fn name(&self) -> &str {
        "getmail"
    }

    async fn fetch(&self, bundle: &AccountConfigBundle) -> Result<FetchReport, AccountError> {
        debug!(
            account = %bundle.key,
            program = %self.program.display(),
            "Invoking fetch engine"
        );

        let output = self.invoke(bundle).await.map_err(|e| {
            AccountError::Fetch(format!(
                "failed to run '{}': {}",
                self.program.display(),
                e
            ))
        })?;

        for line in output.stdout.lines().chain(output.stderr.lines()) {
            if !line.trim().is_empty() {
                trace!(account = %bundle.key, "getmail: {}", line.trim());
            }
        }

        classify(
            &output,
            &[
                bundle.source_user.as_str(),
                bundle.display_name.as_str(),
                bundle.endpoint.host.as_str(),
                bundle.target_email.as_str(),
            ],
        )
    }
}
