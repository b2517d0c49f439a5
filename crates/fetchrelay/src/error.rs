use std::path::PathBuf;
use thiserror::Error;

use crate::runner::CycleStatus;
use crate::sysexits::{Sysexit, EX_CONFIG, EX_NOINPUT, EX_SOFTWARE};

#[derive(Error, Debug)]
pub enum FetchRelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to set up success hook client: {0}")]
    Hook(#[from] reqwest::Error),

    #[error("Failed to install log subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),
}

impl FetchRelayError {
    /// Process exit code for a fatal error.
    pub fn exit_code(&self) -> Sysexit {
        match self {
            FetchRelayError::Config(ConfigError::ReadAccounts { .. }) => EX_NOINPUT,
            FetchRelayError::Config(_) => EX_CONFIG,
            _ => EX_SOFTWARE,
        }
    }
}

/// Fatal errors detected at startup. Any of these stops the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read account list '{path}': {source}")]
    ReadAccounts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid account list entry on line {line}: {reason}")]
    InvalidAccountLine { line: usize, reason: String },

    #[error(
        "Duplicate account '{user}' on host '{host}' (line {line}, first declared on line {first_line})"
    )]
    DuplicateAccount {
        user: String,
        host: String,
        first_line: usize,
        line: usize,
    },

    #[error("Invalid FETCH_INTERVAL '{value}': must be a positive number of seconds")]
    InvalidInterval { value: String },

    #[error("Invalid DELETE_AFTER_DAYS '{value}': must be an integer")]
    InvalidRetention { value: String },

    #[error("Invalid relay endpoint: {reason}")]
    InvalidRelay { reason: String },

    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Cannot determine a state directory: HOME is not set and GETMAIL_DIR is empty")]
    NoStateDir,
}

/// Per-account failures. These never leave the runner boundary; they are
/// folded into a [`crate::runner::CycleResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Relay to local mail server failed: {0}")]
    Relay(String),

    #[error("Failed to write account configuration: {0}")]
    Materialize(String),
}

impl AccountError {
    /// The cycle status this failure is reported under.
    pub fn status(&self) -> CycleStatus {
        match self {
            AccountError::Connection(_) => CycleStatus::ConnectionFailure,
            AccountError::Auth(_) => CycleStatus::AuthFailure,
            AccountError::Fetch(_) | AccountError::Materialize(_) => CycleStatus::FetchError,
            AccountError::Relay(_) => CycleStatus::RelayFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchRelayError>;
