//! One account, one fetch-and-relay pass.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::accounts::AccountKey;
use crate::engine::FetchEngine;
use crate::error::AccountError;
use crate::materialize::AccountConfigBundle;

/// Outcome class of one account in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStatus {
    Success,
    ConnectionFailure,
    AuthFailure,
    FetchError,
    RelayFailure,
}

impl CycleStatus {
    pub const ALL: [CycleStatus; 5] = [
        CycleStatus::Success,
        CycleStatus::ConnectionFailure,
        CycleStatus::AuthFailure,
        CycleStatus::FetchError,
        CycleStatus::RelayFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Success => "success",
            CycleStatus::ConnectionFailure => "connection-failure",
            CycleStatus::AuthFailure => "auth-failure",
            CycleStatus::FetchError => "fetch-error",
            CycleStatus::RelayFailure => "relay-failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CycleStatus::Success)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one account during one cycle. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    pub key: AccountKey,
    pub status: CycleStatus,
    pub messages: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl CycleResult {
    pub fn success(key: AccountKey, messages: u32, elapsed: Duration) -> Self {
        Self {
            key,
            status: CycleStatus::Success,
            messages,
            elapsed,
            detail: None,
        }
    }

    pub fn failure(key: AccountKey, error: &AccountError, elapsed: Duration) -> Self {
        Self {
            key,
            status: error.status(),
            messages: 0,
            elapsed,
            detail: Some(error.to_string()),
        }
    }

    /// Emits the per-account log line.
    pub fn log(&self) {
        let elapsed_ms = self.elapsed.as_millis() as u64;
        match &self.detail {
            None => info!(
                account = %self.key,
                status = %self.status,
                messages = self.messages,
                elapsed_ms,
                "Account processed"
            ),
            Some(detail) => warn!(
                account = %self.key,
                status = %self.status,
                messages = self.messages,
                elapsed_ms,
                detail = %detail,
                "Account failed"
            ),
        }
    }
}

/// Runs the fetch engine for a single materialized account.
#[derive(Clone)]
pub struct AccountRunner {
    engine: Arc<dyn FetchEngine>,
}

impl AccountRunner {
    pub fn new(engine: Arc<dyn FetchEngine>) -> Self {
        Self { engine }
    }

    /// Fetches (and, through the engine, relays) new mail for one account.
    ///
    /// Every failure ends up classified in the returned result.
    pub async fn run(&self, bundle: &AccountConfigBundle) -> CycleResult {
        let span = info_span!("account", key = %bundle.key, source = %bundle.display_name);
        let started = Instant::now();

        let outcome = self.engine.fetch(bundle).instrument(span.clone()).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(report) => CycleResult::success(bundle.key.clone(), report.messages, elapsed),
            Err(e) => CycleResult::failure(bundle.key.clone(), &e, elapsed),
        };
        span.in_scope(|| result.log());
        result
    }
}
