//! The fetch loop as an explicit state machine.
//!
//! ```text
//!   Idle ──> RunningCycle ──> Sleeping ──> Idle ...
//!    │            │              │
//!    │            └──> Draining <┘      (shutdown requested)
//!    │                   │
//!    └──────────────> Terminated
//! ```
//!
//! Shutdown is only observed at transitions: before each account and while
//! sleeping. An account that has already started always runs to completion.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::accounts::AccountRecord;
use crate::hook::SuccessHook;
use crate::materialize::ConfigMaterializer;
use crate::runner::{AccountRunner, CycleResult, CycleStatus};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    RunningCycle,
    Sleeping,
    Draining,
    Terminated,
}

/// Aggregate of one cycle across all accounts.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub counts: BTreeMap<CycleStatus, usize>,
    pub total_messages: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    /// True when shutdown stopped the cycle before every account ran.
    pub interrupted: bool,
    pub results: Vec<CycleResult>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl CycleSummary {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            counts: CycleStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            total_messages: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
            results: Vec::new(),
        }
    }

    fn record(&mut self, result: CycleResult) {
        *self.counts.entry(result.status).or_default() += 1;
        self.total_messages += u64::from(result.messages);
        self.results.push(result);
    }

    pub fn count(&self, status: CycleStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.status.is_success()).count()
    }

    pub fn log(&self) {
        let fields = serde_json::to_string(&self.counts).unwrap_or_default();
        info!(
            cycle = self.cycle,
            accounts = self.results.len(),
            succeeded = self.count(CycleStatus::Success),
            failed = self.failures(),
            messages = self.total_messages,
            elapsed_ms = self.elapsed.as_millis() as u64,
            interrupted = self.interrupted,
            counts = %fields,
            "Cycle finished"
        );
    }
}

pub struct CycleScheduler {
    accounts: Vec<AccountRecord>,
    materializer: ConfigMaterializer,
    runner: AccountRunner,
    interval: Duration,
    hook: Option<SuccessHook>,
    shutdown: Shutdown,
    state: SchedulerState,
    cycle: u64,
    last_summary: Option<CycleSummary>,
}

impl CycleScheduler {
    pub fn new(
        accounts: Vec<AccountRecord>,
        materializer: ConfigMaterializer,
        runner: AccountRunner,
        interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            accounts,
            materializer,
            runner,
            interval,
            hook: None,
            shutdown,
            state: SchedulerState::Idle,
            cycle: 0,
            last_summary: None,
        }
    }

    pub fn with_hook(mut self, hook: SuccessHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn last_summary(&self) -> Option<&CycleSummary> {
        self.last_summary.as_ref()
    }

    /// Steps until the scheduler terminates.
    pub async fn run(&mut self) {
        info!(
            accounts = self.accounts.len(),
            interval_secs = self.interval.as_secs(),
            "Fetch loop starting"
        );
        while self.state != SchedulerState::Terminated {
            self.step().await;
        }
        info!(cycles = self.cycle, "Fetch loop stopped");
    }

    /// Performs exactly one state transition and returns the new state.
    pub async fn step(&mut self) -> SchedulerState {
        let next = match self.state {
            SchedulerState::Idle => {
                if self.shutdown.is_requested() {
                    SchedulerState::Terminated
                } else {
                    SchedulerState::RunningCycle
                }
            }
            SchedulerState::RunningCycle => {
                let summary = self.run_cycle().await;
                let interrupted = summary.interrupted;
                self.last_summary = Some(summary);

                if interrupted {
                    SchedulerState::Draining
                } else {
                    if let Some(hook) = &self.hook {
                        hook.notify().await;
                    }
                    SchedulerState::Sleeping
                }
            }
            SchedulerState::Sleeping => {
                debug!(secs = self.interval.as_secs(), "Sleeping until next cycle");
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => SchedulerState::Idle,
                    _ = self.shutdown.wait() => SchedulerState::Draining,
                }
            }
            SchedulerState::Draining => {
                info!("Shutdown requested, draining");
                SchedulerState::Terminated
            }
            SchedulerState::Terminated => SchedulerState::Terminated,
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, "Scheduler transition");
        }
        self.state = next;
        next
    }

    /// Materializes and runs every account once.
    async fn run_cycle(&mut self) -> CycleSummary {
        self.cycle += 1;
        let span = info_span!("cycle", number = self.cycle);
        self.run_accounts().instrument(span).await
    }

    async fn run_accounts(&self) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::new(self.cycle);

        info!(accounts = self.accounts.len(), "Cycle starting");

        for (key, bundle) in self.materializer.materialize_all(&self.accounts) {
            if self.shutdown.is_requested() {
                warn!(
                    remaining = self.accounts.len() - summary.results.len(),
                    "Shutdown requested, skipping remaining accounts"
                );
                summary.interrupted = true;
                break;
            }

            let result = match bundle {
                Ok(bundle) => self.runner.run(&bundle).await,
                Err(e) => {
                    let result = CycleResult::failure(key, &e, Duration::ZERO);
                    result.log();
                    result
                }
            };
            summary.record(result);
        }

        summary.elapsed = started.elapsed();
        summary.log();
        summary
    }
}
