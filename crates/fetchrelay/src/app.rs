//! Startup wiring shared by the binary and the integration tests.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::accounts::{load_accounts, AccountRecord};
use crate::config::{Overrides, Settings};
use crate::engine::{DiscardTransport, FetchEngine, Msmtp, TransportAgent};
use crate::error::Result;
use crate::hook::SuccessHook;
use crate::materialize::ConfigMaterializer;
use crate::probe::{run_verification, MailboxProbe};
use crate::runner::AccountRunner;
use crate::scheduler::CycleScheduler;
use crate::shutdown::Shutdown;
use crate::sysexits::{Sysexit, EX_OK, EX_PROBE_FAILED};

/// How the dry-run report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown format '{}', expected text or json", other)),
        }
    }
}

/// Reads settings and the account list. Any error here is fatal.
pub fn load(overrides: &Overrides) -> Result<(Settings, Vec<AccountRecord>)> {
    let settings = Settings::from_env(overrides)?;
    settings.log_summary();

    let accounts = load_accounts(&settings.accounts_file)?;
    info!(count = accounts.len(), "Loaded account list");
    if accounts.is_empty() {
        warn!(path = %settings.accounts_file.display(), "Account list has no entries");
    }
    Ok((settings, accounts))
}

/// Picks the transport agent for these settings.
pub fn transport_for(settings: &Settings) -> Arc<dyn TransportAgent> {
    if settings.dry_deliver {
        Arc::new(DiscardTransport)
    } else {
        Arc::new(Msmtp::new(settings.msmtp_bin.clone()))
    }
}

/// Assembles the fetch loop. Nothing is written to disk until the first
/// cycle runs.
pub fn build_scheduler(
    settings: &Settings,
    accounts: Vec<AccountRecord>,
    engine: Arc<dyn FetchEngine>,
    shutdown: Shutdown,
) -> Result<CycleScheduler> {
    let materializer = ConfigMaterializer::new(settings, transport_for(settings))?;
    info!(engine = engine.name(), "Fetch engine selected");

    let scheduler = CycleScheduler::new(
        accounts,
        materializer,
        AccountRunner::new(engine),
        settings.interval,
        shutdown,
    );

    Ok(match &settings.success_hook_url {
        Some(url) => scheduler.with_hook(SuccessHook::new(url.clone())?),
        None => scheduler,
    })
}

/// Probes every account once, prints the report and returns the exit code.
pub async fn dry_run(
    settings: &Settings,
    accounts: &[AccountRecord],
    probe: &dyn MailboxProbe,
    format: ReportFormat,
) -> Sysexit {
    info!(accounts = accounts.len(), "Dry run: checking logins only");
    let report = run_verification(accounts, settings.fetch_protocol, probe).await;

    match format {
        ReportFormat::Text => print!("{}", report.render_text()),
        ReportFormat::Json => match report.render_json() {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Failed to render report as JSON: {}", e),
        },
    }

    if report.all_ok() {
        EX_OK
    } else {
        EX_PROBE_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_format_parse() {
        assert_eq!("json".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert_eq!("Text".parse::<ReportFormat>(), Ok(ReportFormat::Text));
        assert!("yaml".parse::<ReportFormat>().is_err());
    }
}
