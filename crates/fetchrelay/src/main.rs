use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;
use tracing::{error, info};

use fetchrelay::app::{self, ReportFormat};
use fetchrelay::config::Overrides;
use fetchrelay::engine::Getmail;
use fetchrelay::error::FetchRelayError;
use fetchrelay::probe::NetworkProbe;
use fetchrelay::shutdown::Shutdown;
use fetchrelay::sysexits::{Sysexit, EX_OK, EX_SOFTWARE};
use fetchrelay::telemetry::{self, LogFormat};

/// Fetch mail from external POP3/IMAP accounts and relay it to the local
/// mail server.
///
/// Configuration comes from the environment (FETCH_INTERVAL,
/// DELETE_AFTER_DAYS, LMTP_HOST, LMTP_PORT, DRY_DELIVER, SUCCESS_HOOK_URL,
/// ...); the options below override it where they overlap.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Args {
    /// Only log in to every account and report what is waiting, then exit.
    ///
    /// Nothing is fetched, relayed or written to disk.
    #[structopt(long)]
    dry_run: bool,

    /// Account list, one `user:"password":host:target` per line
    /// [default: $ACCOUNTS_FILE or /app/accounts.list]
    #[structopt(long, parse(from_os_str))]
    accounts: Option<PathBuf>,

    /// Seconds between fetch cycles [default: $FETCH_INTERVAL or 300]
    #[structopt(long, allow_hyphen_values = true)]
    interval: Option<i64>,

    /// Directory holding per-account fetch state
    /// [default: $GETMAIL_DIR or ~/.getmail]
    #[structopt(long, parse(from_os_str))]
    state_dir: Option<PathBuf>,

    /// Dry-run report format: text or json
    #[structopt(long, default_value = "text")]
    format: ReportFormat,
}

fn main() {
    let args = Args::from_args();

    if let Err(e) = telemetry::init_logging(LogFormat::from_env()) {
        eprintln!("fetchrelay: {}", e);
        EX_SOFTWARE.exit();
    }

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    code.exit()
}

fn run(args: Args) -> Result<Sysexit, FetchRelayError> {
    let overrides = Overrides {
        accounts_file: args.accounts,
        interval: args.interval,
        state_dir: args.state_dir,
    };
    let (settings, accounts) = app::load(&overrides)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if args.dry_run {
        let probe = NetworkProbe::default();
        return Ok(runtime.block_on(app::dry_run(&settings, &accounts, &probe, args.format)));
    }

    let shutdown = Shutdown::new();
    shutdown.install()?;

    let engine = Arc::new(Getmail::new(settings.getmail_bin.clone()));
    let mut scheduler = app::build_scheduler(&settings, accounts, engine, shutdown)?;

    runtime.block_on(scheduler.run());
    info!("Shut down cleanly");
    Ok(EX_OK)
}
