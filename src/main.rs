/*!
 * devtel CLI - Command Line Interface
 *
 * `devtel track` is meant to be registered as a hook command: it reads the
 * hook from the environment, records it and flushes the backlog. It always
 * exits 0 so that telemetry can never break the host command.
 */

use clap::{Parser, Subcommand, ValueEnum};
use devtel::{
    cli_style::{self, print_error, print_info, print_success, print_warning, records_table, stats_table},
    config::{DevtelConfig, LogLevel},
    error::{Result, EXIT_SUCCESS},
    http_sink, logging, open_store, open_tracking_store, EventTracker, HookEvent, StoredRecord,
};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "devtel")]
#[command(version, about = "Lifecycle hook telemetry for dev environments", long_about = None)]
struct Cli {
    /// Path to config file (overrides default location)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the record log
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Telemetry endpoint base URL
    #[arg(long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    /// Log level for diagnostic output
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the hook described by DEVSPACE_PLUGIN_* variables, then flush
    Track {
        /// Record only; leave delivery to a later flush
        #[arg(long)]
        no_flush: bool,
    },

    /// Deliver every unprocessed record to the endpoint
    Flush {
        /// Print the backlog as JSON lines instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the latest record of every key
    Status {
        /// Only show records not yet delivered
        #[arg(long)]
        pending: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            print_error(&e.to_string(), e.suggestion());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        use clap::CommandFactory;
        use clap_complete::generate;
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "devtel", &mut std::io::stdout());
        return Ok(());
    }

    let is_track = matches!(cli.command, Commands::Track { .. });

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        // Hooks must not fail because of a broken telemetry setup
        Err(_) if is_track => return Ok(()),
        Err(e) => return Err(e),
    };

    if let Err(e) = logging::init_logging(&config) {
        if !is_track {
            print_warning(&format!("Logging disabled: {}", e));
        }
    }

    match cli.command {
        Commands::Track { no_flush } => {
            if let Err(e) = handle_track(&config, no_flush) {
                warn!("Telemetry failed: {}", e);
            }
            Ok(())
        }
        Commands::Flush { dry_run } => handle_flush(&config, dry_run),
        Commands::Status { pending } => handle_status(&config, pending),
        Commands::Completions { .. } => Ok(()),
    }
}

/// Config file, then `DEVTEL_*` variables, then command-line flags
fn resolve_config(cli: &Cli) -> Result<DevtelConfig> {
    let mut config = DevtelConfig::load(cli.config.as_deref())?;

    if let Some(ref dir) = cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    Ok(config)
}

fn handle_track(config: &DevtelConfig, no_flush: bool) -> Result<()> {
    let event = HookEvent::from_env();
    if event.hook.is_empty() {
        debug!("No hook in the environment, nothing to track");
        return Ok(());
    }

    let store = open_tracking_store(config)?;
    let mut tracker = EventTracker::new(store, http_sink(config)?);

    if no_flush {
        let outcome = tracker.track(event)?;
        debug!(key = %outcome.key, paired = outcome.is_paired(), "Hook recorded");
        return Ok(());
    }

    let (tracked, flushed) = tracker.track_and_flush(event);
    if let Ok(outcome) = tracked {
        debug!(key = %outcome.key, paired = outcome.is_paired(), "Hook recorded");
    }
    flushed.map(|_| ())
}

fn handle_flush(config: &DevtelConfig, dry_run: bool) -> Result<()> {
    let store = open_store(config)?;

    if dry_run {
        let backlog: Vec<StoredRecord> = store.unprocessed().collect();
        for record in &backlog {
            println!("{}", serde_json::to_string(&record.data)?);
        }
        print_info(&format!("{} records pending (dry run, nothing sent)", backlog.len()));
        return Ok(());
    }

    let mut tracker = EventTracker::new(store, http_sink(config)?);
    let report = tracker.flush()?;

    if report.pending > 0 {
        print_warning(&format!(
            "No endpoint configured, {} records kept for a later flush",
            report.pending
        ));
    } else if report.delivered == 0 {
        print_info("Nothing to deliver");
    } else {
        print_success(&format!("Delivered {} records", report.delivered));
    }
    Ok(())
}

fn handle_status(config: &DevtelConfig, pending_only: bool) -> Result<()> {
    let store = open_store(config)?;

    let records: Vec<StoredRecord> = if pending_only {
        store.unprocessed().collect()
    } else {
        store.all().collect()
    };
    let pending = store.unprocessed().len();

    let active = store
        .active_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let endpoint = config
        .endpoint
        .clone()
        .filter(|_| config.delivery_enabled())
        .unwrap_or_else(|| "(disabled)".to_string());

    println!(
        "{}",
        stats_table(&[
            ("Log directory", store.log_dir().display().to_string()),
            ("Active file", active),
            ("Keys", store.len().to_string()),
            ("Entries", store.entry_count().to_string()),
            ("Pending", pending.to_string()),
            ("Endpoint", endpoint),
        ])
    );

    if records.is_empty() {
        println!("{}", cli_style::Theme::muted("No records"));
    } else {
        println!("{}", records_table(&records));
    }
    Ok(())
}
