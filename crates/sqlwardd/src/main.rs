//! sqlwardd — the sqlward daemon.
//!
//! Single binary over the sqlward crates:
//! - `serve`: load reference snapshots, keep them refreshed, and answer
//!   the control socket
//! - `execute`: run one approved ticket against its cluster
//! - `hook`: handle a schema-change tool callback
//! - `encrypt`: seal a cluster password for storage
//!
//! While `serve` runs it owns the store, and `execute`/`hook` are forwarded
//! to it over the control socket.
//!
//! # Usage
//!
//! ```text
//! sqlwardd --config /etc/sqlward/sqlward.toml serve
//! sqlwardd --config /etc/sqlward/sqlward.toml execute --ticket 3f2a...
//! SQLWARD_STATEMENT_UUID=... sqlwardd --config ... hook --on-before-cut-over
//! echo 'hunter2' | sqlwardd --config ... encrypt
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sqlward_core::SqlwardConfig;
use sqlward_core::config::LogFormat;
use sqlward_exec::{HookKind, SecretCodec};
use sqlwardd::control::Route;
use sqlwardd::{AppContext, commands, serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlwardd", about = "sqlward daemon", version)]
struct Cli {
    /// Path to sqlward.toml.
    #[arg(long, global = true, default_value = "/etc/sqlward/sqlward.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load snapshots, run the refresh loops and the control socket until Ctrl-C.
    Serve,
    /// Execute one LGTM ticket.
    Execute {
        /// Ticket UUID.
        #[arg(long)]
        ticket: String,
    },
    /// Handle a schema-change hook. The statement UUID is read from
    /// SQLWARD_STATEMENT_UUID.
    Hook(HookFlags),
    /// Encrypt a cluster password read from standard input.
    Encrypt,
}

/// Exactly one hook per invocation.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct HookFlags {
    #[arg(long)]
    on_startup: bool,
    #[arg(long)]
    on_validated: bool,
    #[arg(long)]
    on_rowcount_complete: bool,
    #[arg(long)]
    on_before_row_copy: bool,
    #[arg(long)]
    on_row_copy_complete: bool,
    #[arg(long)]
    on_begin_postponed: bool,
    #[arg(long)]
    on_before_cut_over: bool,
    #[arg(long)]
    on_interactive_command: bool,
    #[arg(long)]
    on_success: bool,
    #[arg(long)]
    on_failure: bool,
    /// Status line is read from GH_OST_STATUS.
    #[arg(long)]
    on_status: bool,
    #[arg(long)]
    on_stop_replication: bool,
    #[arg(long)]
    on_start_replication: bool,
}

impl HookFlags {
    fn kind(&self) -> Option<HookKind> {
        [
            (self.on_startup, HookKind::Startup),
            (self.on_validated, HookKind::Validated),
            (self.on_rowcount_complete, HookKind::RowcountComplete),
            (self.on_before_row_copy, HookKind::BeforeRowCopy),
            (self.on_row_copy_complete, HookKind::RowCopyComplete),
            (self.on_begin_postponed, HookKind::BeginPostponed),
            (self.on_before_cut_over, HookKind::BeforeCutOver),
            (self.on_interactive_command, HookKind::InteractiveCommand),
            (self.on_success, HookKind::Success),
            (self.on_failure, HookKind::Failure),
            (self.on_status, HookKind::Status),
            (self.on_stop_replication, HookKind::StopReplication),
            (self.on_start_replication, HookKind::StartReplication),
        ]
        .into_iter()
        .find_map(|(set, kind)| set.then_some(kind))
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlward=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = SqlwardConfig::load(&cli.config)?;
    init_tracing(config.logging.format);

    match cli.command {
        Command::Serve => serve::run_serve(AppContext::build(config)?).await,
        Command::Execute { ticket } => commands::execute(Route::open(config)?, &ticket).await,
        Command::Hook(flags) => {
            let Some(kind) = flags.kind() else {
                anyhow::bail!("no hook flag given");
            };
            commands::hook(Route::open(config)?, kind).await
        }
        Command::Encrypt => {
            let codec = SecretCodec::new(&config.secrets.cipher_key)?;
            let sealed = commands::encrypt(&codec, std::io::stdin().lock())?;
            println!("{sealed}");
            Ok(())
        }
    }
}
