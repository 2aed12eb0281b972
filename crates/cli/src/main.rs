//! `seedlink` entrypoint and subcommand orchestration.

mod config;
mod daemon;
mod logging;
#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use channels::{ConnectorConfig, ConnectorContext, ConnectorKind, ConnectorRegistry, ConnectorRuntime, ConnectorSpec};
use clap::{Parser, Subcommand};
use proto::{OutgoingMessage, Shutdown};
use queue::{Inbox, Outbox, QueueLayout};
use serde_json::{Map, Value};
use supervisor::{ProcessLauncher, Supervisor};
use tracing::{error, info, warn};

use crate::config::Config;

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "seedlink")]
#[command(about = "Connector supervisor and filesystem message queue", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the supervisor with every configured connector
    Start,

    /// Run a single connector in the foreground (launched by the supervisor)
    Worker {
        /// Connector instance name
        #[arg(long)]
        name: String,

        /// Connector type (cli, webhook, ...)
        #[arg(long = "type")]
        kind: String,

        /// Queue root; defaults to the configured home
        #[arg(long)]
        home: Option<PathBuf>,

        /// Connector config as a JSON object
        #[arg(long, default_value = "{}")]
        config: String,
    },

    /// Drain the inbox and print one JSON message per line
    Inbox {
        /// List waiting files without consuming them
        #[arg(long, default_value_t = false)]
        peek: bool,
    },

    /// Queue a reply in a connector's outbox
    Reply {
        /// Target connector instance
        #[arg(long)]
        connector: String,

        /// Platform conversation id
        #[arg(long)]
        conversation: String,

        /// Reply text
        #[arg(long)]
        text: String,

        /// Thread to reply into
        #[arg(long)]
        thread: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Worker {
        name,
        kind,
        home,
        config,
    } = cli.command
    {
        let code = worker_main(&cli.log_level, cli.config.as_deref(), name, kind, home, config).await;
        // The CLI connector leaves a blocking stdin read behind; exit without
        // waiting for the runtime to drain it.
        std::process::exit(code);
    }

    logging::init_console(&cli.log_level);
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Start => cmd_start(config, &cli.log_level).await,
        Commands::Inbox { peek } => cmd_inbox(&config, peek),
        Commands::Reply {
            connector,
            conversation,
            text,
            thread,
        } => cmd_reply(&config, build_reply(connector, conversation, text, thread)),
        Commands::Worker { .. } => Ok(()),
    }
}

/// Starts the supervisor and blocks until SIGINT/SIGTERM.
async fn cmd_start(config: Config, log_level: &str) -> anyhow::Result<()> {
    info!(home = %config.home.display(), "Starting seedlink supervisor");
    config.validate(&ConnectorRegistry::with_builtins())?;
    if config.connectors.is_empty() {
        warn!("No connectors configured; add [[connectors]] entries to seedlink.toml");
    }
    config.layout().ensure_shared()?;

    let launcher = ProcessLauncher::current_exe(&config.home)?
        .with_global_args(["--log-level".to_string(), log_level.to_string()]);
    let mut supervisor = Supervisor::from_config(Arc::new(launcher), config.connectors.clone())?
        .with_shutdown_timeout(config.supervisor.shutdown_timeout());

    let pid_file = daemon::PidFile::new(config.pid_path());
    pid_file.write().await?;

    let result = supervisor
        .run(config.supervisor.restart_policy(), daemon::wait_for_shutdown())
        .await;
    pid_file.remove().await;

    result?;
    info!("seedlink supervisor stopped");
    Ok(())
}

/// Worker process body. Returns the process exit code.
async fn worker_main(
    log_level: &str,
    config_path: Option<&Path>,
    name: String,
    kind: String,
    home: Option<PathBuf>,
    connector_config: String,
) -> i32 {
    let home = match home {
        Some(home) => home,
        None => match Config::load(config_path) {
            Ok(config) => config.home,
            Err(e) => {
                eprintln!("seedlink worker {name}: failed to load config: {e}");
                return 1;
            }
        },
    };
    let layout = QueueLayout::new(home);

    let _log_guard = match layout
        .log_file_name(&name)
        .map_err(anyhow::Error::from)
        .and_then(|file| logging::init_worker(log_level, &layout.logs_dir(), &file))
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console(log_level);
            warn!("File logging unavailable for {name}: {e:#}");
            None
        }
    };

    match cmd_worker(layout, &name, &kind, &connector_config).await {
        Ok(()) => 0,
        Err(e) => {
            error!(connector = %name, "Worker failed: {e:#}");
            1
        }
    }
}

async fn cmd_worker(
    layout: QueueLayout,
    name: &str,
    kind: &str,
    connector_config: &str,
) -> anyhow::Result<()> {
    let kind: ConnectorKind = kind.parse()?;
    let config: Map<String, Value> =
        serde_json::from_str(connector_config).context("--config must be a JSON object")?;
    let spec = ConnectorSpec::new(name, kind, ConnectorConfig::new(config));

    let connector = ConnectorRegistry::with_builtins().build(&spec)?;
    let ctx = ConnectorContext::new(&spec, layout)?;
    let mut runtime = ConnectorRuntime::new(connector, ctx);

    let shutdown = Shutdown::new();
    daemon::trigger_on_signal(shutdown.clone());
    runtime.run(shutdown.signal()).await?;
    Ok(())
}

/// Prints every waiting inbox message as one JSON line, consuming it.
fn cmd_inbox(config: &Config, peek: bool) -> anyhow::Result<()> {
    let inbox = Inbox::new(&config.layout());
    if peek {
        for name in inbox.pending()? {
            println!("{name}");
        }
        return Ok(());
    }

    let entries = inbox.drain()?;
    for entry in &entries {
        println!("{}", serde_json::to_string(&entry.record)?);
    }
    info!("Drained {} inbox message(s)", entries.len());
    Ok(())
}

fn cmd_reply(config: &Config, reply: OutgoingMessage) -> anyhow::Result<()> {
    let layout = config.layout();
    layout.ensure_for(&reply.connector_instance)?;
    let outbox = Outbox::new(&layout, &reply.connector_instance)?;
    let path = outbox.enqueue(&reply)?;
    println!("{}", format_queued(&reply, &path));
    Ok(())
}

fn build_reply(
    connector: String,
    conversation: String,
    text: String,
    thread: Option<String>,
) -> OutgoingMessage {
    let reply = OutgoingMessage::new(connector, conversation, text);
    match thread {
        Some(thread) => reply.with_thread(thread),
        None => reply,
    }
}

fn format_queued(reply: &OutgoingMessage, path: &Path) -> String {
    format!(
        "Queued {} for {} -> {}",
        reply.id,
        reply.connector_instance,
        path.display()
    )
}
