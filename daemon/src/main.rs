//! Tally, a command-line client for a ledger-backed election.

mod render;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tally_client::{aggregate, ActionResult, ClientConfig, IdentityBinding, SyncOrchestrator};
use tally_gateway::{EventFeed, ReconnectPolicy, RpcLedgerClient};
use tally_types::{CandidateId, ElectionAction, Identity};
use tally_utils::LogFormat;

use crate::shutdown::ShutdownController;

#[derive(Parser)]
#[command(name = "tally", about = "Watch and take part in a ledger-backed election")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the ledger.
    #[arg(long, env = "TALLY_LEDGER_URL")]
    ledger_url: Option<String>,

    /// WebSocket endpoint for change notifications.
    #[arg(long, env = "TALLY_EVENTS_URL")]
    events_url: Option<String>,

    /// Account to act as (0x + 40 hex digits).
    #[arg(long, env = "TALLY_IDENTITY")]
    identity: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TALLY_LOG_FORMAT")]
    log_format: Option<String>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Sync once and print the results.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Follow the election live until interrupted.
    Watch {
        #[arg(long)]
        json: bool,
    },
    /// Cast a vote for a candidate id.
    Vote { candidate: u64 },
    /// Open voting (administrator only).
    Start,
    /// Close voting (administrator only).
    End,
    /// Register a candidate before voting opens (administrator only).
    AddCandidate { name: String },
}

/// File settings as the base, CLI flags and env vars on top.
fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let base = match &cli.config {
        Some(path) => ClientConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    Ok(ClientConfig {
        ledger_url: cli.ledger_url.clone().unwrap_or(base.ledger_url),
        events_url: cli.events_url.clone().or(base.events_url),
        identity: cli.identity.clone().or(base.identity),
        log_level: cli.log_level.clone().unwrap_or(base.log_level),
        log_format: cli.log_format.clone().unwrap_or(base.log_format),
        ..base
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format: LogFormat = config.log_format.parse().map_err(anyhow::Error::msg)?;
    tally_utils::init_tracing_with(&config.log_level, format);

    let identity = config
        .identity
        .as_deref()
        .map(Identity::parse)
        .transpose()
        .context("invalid identity")?;

    let client = RpcLedgerClient::with_timeout(
        config.ledger_url.clone(),
        config.call_timeout(),
        config.notification_capacity,
    )?;
    let notifier = client.notifier();
    let orchestrator = Arc::new(SyncOrchestrator::from_config(
        Arc::new(client),
        IdentityBinding::new(identity),
        &config,
    ));

    tracing::info!(ledger = %config.ledger_url, "connecting to election ledger");
    let snapshot = orchestrator.start().await.context("initial sync failed")?;

    let action = match cli.command {
        Command::Status { json } => {
            let summary = aggregate::summarize(&snapshot);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", render::summary(&summary));
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::Watch { json } => {
            let Some(events_url) = config.events_url.clone() else {
                anyhow::bail!("watch needs an events endpoint (--events-url or events_url in config)");
            };
            watch(orchestrator, notifier, events_url, json).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Vote { candidate } => ElectionAction::CastVote(CandidateId::new(candidate)?),
        Command::Start => ElectionAction::StartElection,
        Command::End => ElectionAction::EndElection,
        Command::AddCandidate { name } => ElectionAction::AddCandidate(name),
    };

    let result = orchestrator.issue_action(action).await;
    println!("{}", render::action(&result));
    print!("{}", render::summary(&aggregate::summarize(&orchestrator.snapshot())));

    Ok(match result {
        ActionResult::AdmittedAndConfirmed => ExitCode::SUCCESS,
        // The refreshed state above is the answer; the caller must look at it.
        ActionResult::Indeterminate => ExitCode::from(3),
        _ => ExitCode::from(2),
    })
}

async fn watch(
    orchestrator: Arc<SyncOrchestrator<RpcLedgerClient>>,
    notifier: tokio::sync::broadcast::Sender<tally_gateway::LedgerNotification>,
    events_url: String,
    json: bool,
) -> anyhow::Result<()> {
    let shutdown = Arc::new(ShutdownController::new());
    let mut feed = EventFeed::start(events_url, notifier, ReconnectPolicy::default());
    let listener = orchestrator.spawn_listener(shutdown.subscribe());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown.wait_for_signal().await });
    }

    let mut snapshots = orchestrator.subscribe_snapshots();
    let mut stop = shutdown.subscribe();
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let summary = aggregate::summarize(&snapshot);
        if json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            print!("{}", render::summary(&summary));
            println!("{}", render::sync_status(&orchestrator.status().await));
            println!();
        }

        tokio::select! {
            _ = stop.recv() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    feed.stop().await;
    let _ = listener.await;
    tracing::info!("tally watch exited cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(
            &path,
            "ledger_url = \"http://file:8545\"\nidentity = \"0x1111111111111111111111111111111111111111\"\nmax_attempts = 7\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "tally",
            "--config",
            path.to_str().unwrap(),
            "--ledger-url",
            "http://flag:8545",
            "status",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.ledger_url, "http://flag:8545");
        assert_eq!(
            config.identity.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
        assert_eq!(config.max_attempts, 7);
    }

    #[test]
    fn parses_action_subcommands() {
        let cli = Cli::parse_from(["tally", "vote", "2"]);
        assert!(matches!(cli.command, Command::Vote { candidate: 2 }));
        let cli = Cli::parse_from(["tally", "add-candidate", "Carol"]);
        assert!(matches!(cli.command, Command::AddCandidate { ref name } if name == "Carol"));
    }
}
