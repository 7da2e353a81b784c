//! The Hub binary: wires ingress, the processing loop, and the ambient
//! services together and drives them to a clean shutdown on signal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use vopr_hub::config::HubConfig;
use vopr_hub::process_loop::{self, ProcessLoopConfig};
use vopr_hub::queue;
use vopr_hub::revision::RevisionResolver;
use vopr_hub::tracker::Tracker;
use vopr_hub::{artifact::ArtifactStore, server};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vopr-hub")]
#[command(version = VERSION)]
#[command(about = "Distributed fuzzing coordinator for a deterministic simulation tester")]
struct Cli {
    /// Raise the log level to debug regardless of RUST_LOG.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved configuration (secrets redacted) and exit.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    let config = HubConfig::from_env().context("loading Hub configuration")?;

    if let Some(Command::Config) = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    log::info!("vopr-hub v{VERSION} starting, listening on {}", config.vopr_hub_address);

    let (tx, rx) = queue::channel(queue::DEFAULT_QUEUE_CAPACITY);
    let resolver = RevisionResolver::new(config.tigerbeetle_directory.clone());
    let store = ArtifactStore::new(config.issue_directory.clone());
    let tracker = Tracker::new(config.repository_url.clone(), config.developer_token.clone())
        .context("building tracker client")?;
    let loop_config = ProcessLoopConfig {
        simulator_command: config.simulator_command.clone(),
        source_root: config
            .tigerbeetle_directory
            .to_string_lossy()
            .into_owned(),
    };

    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let server_address = config.vopr_hub_address.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server::serve(&server_address, tx, server_shutdown).await {
            log::error!("ingress listener exited with an error: {e}");
        }
    });

    let loop_shutdown = shutdown.clone();
    let loop_task = tokio::spawn(async move {
        process_loop::run(rx, resolver, store, tracker, loop_config, loop_shutdown).await;
    });

    wait_for_shutdown_signal().await;
    log::info!("shutdown signal received, draining in-flight work");
    shutdown.cancel();

    let _ = server_task.await;
    let _ = loop_task.await;

    log::info!("vopr-hub exiting");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
