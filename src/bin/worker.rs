//! The worker runner (spec §4.9): a thin driver around the simulator child
//! process and a TCP client to the Hub. Out of core — no queueing, no
//! retries, no persistence. A failed send is logged and the worker moves
//! on to the next seed.

use std::process::Stdio;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;

use vopr_hub::config::WorkerConfig;
use vopr_hub::wire::{self, BugKind, CommitId};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vopr-worker")]
#[command(version = VERSION)]
#[command(about = "Runs the simulator against random seeds and reports failures to the Hub")]
struct Cli {
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    log::info!("vopr-worker v{VERSION} starting against {}", config.vopr_hub_address);

    loop {
        let seed: u64 = rand::rng().random();
        if let Err(e) = run_one_seed(&config, seed).await {
            log::error!("seed {seed} failed to process: {e}");
        }
    }
}

async fn run_one_seed(config: &WorkerConfig, seed: u64) -> Result<()> {
    let fast_status = run_simulator(config, seed, false).await?;
    if fast_status == 0 {
        return Ok(());
    }

    let diagnostic_status = run_simulator(config, seed, true).await?;
    // spec §4.9: the worker asserts the diagnostic-mode replay reproduces
    // the same exit code the fast-mode run hit, "else fatal" — this is
    // distinct from a failed send (logged, worker moves on to the next
    // seed) and must actually stop the worker process.
    if diagnostic_status != fast_status {
        panic!(
            "non-deterministic replay: fast exit {fast_status} but diagnostic exit {diagnostic_status} for seed {seed}"
        );
    }

    let kind = exit_code_to_kind(diagnostic_status)
        .with_context(|| format!("unrecognized simulator exit code {diagnostic_status}"))?;
    let commit_hex = current_revision(&config.tigerbeetle_directory).await?;
    let commit_id =
        CommitId::from_hex(&commit_hex).with_context(|| format!("malformed commit id {commit_hex}"))?;

    send_report(&config.vopr_hub_address, kind, seed, &commit_id).await
}

async fn run_simulator(config: &WorkerConfig, seed: u64, diagnostic: bool) -> Result<i32> {
    let mut command = Command::new(&config.simulator_command);
    if diagnostic {
        command.arg("--diagnostic");
    }
    command
        .arg(seed.to_string())
        .current_dir(&config.tigerbeetle_directory)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = command
        .status()
        .await
        .context("spawning simulator child process")?;
    Ok(status.code().unwrap_or(-1))
}

fn exit_code_to_kind(code: i32) -> Option<BugKind> {
    match code {
        127 => Some(BugKind::Crash),
        128 => Some(BugKind::Liveness),
        129 => Some(BugKind::Correctness),
        _ => None,
    }
}

async fn current_revision(working_directory: &std::path::Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(working_directory)
        .output()
        .await
        .context("reading current git revision")?;
    if !output.status.success() {
        anyhow::bail!("git rev-parse HEAD failed");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn send_report(address: &str, kind: BugKind, seed: u64, commit_id: &CommitId) -> Result<()> {
    let wire_bytes = wire::encode(kind, seed, commit_id);
    let mut stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("connecting to Hub at {address}"))?;
    stream
        .write_all(&wire_bytes)
        .await
        .context("sending bug report")?;
    log::info!("reported {kind} seed={seed} commit={commit_id}");
    Ok(())
}
