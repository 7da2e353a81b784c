//! The assignment scheduler (spec §4.10): periodically invoked, distributes
//! git branches labelled "vopr" across worker slots round-robin. Out of
//! core — specified at its interface only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::process::Command;

use vopr_hub::config::AssignConfig;
use vopr_hub::tracker::Tracker;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vopr-assign")]
#[command(version = VERSION)]
#[command(about = "Distributes vopr-labelled git branches across worker slots")]
struct Cli {
    #[arg(long)]
    debug: bool,

    /// Base directory under which each slot gets its own subdirectory
    /// (`<base>/1`, `<base>/2`, ...).
    #[arg(long, default_value = ".")]
    slots_base: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    let config = AssignConfig::from_env().context("loading assignment-scheduler configuration")?;
    let tracker = Tracker::new(config.repository_url.clone(), config.developer_token.clone())
        .context("building tracker client")?;

    let mainline_commit = current_mainline_commit(&config.tigerbeetle_directory).await?;
    let branch_commits = tracker
        .list_vopr_branches(config.num_voprs.saturating_sub(1))
        .await
        .context("listing vopr-labelled branches")?;

    let assignments = assign_slots(config.num_voprs, &mainline_commit, &branch_commits);
    let commit = assignments
        .get(config.current_vopr - 1)
        .with_context(|| format!("no assignment computed for slot {}", config.current_vopr))?;

    let slot_dir = cli.slots_base.join(config.current_vopr.to_string());
    checkout(&slot_dir, commit).await?;
    log::info!(
        "slot {} assigned commit {commit} (checked out into {})",
        config.current_vopr,
        slot_dir.display()
    );

    Ok(())
}

/// Slot 1 always gets the current mainline commit; the remaining slots
/// round-robin over the resolved branch commits, with leftovers (when
/// `num_slots - 1` doesn't divide evenly) going to the earliest slots.
fn assign_slots(num_slots: usize, mainline_commit: &str, branches: &[(u64, String)]) -> Vec<String> {
    let mut assignments = vec![mainline_commit.to_string()];
    if branches.is_empty() {
        assignments.resize(num_slots, mainline_commit.to_string());
        return assignments;
    }
    for i in 0..num_slots.saturating_sub(1) {
        let (_, commit) = &branches[i % branches.len()];
        assignments.push(commit.clone());
    }
    assignments
}

async fn current_mainline_commit(working_directory: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "origin/main"])
        .current_dir(working_directory)
        .output()
        .await
        .context("resolving mainline commit")?;
    if !output.status.success() {
        anyhow::bail!("git rev-parse origin/main failed");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn checkout(slot_dir: &Path, commit_hex: &str) -> Result<()> {
    tokio::fs::create_dir_all(slot_dir)
        .await
        .with_context(|| format!("creating slot directory {}", slot_dir.display()))?;

    let fetch = Command::new("git")
        .args(["fetch", "--all", "--quiet"])
        .current_dir(slot_dir)
        .status()
        .await
        .context("fetching slot working copy")?;
    if !fetch.success() {
        anyhow::bail!("git fetch failed in {}", slot_dir.display());
    }

    let checkout = Command::new("git")
        .args(["checkout", "--quiet", "--force", commit_hex])
        .current_dir(slot_dir)
        .status()
        .await
        .context("checking out assigned commit")?;
    if !checkout.success() {
        anyhow::bail!("git checkout of {commit_hex} failed in {}", slot_dir.display());
    }
    Ok(())
}
