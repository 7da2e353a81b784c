//! Environment-derived configuration (spec §6, §9).
//!
//! Built once at startup; every component receives it by value or by a
//! read-only handle. No component reads the environment after this point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    pub repository_url: String,
    pub tigerbeetle_directory: PathBuf,
    pub vopr_hub_address: String,
    pub issue_directory: PathBuf,
    #[serde(skip_serializing)]
    pub developer_token: String,
    pub simulator_command: String,
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            repository_url: required_env("REPOSITORY_URL")?,
            tigerbeetle_directory: PathBuf::from(required_env("TIGERBEETLE_DIRECTORY")?),
            vopr_hub_address: required_env("VOPR_HUB_ADDRESS")?,
            issue_directory: PathBuf::from(required_env("ISSUE_DIRECTORY")?),
            developer_token: required_env("DEVELOPER_TOKEN")?,
            simulator_command: std::env::var("SIMULATOR_COMMAND")
                .unwrap_or_else(|_| "simulator".to_string()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct AssignConfig {
    pub repository_url: String,
    pub tigerbeetle_directory: PathBuf,
    pub developer_token: String,
    pub num_voprs: usize,
    pub current_vopr: usize,
}

impl AssignConfig {
    pub fn from_env() -> Result<Self> {
        let num_voprs: usize = required_env("NUM_VOPRS")?
            .parse()
            .context("NUM_VOPRS must be a positive integer")?;
        let current_vopr: usize = required_env("CURRENT_VOPR")?
            .parse()
            .context("CURRENT_VOPR must be a positive integer")?;
        if num_voprs == 0 || current_vopr == 0 || current_vopr > num_voprs {
            anyhow::bail!(
                "CURRENT_VOPR ({current_vopr}) must be in 1..=NUM_VOPRS ({num_voprs})"
            );
        }
        Ok(Self {
            repository_url: required_env("REPOSITORY_URL")?,
            tigerbeetle_directory: PathBuf::from(required_env("TIGERBEETLE_DIRECTORY")?),
            developer_token: required_env("DEVELOPER_TOKEN")?,
            num_voprs,
            current_vopr,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub vopr_hub_address: String,
    pub tigerbeetle_directory: PathBuf,
    pub simulator_command: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            vopr_hub_address: required_env("VOPR_HUB_ADDRESS")?,
            tigerbeetle_directory: PathBuf::from(required_env("TIGERBEETLE_DIRECTORY")?),
            simulator_command: std::env::var("SIMULATOR_COMMAND")
                .unwrap_or_else(|_| "simulator".to_string()),
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    let value = std::env::var(key).with_context(|| format!("missing environment variable {key}"))?;
    if value.is_empty() {
        anyhow::bail!("environment variable {key} is set but empty");
    }
    Ok(value)
}
