//! Shared async client for the upstream source/issue tracker HTTP API.
//!
//! Built once and reused by the revision resolver, the issue publisher, and
//! the assignment scheduler — mirroring the teacher's single
//! `reqwest::blocking::Client`, built once in `BotsterApp::new` and reused
//! for every poll.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone)]
pub struct Tracker {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ChangeRequest {
    number: u64,
    head_branch: String,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BranchHead {
    commit_hex: String,
}

impl Tracker {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building tracker HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// List open change requests labelled "vopr", paging until `want`
    /// entries are resolved to head-of-branch commits or pages are
    /// exhausted (spec §4.4).
    pub async fn list_vopr_branches(&self, want: usize) -> Result<Vec<(u64, String)>> {
        let mut resolved = Vec::new();
        let mut page = 1u32;

        while resolved.len() < want {
            let url = format!("{}/change_requests?page={page}&label=vopr", self.base_url);
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .with_context(|| format!("requesting {url}"))?;

            if !response.status().is_success() {
                anyhow::bail!("tracker returned {} for {url}", response.status());
            }

            let requests: Vec<ChangeRequest> = response
                .json()
                .await
                .context("parsing change-request page")?;
            if requests.is_empty() {
                break;
            }

            for cr in &requests {
                if !cr.labels.iter().any(|l| l == "vopr") {
                    continue;
                }
                if let Ok(commit) = self.resolve_branch_head(&cr.head_branch).await {
                    resolved.push((cr.number, commit));
                    if resolved.len() >= want {
                        break;
                    }
                }
            }

            page += 1;
        }

        Ok(resolved)
    }

    async fn resolve_branch_head(&self, branch: &str) -> Result<String> {
        let url = format!("{}/branches/{branch}/head", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("resolving branch head for {branch}"))?;

        if !response.status().is_success() {
            anyhow::bail!("tracker returned {} resolving {branch}", response.status());
        }

        let head: BranchHead = response.json().await.context("parsing branch head")?;
        Ok(head.commit_hex)
    }

    /// Submit an issue body to the tracker (spec §4.8). Returns the
    /// response status for the caller's retry policy.
    pub async fn post_issue(&self, title: &str, body: &str) -> Result<reqwest::StatusCode> {
        let url = format!("{}/issues", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "title": title, "body": body }))
            .send()
            .await
            .with_context(|| format!("posting issue to {url}"))?;
        Ok(response.status())
    }
}
