//! Revision resolver (spec §4.4).
//!
//! Materializes a specific source revision in the Hub's working directory.
//! Follows the teacher's `WorktreeManager` precedent of using `git2` for
//! read-only introspection and shelling out to the `git` binary for the
//! operations its own comments say "git2's API doesn't handle properly"
//! (branch/worktree manipulation).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

use crate::wire::CommitId;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("fetch from origin failed: {0}")]
    FetchFailed(String),
    #[error("checkout of {commit} failed: {reason}")]
    CheckoutFailed { commit: String, reason: String },
    #[error("HEAD does not match requested commit {commit} after checkout")]
    VerificationFailed { commit: String },
}

pub struct RevisionResolver {
    working_directory: PathBuf,
}

impl RevisionResolver {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// After `Ok(())`, the working directory's HEAD equals `commit_id`.
    pub async fn checkout(&self, commit_id: &CommitId) -> Result<(), ResolveError> {
        let commit_hex = commit_id.to_hex();

        let fetch = Command::new("git")
            .args(["fetch", "--all", "--quiet"])
            .current_dir(&self.working_directory)
            .output()
            .await
            .map_err(|e| ResolveError::FetchFailed(e.to_string()))?;
        if !fetch.status.success() {
            return Err(ResolveError::FetchFailed(
                String::from_utf8_lossy(&fetch.stderr).into_owned(),
            ));
        }

        let checkout = Command::new("git")
            .args(["checkout", "--quiet", "--force", &commit_hex])
            .current_dir(&self.working_directory)
            .output()
            .await
            .map_err(|e| ResolveError::CheckoutFailed {
                commit: commit_hex.clone(),
                reason: e.to_string(),
            })?;
        if !checkout.status.success() {
            return Err(ResolveError::CheckoutFailed {
                commit: commit_hex.clone(),
                reason: String::from_utf8_lossy(&checkout.stderr).into_owned(),
            });
        }

        self.verify_head(&commit_hex)
    }

    /// Read-only confirmation that HEAD landed where `checkout` asked it to.
    /// Uses `git2` rather than shelling out again, matching the teacher's
    /// split: `git2` for introspection, the `git` binary for the mutations
    /// its API "doesn't handle properly."
    fn verify_head(&self, expected_commit_hex: &str) -> Result<(), ResolveError> {
        let fail = || ResolveError::VerificationFailed {
            commit: expected_commit_hex.to_string(),
        };

        let repo = git2::Repository::open(&self.working_directory).map_err(|_| fail())?;
        let head_commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|_| fail())?;

        if head_commit.id().to_string() != expected_commit_hex {
            return Err(fail());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as SyncCommand;
    use tempfile::TempDir;

    fn init_repo_with_one_commit() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = SyncCommand::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .unwrap();
            assert!(status.success());
        };
        run(&["init", "--quiet"]);
        run(&["config", "user.email", "test@example.invalid"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        run(&["add", "a.txt"]);
        run(&["commit", "--quiet", "-m", "initial"]);

        let output = SyncCommand::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        let commit_hex = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (dir, commit_hex)
    }

    #[tokio::test]
    async fn checkout_of_existing_commit_succeeds() {
        let (dir, commit_hex) = init_repo_with_one_commit();
        let resolver = RevisionResolver::new(dir.path());
        let commit_id = CommitId::from_hex(&commit_hex).unwrap();

        resolver.checkout(&commit_id).await.unwrap();
    }

    #[tokio::test]
    async fn checkout_of_unknown_commit_fails() {
        let (dir, _) = init_repo_with_one_commit();
        let resolver = RevisionResolver::new(dir.path());
        let bogus = CommitId::from_hex("ffffffffffffffffffffffffffffffffffffffff").unwrap();

        assert!(resolver.checkout(&bogus).await.is_err());
    }
}
