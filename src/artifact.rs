//! Artifact store (spec §4.7, §8 I3).
//!
//! A flat directory keyed by dedup key. `put` writes atomically
//! (write-to-temp, rename) so `exists` never observes a half-written
//! artifact; the store never deletes or overwrites an entry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{BugKind, CommitId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Reproduced,
    PassedUnexpectedly,
}

/// The persisted record of a processed report (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub dedup_key: String,
    pub kind: PersistedKind,
    /// The kind the wire report originally claimed, present only when the
    /// replay outcome disagreed and `kind` was substituted for it (spec
    /// §4.6: "the replay outcome is preferred; mismatch is noted in the
    /// artifact").
    pub reported_kind: Option<PersistedKind>,
    pub seed: u64,
    pub commit_hex: String,
    pub canonical_trace: Option<String>,
    pub diagnostic_log: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: Outcome,
}

/// `BugKind` doesn't derive `Serialize`/`Deserialize` itself (it is a
/// wire-protocol type); this mirrors it for the on-disk record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedKind {
    Correctness,
    Liveness,
    Crash,
}

impl From<BugKind> for PersistedKind {
    fn from(k: BugKind) -> Self {
        match k {
            BugKind::Correctness => PersistedKind::Correctness,
            BugKind::Liveness => PersistedKind::Liveness,
            BugKind::Crash => PersistedKind::Crash,
        }
    }
}

impl Artifact {
    /// `reported_kind` is the wire report's original kind, passed only when
    /// it differs from `kind` (the processing loop has already substituted
    /// the replay-determined kind into `kind` per spec §4.6).
    pub fn new(
        dedup_key: String,
        kind: BugKind,
        reported_kind: Option<BugKind>,
        seed: u64,
        commit_id: &CommitId,
        canonical_trace: Option<String>,
        diagnostic_log: String,
        outcome: Outcome,
    ) -> Self {
        Self {
            dedup_key,
            kind: kind.into(),
            reported_kind: reported_kind.map(Into::into),
            seed,
            commit_hex: commit_id.to_hex(),
            canonical_trace,
            diagnostic_log,
            timestamp: Utc::now(),
            outcome,
        }
    }

    /// The human-readable issue body (spec §4.8), also used as the
    /// on-disk file contents (spec §6's "Persisted state layout").
    pub fn render_issue_body(&self) -> String {
        let mut body = String::new();
        body.push_str(&format!("kind: {:?}\n", self.kind));
        body.push_str(&format!("seed: {}\n", self.seed));
        body.push_str(&format!("commit: {}\n", self.commit_hex));
        body.push_str(&format!("timestamp: {}\n", self.timestamp.to_rfc3339()));
        if let Some(reported) = self.reported_kind {
            body.push_str(&format!(
                "note: wire report claimed {reported:?}, replay demonstrated {:?}; replay outcome preferred\n",
                self.kind
            ));
        }
        if self.outcome == Outcome::PassedUnexpectedly {
            body.push_str("note: replay passed unexpectedly\n");
        }
        body.push_str("\n--- canonical trace ---\n");
        match &self.canonical_trace {
            Some(trace) => body.push_str(trace),
            None => body.push_str("(no trace)"),
        }
        body.push_str("\n\n--- diagnostic log ---\n");
        body.push_str(&self.diagnostic_log);
        body
    }
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, dedup_key: &str) -> PathBuf {
        self.root.join(dedup_key)
    }

    pub fn exists(&self, dedup_key: &str) -> bool {
        self.path_for(dedup_key).exists()
    }

    /// Write the artifact's issue body atomically: write to a sibling temp
    /// file, then rename into place. Never overwrites an existing entry.
    pub fn put(&self, artifact: &Artifact) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating artifact root {}", self.root.display()))?;

        let final_path = self.path_for(&artifact.dedup_key);
        if final_path.exists() {
            anyhow::bail!("artifact {} already exists", artifact.dedup_key);
        }

        let tmp_path = tmp_path_for(&self.root, &artifact.dedup_key);
        std::fs::write(&tmp_path, artifact.render_issue_body())
            .with_context(|| format!("writing temp artifact {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming artifact into place at {}", final_path.display()))?;
        Ok(())
    }
}

fn tmp_path_for(root: &Path, dedup_key: &str) -> PathBuf {
    root.join(format!(".{}.{}.tmp", dedup_key, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_artifact(key: &str) -> Artifact {
        let commit = CommitId::from_hex("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap();
        Artifact::new(
            key.to_string(),
            BugKind::Correctness,
            None,
            42,
            &commit,
            None,
            "log output".to_string(),
            Outcome::Reproduced,
        )
    }

    #[test]
    fn mismatch_note_appears_only_when_reported_kind_is_set() {
        let commit = CommitId::from_hex("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap();
        let matching = Artifact::new(
            "3_0a0b_trace".to_string(),
            BugKind::Crash,
            None,
            1,
            &commit,
            None,
            "log".to_string(),
            Outcome::Reproduced,
        );
        assert!(!matching.render_issue_body().contains("wire report claimed"));

        let mismatched = Artifact::new(
            "3_0a0b_trace".to_string(),
            BugKind::Crash,
            Some(BugKind::Correctness),
            1,
            &commit,
            None,
            "log".to_string(),
            Outcome::Reproduced,
        );
        let body = mismatched.render_issue_body();
        assert!(body.contains("wire report claimed Correctness, replay demonstrated Crash"));
    }

    #[test]
    fn put_then_exists() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = sample_artifact("1_42_0a0b");

        assert!(!store.exists(&artifact.dedup_key));
        store.put(&artifact).unwrap();
        assert!(store.exists(&artifact.dedup_key));
    }

    #[test]
    fn put_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = sample_artifact("1_42_0a0b");

        store.put(&artifact).unwrap();
        assert!(store.put(&artifact).is_err());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.put(&sample_artifact("1_42_0a0b")).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["1_42_0a0b"]);
    }
}
