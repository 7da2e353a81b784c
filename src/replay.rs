//! Replay executor (spec §4.6).
//!
//! Spawns the simulator child process and captures its combined output.
//! Adapted from the teacher's `Agent::spawn` (`botster_hub_rs/src/agent.rs`):
//! the teacher opens a PTY and parses a VT100 stream because its child is an
//! interactive terminal application; the simulator is a non-interactive
//! batch process, so here `tokio::process::Command` with piped stdout/stderr
//! plays the same role a PTY played for the teacher, and a pair of reader
//! tasks tee the streams into an in-memory buffer exactly as the teacher's
//! reader thread fed its VT100 parser.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::wire::BugKind;

/// What the replay actually did, independent of what the wire report
/// claimed (spec §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    UnexpectedPass,
    Crash,
    Liveness,
    Correctness,
}

impl ReplayOutcome {
    fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ReplayOutcome::UnexpectedPass),
            127 => Some(ReplayOutcome::Crash),
            128 => Some(ReplayOutcome::Liveness),
            129 => Some(ReplayOutcome::Correctness),
            _ => None,
        }
    }

    pub fn matches_reported_kind(self, reported: BugKind) -> bool {
        matches!(
            (self, reported),
            (ReplayOutcome::Crash, BugKind::Crash)
                | (ReplayOutcome::Liveness, BugKind::Liveness)
                | (ReplayOutcome::Correctness, BugKind::Correctness)
        )
    }

    /// The bug kind the replay itself demonstrated, if any. `UnexpectedPass`
    /// demonstrates no kind (spec §4.6 treats it as a separate outcome, not a
    /// disagreement over which kind occurred).
    pub fn as_bug_kind(self) -> Option<BugKind> {
        match self {
            ReplayOutcome::Crash => Some(BugKind::Crash),
            ReplayOutcome::Liveness => Some(BugKind::Liveness),
            ReplayOutcome::Correctness => Some(BugKind::Correctness),
            ReplayOutcome::UnexpectedPass => None,
        }
    }
}

pub struct ReplayResult {
    pub outcome: ReplayOutcome,
    pub combined_output: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to spawn simulator: {0}")]
    Spawn(String),
    #[error("simulator exited with unrecognized code {0}")]
    FatalExitCode(i32),
    #[error("simulator terminated by signal")]
    Signaled,
}

/// Runs `simulator_command --diagnostic <seed>` in `working_directory`,
/// streaming stdout and stderr into one buffer (spec §4.6, §9: "do not rely
/// on line buffering — capture bytes and postprocess").
pub async fn replay(
    simulator_command: &str,
    working_directory: &Path,
    seed: u64,
) -> Result<ReplayResult, ReplayError> {
    let mut child = Command::new(simulator_command)
        .arg("--diagnostic")
        .arg(seed.to_string())
        .current_dir(working_directory)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ReplayError::Spawn(e.to_string()))?;

    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let status = child
        .wait()
        .await
        .map_err(|e| ReplayError::Spawn(e.to_string()))?;

    let mut combined = stdout_task.await.unwrap_or_default();
    combined.extend(stderr_task.await.unwrap_or_default());
    let combined_output = String::from_utf8_lossy(&combined).into_owned();

    // Also mirror into the Hub's own diagnostic sink (spec §4.6).
    log::debug!("captured {} bytes of simulator output", combined.len());

    let code = status.code().ok_or(ReplayError::Signaled)?;
    let outcome = ReplayOutcome::from_exit_code(code).ok_or(ReplayError::FatalExitCode(code))?;

    Ok(ReplayResult {
        outcome,
        combined_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping_matches_spec() {
        assert_eq!(
            ReplayOutcome::from_exit_code(0),
            Some(ReplayOutcome::UnexpectedPass)
        );
        assert_eq!(ReplayOutcome::from_exit_code(127), Some(ReplayOutcome::Crash));
        assert_eq!(
            ReplayOutcome::from_exit_code(128),
            Some(ReplayOutcome::Liveness)
        );
        assert_eq!(
            ReplayOutcome::from_exit_code(129),
            Some(ReplayOutcome::Correctness)
        );
        assert_eq!(ReplayOutcome::from_exit_code(1), None);
    }

    #[test]
    fn outcome_kind_matching() {
        assert!(ReplayOutcome::Crash.matches_reported_kind(BugKind::Crash));
        assert!(!ReplayOutcome::Crash.matches_reported_kind(BugKind::Liveness));
    }

    #[test]
    fn as_bug_kind_mirrors_the_demonstrated_failure() {
        assert_eq!(ReplayOutcome::Crash.as_bug_kind(), Some(BugKind::Crash));
        assert_eq!(ReplayOutcome::Liveness.as_bug_kind(), Some(BugKind::Liveness));
        assert_eq!(ReplayOutcome::Correctness.as_bug_kind(), Some(BugKind::Correctness));
        assert_eq!(ReplayOutcome::UnexpectedPass.as_bug_kind(), None);
    }

    #[tokio::test]
    async fn replay_captures_combined_output_and_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        // `sh` acts as a stand-in "simulator" binary for this unit test.
        let result = replay("sh", dir.path(), 1).await;
        // Our fake command is `sh --diagnostic 1`, which sh will reject as
        // an unknown option and exit non-zero, outside {0,127,128,129}.
        assert!(matches!(result, Err(ReplayError::FatalExitCode(_))));
    }
}
