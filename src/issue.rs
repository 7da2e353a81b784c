//! Issue publisher (spec §4.8).
//!
//! Formats and submits an issue to the upstream tracker, retrying
//! transient failures with exponential backoff before giving up and
//! leaving the artifact on disk for manual filing.

use std::time::Duration;

use crate::artifact::Artifact;
use crate::diag::{self, Category};
use crate::tracker::Tracker;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Submit `artifact` as an issue, retrying with exponential backoff. Never
/// returns an error: publisher failures are logged and the processing loop
/// proceeds regardless (spec §4.3 step 6, §7).
pub async fn publish(tracker: &Tracker, artifact: &Artifact) -> bool {
    let title = format!(
        "[{:?}] seed={} commit={}",
        artifact.kind, artifact.seed, artifact.commit_hex
    );
    let body = artifact.render_issue_body();

    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        match tracker.post_issue(&title, &body).await {
            Ok(status) if status.is_success() => {
                diag::info(
                    Category::Publisher,
                    &format!("issue filed for {} on attempt {attempt}", artifact.dedup_key),
                );
                return true;
            }
            Ok(status) => {
                diag::error(
                    Category::Publisher,
                    &format!(
                        "tracker rejected issue for {} with status {status} (attempt {attempt})",
                        artifact.dedup_key
                    ),
                );
            }
            Err(e) => {
                diag::error(
                    Category::Publisher,
                    &format!(
                        "posting issue for {} failed: {e} (attempt {attempt})",
                        artifact.dedup_key
                    ),
                );
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    diag::error(
        Category::Publisher,
        &format!(
            "giving up on issue for {} after {MAX_ATTEMPTS} attempts; artifact remains on disk",
            artifact.dedup_key
        ),
    );
    false
}
