//! The processing-loop state machine (spec §4.3, §9).
//!
//! A single worker pulls items FIFO from the queue and drives each to
//! completion — `idle → early-dedup-check → resolving → replaying →
//! canonicalizing → late-dedup-check → persisting → publishing → idle` —
//! before pulling the next. Serialization is mandatory: replay is CPU- and
//! disk-heavy and shares one working copy of the source tree.

use tokio_util::sync::CancellationToken;

use crate::artifact::{Artifact, ArtifactStore, Outcome};
use crate::canonical;
use crate::dedup;
use crate::diag::{self, Category};
use crate::queue::{PendingWork, Receiver};
use crate::replay::{self, ReplayOutcome};
use crate::revision::RevisionResolver;
use crate::tracker::Tracker;
use crate::wire::BugKind;

pub struct ProcessLoopConfig {
    pub simulator_command: String,
    pub source_root: String,
}

/// Drains `queue` until it is closed or `shutdown` is triggered, in which
/// case the current item (if any) is finished before returning (spec §5).
pub async fn run(
    mut queue: Receiver,
    resolver: RevisionResolver,
    store: ArtifactStore,
    tracker: Tracker,
    config: ProcessLoopConfig,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            item = queue.recv() => {
                match item {
                    Some(item) => {
                        if process_one(&item, &resolver, &store, &tracker, &config).await.is_fatal() {
                            diag::error(
                                Category::Persistence,
                                "artifact store is unwritable; the Hub cannot continue without its append-only log",
                            );
                            std::process::exit(1);
                        }
                    }
                    None => {
                        diag::info(Category::Validation, "queue closed, processing loop exiting");
                        return;
                    }
                }
            }
            () = shutdown.cancelled() => {
                diag::info(
                    Category::Validation,
                    "shutdown requested; processing loop exiting, any queued items are lost",
                );
                return;
            }
        }
    }
}

/// Whether an item's processing step failed in a way the loop can recover
/// from (log and move to the next item) or not (spec §7: persistence
/// failures are fatal — the Hub cannot meaningfully continue without its
/// append-only log).
enum Disposition {
    Continue,
    Fatal,
}

impl Disposition {
    fn is_fatal(&self) -> bool {
        matches!(self, Disposition::Fatal)
    }
}

async fn process_one(
    item: &PendingWork,
    resolver: &RevisionResolver,
    store: &ArtifactStore,
    tracker: &Tracker,
    config: &ProcessLoopConfig,
) -> Disposition {
    let report = &item.report;
    let commit_hex = report.commit_id.to_hex();

    // idle -> early-dedup-check
    diag::debug(
        Category::Validation,
        &format!("idle -> early-dedup-check: seed={} commit={commit_hex}", report.seed),
    );
    if let Some(key) = dedup::early_key(report.kind, report.seed, &report.commit_id) {
        if store.exists(&key) {
            diag::info(
                Category::Validation,
                &format!("skip: {key} already on disk (early dedup)"),
            );
            return Disposition::Continue;
        }
    }

    // early-dedup-check -> resolving
    diag::debug(
        Category::Resolution,
        &format!("early-dedup-check -> resolving: checking out {commit_hex}"),
    );
    if let Err(e) = resolver.checkout(&report.commit_id).await {
        diag::error(
            Category::Resolution,
            &format!("checkout of {commit_hex} failed: {e}"),
        );
        return Disposition::Continue;
    }

    // resolving -> replaying
    diag::debug(
        Category::ReplayInfrastructure,
        &format!("resolving -> replaying: seed={} commit={commit_hex}", report.seed),
    );
    let replay_result = match replay::replay(
        &config.simulator_command,
        resolver.working_directory(),
        report.seed,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            diag::error(
                Category::ReplayInfrastructure,
                &format!("replay of seed={} commit={commit_hex} failed to run: {e}", report.seed),
            );
            return Disposition::Continue;
        }
    };

    // The replay outcome is preferred over the wire-reported kind on
    // disagreement (spec §4.6); everything downstream — dedup-key
    // selection, the persisted kind, the issue title — uses `effective_kind`
    // rather than `report.kind`. `UnexpectedPass` demonstrates no kind, so
    // it never substitutes.
    let effective_kind = replay_result.outcome.as_bug_kind().unwrap_or(report.kind);
    let reported_kind_mismatch = if effective_kind != report.kind {
        diag::info(
            Category::ReplaySignal,
            &format!(
                "replay outcome {:?} disagrees with reported kind {:?} for seed={}; preferring replay",
                replay_result.outcome, report.kind, report.seed
            ),
        );
        Some(report.kind)
    } else {
        None
    };

    // replaying -> canonicalizing
    diag::debug(Category::ReplaySignal, "replaying -> canonicalizing");
    let canonical_trace = canonical::canonicalize(&replay_result.combined_output, &config.source_root);

    // canonicalizing -> late-dedup-check (crash only; §4.5)
    diag::debug(Category::Validation, "canonicalizing -> late-dedup-check");
    let dedup_key = match effective_kind {
        BugKind::Crash => {
            let trace_for_key = canonical_trace.clone().unwrap_or_default();
            let key = dedup::crash_key(&report.commit_id, &trace_for_key);
            if store.exists(&key) {
                diag::info(
                    Category::Validation,
                    &format!("skip: {key} already on disk (late dedup)"),
                );
                return Disposition::Continue;
            }
            key
        }
        _ => dedup::early_key(effective_kind, report.seed, &report.commit_id)
            .expect("correctness/liveness always have an early key"),
    };

    let outcome = match replay_result.outcome {
        ReplayOutcome::UnexpectedPass => {
            diag::info(
                Category::ReplayPass,
                &format!(
                    "seed={} commit={commit_hex} passed unexpectedly under replay",
                    report.seed
                ),
            );
            Outcome::PassedUnexpectedly
        }
        _ => Outcome::Reproduced,
    };

    // late-dedup-check -> persisting
    diag::debug(Category::Persistence, &format!("late-dedup-check -> persisting: {dedup_key}"));
    let artifact = Artifact::new(
        dedup_key.clone(),
        effective_kind,
        reported_kind_mismatch,
        report.seed,
        &report.commit_id,
        canonical_trace,
        replay_result.combined_output,
        outcome,
    );

    if let Err(e) = store.put(&artifact) {
        diag::error(
            Category::Persistence,
            &format!("failed to persist artifact {dedup_key}: {e}"),
        );
        return Disposition::Fatal;
    }
    diag::info(Category::Persistence, &format!("persisted artifact {dedup_key}"));

    // persisting -> publishing
    diag::debug(Category::Publisher, &format!("persisting -> publishing: {dedup_key}"));
    crate::issue::publish(tracker, &artifact).await;

    // publishing -> idle
    diag::debug(Category::Publisher, &format!("publishing -> idle: {dedup_key}"));
    Disposition::Continue
}
