//! Dedup-key policy (spec §4.5, §8 I2).
//!
//! Correctness and liveness keys are derivable from wire data alone and can
//! be checked before replay ("early dedup", spec §4.3 step 1). Crash keys
//! need the canonical trace hash and can only be computed after replay
//! ("late dedup", spec §4.3 step 5).

use sha2::{Digest, Sha256};

use crate::wire::{BugKind, CommitId};

/// Filesystem-safe key such that two reports are duplicates iff their keys
/// are byte-equal (GLOSSARY).
pub fn early_key(kind: BugKind, seed: u64, commit_id: &CommitId) -> Option<String> {
    match kind {
        BugKind::Correctness | BugKind::Liveness => {
            Some(format!("{}_{}_{}", kind.key_prefix(), seed, commit_id.to_hex()))
        }
        BugKind::Crash => None,
    }
}

/// Hex-render a SHA-256 digest of the canonical trace, for use in the crash
/// dedup key.
pub fn trace_hash_hex(canonical_trace: &str) -> String {
    hex::encode(Sha256::digest(canonical_trace.as_bytes()))
}

pub fn crash_key(commit_id: &CommitId, canonical_trace: &str) -> String {
    format!(
        "{}_{}_{}",
        BugKind::Crash.key_prefix(),
        commit_id.to_hex(),
        trace_hash_hex(canonical_trace)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit() -> CommitId {
        CommitId::from_hex("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap()
    }

    #[test]
    fn early_key_format_for_correctness_and_liveness() {
        let c = commit();
        assert_eq!(
            early_key(BugKind::Correctness, 42, &c).unwrap(),
            format!("1_42_{}", c.to_hex())
        );
        assert_eq!(
            early_key(BugKind::Liveness, 42, &c).unwrap(),
            format!("2_42_{}", c.to_hex())
        );
    }

    #[test]
    fn crash_has_no_early_key() {
        assert!(early_key(BugKind::Crash, 42, &commit()).is_none());
    }

    #[test]
    fn crash_key_is_stable_for_identical_traces() {
        let c = commit();
        let a = crash_key(&c, "frame0\nframe1");
        let b = crash_key(&c, "frame0\nframe1");
        assert_eq!(a, b);
    }

    #[test]
    fn crash_key_differs_for_different_traces() {
        let c = commit();
        let a = crash_key(&c, "frame0\nframe1");
        let b = crash_key(&c, "frame0\nframe2");
        assert_ne!(a, b);
    }
}
