//! Wire codec for the 45-byte bug report (spec §4.1, §6).
//!
//! Layout: 16-byte truncated checksum || 1-byte kind || 8-byte big-endian
//! seed || 20-byte commit id.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const WIRE_SIZE: usize = 45;
const CHECKSUM_LEN: usize = 16;
const COMMIT_LEN: usize = 20;
const TRAILING_LEN: usize = WIRE_SIZE - CHECKSUM_LEN; // bug_kind || seed || commit

static COMMIT_HEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[0-9a-f]{40}$").expect("static commit-hex pattern is valid")
});

/// One of the three failure modes the simulator can detect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BugKind {
    Correctness,
    Liveness,
    Crash,
}

impl BugKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BugKind::Correctness),
            2 => Some(BugKind::Liveness),
            3 => Some(BugKind::Crash),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            BugKind::Correctness => 1,
            BugKind::Liveness => 2,
            BugKind::Crash => 3,
        }
    }

    /// The dedup-key prefix used in §4.5.
    pub fn key_prefix(self) -> &'static str {
        match self {
            BugKind::Correctness => "1",
            BugKind::Liveness => "2",
            BugKind::Crash => "3",
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BugKind::Correctness => "correctness",
            BugKind::Liveness => "liveness",
            BugKind::Crash => "crash",
        };
        write!(f, "{s}")
    }
}

/// A 20-byte source-revision identifier, the raw bytes of a hex commit hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId([u8; COMMIT_LEN]);

impl CommitId {
    pub fn from_bytes(bytes: [u8; COMMIT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 40-character hex string, as used by the revision resolver
    /// and the assignment scheduler when talking to the upstream tracker.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != COMMIT_LEN * 2 {
            return None;
        }
        let mut bytes = [0u8; COMMIT_LEN];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; COMMIT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.to_hex())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A validated, decoded bug report.
#[derive(Clone, Debug)]
pub struct BugReport {
    pub kind: BugKind,
    pub seed: u64,
    pub commit_id: CommitId,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("short read: expected {WIRE_SIZE} bytes, got {0}")]
    ShortRead(usize),
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("bug_kind tag outside {{1,2,3}}")]
    BadKind,
    #[error("commit id does not render as a valid hex hash")]
    BadCommit,
}

fn checksum(trailing: &[u8; TRAILING_LEN]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(trailing);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Encode `(kind, seed, commit_id)` into the 45-byte wire format.
pub fn encode(kind: BugKind, seed: u64, commit_id: &CommitId) -> [u8; WIRE_SIZE] {
    let mut trailing = [0u8; TRAILING_LEN];
    trailing[0] = kind.tag();
    trailing[1..9].copy_from_slice(&seed.to_be_bytes());
    trailing[9..].copy_from_slice(commit_id.as_bytes());

    let mut out = [0u8; WIRE_SIZE];
    out[..CHECKSUM_LEN].copy_from_slice(&checksum(&trailing));
    out[CHECKSUM_LEN..].copy_from_slice(&trailing);
    out
}

/// Decode exactly 45 bytes, checking length, checksum, kind, and commit in
/// that order (spec §4.1).
pub fn decode(buf: &[u8]) -> Result<BugReport, DecodeError> {
    if buf.len() != WIRE_SIZE {
        return Err(DecodeError::ShortRead(buf.len()));
    }

    let mut trailing = [0u8; TRAILING_LEN];
    trailing.copy_from_slice(&buf[CHECKSUM_LEN..]);

    if checksum(&trailing) != buf[..CHECKSUM_LEN] {
        return Err(DecodeError::BadChecksum);
    }

    let kind = BugKind::from_tag(trailing[0]).ok_or(DecodeError::BadKind)?;

    let seed = u64::from_be_bytes(trailing[1..9].try_into().expect("9-byte slice"));

    let mut commit_bytes = [0u8; COMMIT_LEN];
    commit_bytes.copy_from_slice(&trailing[9..]);
    let commit_id = CommitId::from_bytes(commit_bytes);
    if !COMMIT_HEX_RE.is_match(&commit_id.to_hex()) {
        return Err(DecodeError::BadCommit);
    }

    Ok(BugReport {
        kind,
        seed,
        commit_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit() -> CommitId {
        CommitId::from_hex("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap()
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let commit = sample_commit();
        let wire = encode(BugKind::Correctness, 0x0123456789ABCDEF, &commit);
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.kind, BugKind::Correctness);
        assert_eq!(decoded.seed, 0x0123456789ABCDEF);
        assert_eq!(decoded.commit_id, commit);
    }

    #[test]
    fn decode_then_encode_recovers_original_bytes() {
        let commit = sample_commit();
        let wire = encode(BugKind::Crash, 42, &commit);
        let decoded = decode(&wire).unwrap();
        let re_encoded = encode(decoded.kind, decoded.seed, &decoded.commit_id);
        assert_eq!(wire, re_encoded);
    }

    #[test]
    fn rejects_short_reads() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err, DecodeError::ShortRead(10));
    }

    #[test]
    fn rejects_flipped_checksum_bit() {
        let commit = sample_commit();
        let mut wire = encode(BugKind::Liveness, 7, &commit);
        wire[0] ^= 0x01;
        assert_eq!(decode(&wire).unwrap_err(), DecodeError::BadChecksum);
    }

    #[test]
    fn rejects_kind_zero_and_four() {
        let commit = sample_commit();
        for bad_kind in [0u8, 4u8, 255u8] {
            let mut trailing = [0u8; TRAILING_LEN];
            trailing[0] = bad_kind;
            trailing[9..].copy_from_slice(commit.as_bytes());
            let mut wire = [0u8; WIRE_SIZE];
            wire[..CHECKSUM_LEN].copy_from_slice(&checksum(&trailing));
            wire[CHECKSUM_LEN..].copy_from_slice(&trailing);
            assert_eq!(decode(&wire).unwrap_err(), DecodeError::BadKind);
        }
    }

    #[test]
    fn all_seed_values_are_legal() {
        let commit = sample_commit();
        for seed in [0u64, 1, u64::MAX, u64::MAX / 2] {
            let wire = encode(BugKind::Correctness, seed, &commit);
            assert_eq!(decode(&wire).unwrap().seed, seed);
        }
    }

    #[test]
    fn checksum_covers_trailing_29_bytes() {
        let commit = sample_commit();
        let wire = encode(BugKind::Correctness, 1, &commit);
        let trailing: [u8; TRAILING_LEN] = wire[CHECKSUM_LEN..].try_into().unwrap();
        assert_eq!(wire[..CHECKSUM_LEN], checksum(&trailing));
    }
}
