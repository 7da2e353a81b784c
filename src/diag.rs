//! Structured diagnostics (spec §7).
//!
//! Every error in the taxonomy described in spec §7 is reported with a
//! stable level and a UTC-rounded timestamp. This module is a thin wrapper
//! around the `log` crate (the same crate the teacher uses throughout
//! `git.rs`/`agent.rs`) that prefixes each line with that timestamp so the
//! processing loop's interruption points are observable (spec §9).

use chrono::Utc;

/// One entry in the taxonomy from spec §7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Validation,
    Resolution,
    ReplayInfrastructure,
    ReplaySignal,
    ReplayPass,
    Persistence,
    Publisher,
}

impl Category {
    fn as_str(self) -> &'static str {
        match self {
            Category::Validation => "validation",
            Category::Resolution => "resolution",
            Category::ReplayInfrastructure => "replay-infrastructure",
            Category::ReplaySignal => "replay-signal",
            Category::ReplayPass => "replay-pass",
            Category::Persistence => "persistence",
            Category::Publisher => "publisher",
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn error(category: Category, message: &str) {
    log::error!("[{}] {} category={}", timestamp(), message, category.as_str());
}

pub fn info(category: Category, message: &str) {
    log::info!("[{}] {} category={}", timestamp(), message, category.as_str());
}

pub fn debug(category: Category, message: &str) {
    log::debug!("[{}] {} category={}", timestamp(), message, category.as_str());
}
