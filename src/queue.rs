//! Pending-work item and the ingress→processing channel (spec §3, §5, §9).

use std::time::SystemTime;

use crate::wire::BugReport;

/// A validated bug report plus its arrival timestamp (spec §3).
#[derive(Debug)]
pub struct PendingWork {
    pub report: BugReport,
    pub arrived_at: SystemTime,
}

impl PendingWork {
    pub fn new(report: BugReport) -> Self {
        Self {
            report,
            arrived_at: SystemTime::now(),
        }
    }
}

/// Default channel capacity. Human-scale bug-report volume (spec §9) means
/// this is generous headroom, not a tight budget.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub type Sender = tokio::sync::mpsc::Sender<PendingWork>;
pub type Receiver = tokio::sync::mpsc::Receiver<PendingWork>;

pub fn channel(capacity: usize) -> (Sender, Receiver) {
    tokio::sync::mpsc::channel(capacity)
}
