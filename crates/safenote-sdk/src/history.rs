use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_HISTORY_CAPACITY;

/// Target of collection-wide loads.
pub const ALL_NOTES: &str = "all";
/// Target of a create that failed before an id was assigned.
pub const NEW_NOTE: &str = "new";
/// Target of availability checks.
pub const SYSTEM: &str = "system";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Load,
    Create,
    Decrypt,
    Check,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Load => "load",
            OperationKind::Create => "create",
            OperationKind::Decrypt => "decrypt",
            OperationKind::Check => "check",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Success,
    Failed,
    Verified,
    AlreadyVerified,
    Available,
    Unavailable,
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationOutcome::Success => "success",
            OperationOutcome::Failed => "failed",
            OperationOutcome::Verified => "verified",
            OperationOutcome::AlreadyVerified => "already_verified",
            OperationOutcome::Available => "available",
            OperationOutcome::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub id: u64,
    pub kind: OperationKind,
    pub note_id: String,
    pub timestamp_millis: i64,
    pub outcome: OperationOutcome,
}

/// Newest-first log of recent orchestration attempts. Entries beyond the
/// capacity are dropped from the tail.
pub struct OperationHistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<OperationEntry>>,
    next_id: AtomicU64,
}

impl Default for OperationHistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl OperationHistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn record(
        &self,
        kind: OperationKind,
        note_id: &str,
        outcome: OperationOutcome,
    ) -> OperationEntry {
        debug!("history: {} {} {}", kind, note_id, outcome);

        // Ids follow deque order, so assign them under the lock.
        let mut entries = self.entries.lock();
        let entry = OperationEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            kind,
            note_id: note_id.to_string(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
            outcome,
        };
        entries.push_front(entry.clone());
        entries.truncate(self.capacity);
        entry
    }

    pub fn entries(&self) -> Vec<OperationEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn recent(&self, n: usize) -> Vec<OperationEntry> {
        self.entries.lock().iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
