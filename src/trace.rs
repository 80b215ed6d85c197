use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Entries kept before the oldest fall off.
pub const TRACE_CAPACITY: usize = 200;

/// One recorded resolution decision.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    /// The webhook this entry belongs to.
    pub request: Uuid,
    /// Which stage produced it ("resolver", "deep_scan", "reconcile").
    pub scope: &'static str,
    pub detail: String,
}

/// Bounded in-memory log of how each caller was (or was not) matched.
///
/// Strictly diagnostic: stages append to it so a stuck booking can be
/// reconstructed afterwards, but no control flow ever reads it back.
pub struct DebugTrace {
    capacity: usize,
    entries: Mutex<VecDeque<TraceEntry>>,
}

impl DebugTrace {
    pub fn new() -> Self {
        Self::with_capacity(TRACE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, request: Uuid, scope: &'static str, detail: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(TraceEntry {
            at: Utc::now(),
            request,
            scope,
            detail: detail.into(),
        });
    }

    /// Oldest-first copy of the current contents.
    pub fn snapshot(&self) -> Vec<TraceEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl Default for DebugTrace {
    fn default() -> Self {
        Self::new()
    }
}
