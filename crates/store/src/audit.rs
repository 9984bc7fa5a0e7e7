//! Audit trail of lifecycle transitions and operator changes.

use chrono::{DateTime, Utc};
use engine_core::limits::MAX_AUDIT_ENTRIES;
use engine_core::{Actor, AuditAction, AuditEntry, ChunkId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

/// Bounded in-memory audit log; the oldest entries are evicted first.
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(MAX_AUDIT_ENTRIES)
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(
        &self,
        at: DateTime<Utc>,
        actor: Actor,
        action: AuditAction,
        stream: &str,
        chunk_id: Option<ChunkId>,
        message: impl Into<String>,
    ) {
        let entry = AuditEntry {
            at,
            actor,
            action,
            stream: stream.to_string(),
            chunk_id,
            message: message.into(),
        };

        info!(
            target: "audit",
            actor = ?entry.actor,
            action = ?entry.action,
            stream = %entry.stream,
            chunk_id = ?entry.chunk_id,
            "{}",
            entry.message
        );

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn for_stream(&self, stream: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.stream == stream)
            .cloned()
            .collect()
    }

    pub fn for_chunk(&self, chunk_id: ChunkId) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.chunk_id == Some(chunk_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_eviction() {
        let log = AuditLog::with_capacity(2);
        for i in 0..3 {
            log.record(
                Utc::now(),
                Actor::Operator,
                AuditAction::RetentionModified,
                "s",
                None,
                format!("change {}", i),
            );
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "change 1");
    }

    #[test]
    fn test_filter_by_chunk() {
        let log = AuditLog::new();
        let id = ChunkId::new();
        log.record(Utc::now(), Actor::Scheduler, AuditAction::ChunkDropped, "s", Some(id), "x");
        log.record(Utc::now(), Actor::Operator, AuditAction::RetentionPaused, "s", None, "y");
        assert_eq!(log.for_chunk(id).len(), 1);
        assert_eq!(log.for_stream("s").len(), 2);
    }
}
