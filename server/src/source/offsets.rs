//! Sequence and offset tracking
//!
//! Per-signal sequence counters shared between the driver's poll loop and
//! commit callers, the offset-reader boundary toward the host framework, and
//! a file-backed store for the standalone host.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ingress::SignalKind;

use super::record::{SourceOffset, SourcePartition};

/// Per-signal sequence state.
///
/// `next` is pre-incremented per emitted record, so the first record of a
/// fresh instance carries sequence 1. `committed` starts at -1 and advances
/// as the host reports deliveries; it never regresses, and gaps are flagged
/// but not corrected.
pub struct OffsetTracker {
    next: [AtomicI64; 3],
    committed: [AtomicI64; 3],
}

impl Default for OffsetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self {
            next: [AtomicI64::new(0), AtomicI64::new(0), AtomicI64::new(0)],
            committed: [AtomicI64::new(-1), AtomicI64::new(-1), AtomicI64::new(-1)],
        }
    }

    /// Reserve the next sequence for an emitted record
    pub fn next_sequence(&self, signal: SignalKind) -> i64 {
        self.next[signal.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last reserved sequence (0 before the first record)
    pub fn current_sequence(&self, signal: SignalKind) -> i64 {
        self.next[signal.index()].load(Ordering::SeqCst)
    }

    /// Last committed sequence (-1 before the first commit)
    pub fn committed(&self, signal: SignalKind) -> i64 {
        self.committed[signal.index()].load(Ordering::SeqCst)
    }

    /// Resume from a persisted sequence: the next emitted record will carry
    /// `sequence + 1`, and the sequence itself counts as committed.
    pub fn restore(&self, signal: SignalKind, sequence: i64) {
        self.next[signal.index()].store(sequence, Ordering::SeqCst);
        self.committed[signal.index()].store(sequence, Ordering::SeqCst);
    }

    /// Record a delivered sequence. Out-of-order commits never lower the
    /// committed mark; non-consecutive advances log the gap.
    pub fn commit(&self, signal: SignalKind, sequence: i64) {
        let previous = self.committed[signal.index()].fetch_max(sequence, Ordering::SeqCst);
        if sequence <= previous {
            tracing::debug!(
                signal = %signal,
                sequence,
                committed = previous,
                "out-of-order commit ignored"
            );
            return;
        }
        if previous >= 0 && sequence != previous + 1 {
            tracing::warn!(
                signal = %signal,
                previous_committed = previous,
                committed = sequence,
                gap = sequence - previous - 1,
                "sequence gap detected on commit"
            );
        }
    }
}

/// What the host framework persisted for one partition.
///
/// Loosely typed on purpose: a record without a sequence (or an empty map on
/// first start) means the same as no record at all.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedOffset {
    pub session_id: Option<String>,
    pub sequence: Option<i64>,
}

/// Offset lookup provided by the host framework, consulted at start only
pub trait OffsetReader {
    fn offset(&self, partition: &SourcePartition) -> Option<PersistedOffset>;
}

/// Reader with no persisted state - the framework behaviour on first start
pub struct NoOffsets;

impl OffsetReader for NoOffsets {
    fn offset(&self, _partition: &SourcePartition) -> Option<PersistedOffset> {
        None
    }
}

/// JSON-file offset store for the standalone host.
///
/// Keyed per signal; the file is rewritten on each recorded commit, which is
/// cheap at the one-record-per-batch cadence of this connector.
pub struct FileOffsetStore {
    path: PathBuf,
    state: Mutex<HashMap<String, PersistedOffset>>,
}

impl FileOffsetStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read offset store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse offset store: {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Persist the offset of a committed record
    pub fn record(&self, offset: &SourceOffset) -> Result<()> {
        let mut state = self.state.lock();
        state.insert(
            offset.signal_name.as_str().to_string(),
            PersistedOffset {
                session_id: Some(offset.session_id.clone()),
                sequence: Some(offset.sequence),
            },
        );
        let content = serde_json::to_string_pretty(&*state)?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write offset store: {}", self.path.display()))?;
        Ok(())
    }
}

impl OffsetReader for FileOffsetStore {
    fn offset(&self, partition: &SourcePartition) -> Option<PersistedOffset> {
        self.state
            .lock()
            .get(partition.signal_name.as_str())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_start_at_one_and_increase() {
        let tracker = OffsetTracker::new();
        assert_eq!(tracker.current_sequence(SignalKind::Traces), 0);
        assert_eq!(tracker.next_sequence(SignalKind::Traces), 1);
        assert_eq!(tracker.next_sequence(SignalKind::Traces), 2);
        assert_eq!(tracker.next_sequence(SignalKind::Traces), 3);
        // Signals are independent
        assert_eq!(tracker.next_sequence(SignalKind::Logs), 1);
    }

    #[test]
    fn test_restore_continues_from_persisted_sequence() {
        let tracker = OffsetTracker::new();
        tracker.restore(SignalKind::Metrics, 42);
        assert_eq!(tracker.committed(SignalKind::Metrics), 42);
        assert_eq!(tracker.next_sequence(SignalKind::Metrics), 43);
    }

    #[test]
    fn test_commit_advances_mark() {
        let tracker = OffsetTracker::new();
        assert_eq!(tracker.committed(SignalKind::Traces), -1);
        tracker.commit(SignalKind::Traces, 1);
        tracker.commit(SignalKind::Traces, 2);
        assert_eq!(tracker.committed(SignalKind::Traces), 2);
    }

    #[test]
    fn test_out_of_order_commit_does_not_regress() {
        let tracker = OffsetTracker::new();
        tracker.commit(SignalKind::Traces, 5);
        tracker.commit(SignalKind::Traces, 3);
        assert_eq!(tracker.committed(SignalKind::Traces), 5);
    }

    #[test]
    fn test_gap_commit_keeps_new_value() {
        let tracker = OffsetTracker::new();
        tracker.commit(SignalKind::Logs, 1);
        // Gap is flagged in logs but the mark still advances
        tracker.commit(SignalKind::Logs, 4);
        assert_eq!(tracker.committed(SignalKind::Logs), 4);
    }

    #[test]
    fn test_concurrent_sequences_stay_strictly_monotonic() {
        use std::sync::Arc;
        let tracker = Arc::new(OffsetTracker::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                (0..250)
                    .map(|_| tracker.next_sequence(SignalKind::Traces))
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<i64> = (1..=1000).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.json");

        let store = FileOffsetStore::open(&path).unwrap();
        let partition = SourcePartition {
            connector_name: "c-1".to_string(),
            signal_name: SignalKind::Traces,
        };
        assert!(store.offset(&partition).is_none());

        store
            .record(&SourceOffset {
                session_id: "s-0".to_string(),
                signal_name: SignalKind::Traces,
                sequence: 42,
            })
            .unwrap();

        // A fresh store reads back the persisted offset
        let reopened = FileOffsetStore::open(&path).unwrap();
        let persisted = reopened.offset(&partition).unwrap();
        assert_eq!(persisted.sequence, Some(42));
        assert_eq!(persisted.session_id.as_deref(), Some("s-0"));
        // Other signals stay untouched
        assert!(
            reopened
                .offset(&SourcePartition {
                    connector_name: "c-1".to_string(),
                    signal_name: SignalKind::Logs,
                })
                .is_none()
        );
    }
}
