//! Per-operation recording state.
//!
//! One [`OperationContext`] exists per `run()` invocation. It is owned by
//! that invocation's task scope and never shared across concurrent
//! operations; the only contention it must absorb is parallel sub-work
//! *inside* one operation, so the sequence counter is atomic and the entry
//! list sits behind a `std::sync::Mutex` (appends never hold the lock across
//! an await, so an async-aware mutex buys nothing here).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;

use visflow_core::{Entry, LogType};

/// Length of the random suffix in a generated operation id.
const OPERATION_ID_SUFFIX_LEN: usize = 12;

/// Isolated state for one logical operation.
#[derive(Debug)]
pub struct OperationContext {
    operation_id: String,
    entries: Mutex<Vec<Entry>>,
    counter: AtomicU64,
}

impl OperationContext {
    /// A fresh context: generated operation id, no entries, counter at 0.
    pub fn new() -> Self {
        OperationContext {
            operation_id: generate_operation_id(),
            entries: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// The generated identifier shared by every entry of this operation.
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Returns the current counter value and advances it.
    ///
    /// Atomic, so parallel sub-calls sharing this context never receive the
    /// same sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Appends an entry stamped with this context's operation id and the
    /// next sequence number.
    pub fn record(&self, name: &str, log_type: LogType, value: Option<String>) {
        let entry = Entry::new(
            self.operation_id.clone(),
            name,
            log_type,
            value,
            self.next_sequence(),
        );
        // A poisoned lock means a panic mid-append elsewhere; the entries
        // already captured are still worth flushing, so keep going.
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of the entries captured so far, in append order.
    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes the captured entries, leaving the context empty. Used by
    /// finalization so a late drop-flush cannot ship the batch twice.
    pub fn take_entries(&self) -> Vec<Entry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix-millis timestamp plus a random alphanumeric suffix. Collisions would
/// need two operations in the same millisecond drawing the same 12-character
/// suffix.
fn generate_operation_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPERATION_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_context_starts_empty_at_zero() {
        let ctx = OperationContext::new();
        assert!(ctx.entries().is_empty());
        assert_eq!(ctx.next_sequence(), 0);
        assert_eq!(ctx.next_sequence(), 1);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = OperationContext::new();
        let b = OperationContext::new();
        assert_ne!(a.operation_id(), b.operation_id());
    }

    #[test]
    fn record_stamps_id_and_sequence() {
        let ctx = OperationContext::new();
        ctx.record("square", LogType::Start, None);
        ctx.record("square", LogType::Log, Some("result = 16".into()));
        ctx.record("square", LogType::End, None);

        let entries = ctx.entries();
        assert_eq!(entries.len(), 3);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.operation_id, ctx.operation_id());
            assert_eq!(entry.sequence, i as u64);
        }
        assert_eq!(entries[0].log_type, LogType::Start);
        assert_eq!(entries[1].value.as_deref(), Some("result = 16"));
    }

    #[test]
    fn take_entries_drains_the_context() {
        let ctx = OperationContext::new();
        ctx.record("f", LogType::Start, None);
        assert_eq!(ctx.take_entries().len(), 1);
        assert!(ctx.take_entries().is_empty());
    }

    #[test]
    fn parallel_sequence_allocation_has_no_duplicates() {
        let ctx = Arc::new(OperationContext::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = Arc::clone(&ctx);
            handles.push(std::thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.push(ctx.next_sequence());
                }
                seen
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
    }
}
