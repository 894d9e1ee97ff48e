//! The task-scoped flow recorder.
//!
//! [`FlowLogger::run`] activates a fresh [`OperationContext`] for the full
//! dynamic extent of a work future using `tokio::task_local!`. The carrier
//! follows the logical task, not the thread: two operations interleaved on
//! one worker never see each other's context, and the binding survives every
//! suspension point of the task's continuation chain. Sub-futures awaited or
//! joined inside the scope share the context; a detached `tokio::spawn` does
//! not inherit it automatically and must be bridged with
//! [`FlowLogger::propagate`].

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;

use visflow_core::{Entry, LogType};

use crate::context::OperationContext;
use crate::error::LoggerError;
use crate::sink::{HttpSink, TraceSink};

tokio::task_local! {
    /// The context of the innermost active `run` on this task.
    static CURRENT_CONTEXT: Arc<OperationContext>;
}

/// Captures flow logs for units of work and ships them to a sink.
///
/// Cloning is cheap; clones share the sink.
#[derive(Clone)]
pub struct FlowLogger {
    sink: Arc<dyn TraceSink>,
}

impl FlowLogger {
    /// A logger shipping to the collector at `url` via HTTP.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_sink(Arc::new(HttpSink::new(url)))
    }

    /// A logger shipping to an arbitrary sink.
    pub fn with_sink(sink: Arc<dyn TraceSink>) -> Self {
        FlowLogger { sink }
    }

    /// Runs `work` under a fresh operation context and returns its output.
    ///
    /// Finalization (shipping the captured entries) always happens after
    /// `work` completes; a failed `work` future still resolves to its own
    /// output value, so an `Err` result propagates unchanged after the
    /// entries captured up to that point were shipped. Sink failures are
    /// logged and swallowed, never surfaced here.
    pub async fn run<T>(&self, work: impl Future<Output = T>) -> T {
        self.run_with_artifact(work).await.0
    }

    /// Like [`run`](Self::run), but also returns the artifact the sink sent
    /// back for this trace (e.g. a rendered diagram), if any.
    pub async fn run_with_artifact<T>(&self, work: impl Future<Output = T>) -> (T, Option<String>) {
        let ctx = Arc::new(OperationContext::new());
        let guard = FlushGuard {
            ctx: Arc::clone(&ctx),
            sink: Arc::clone(&self.sink),
            armed: true,
        };
        let value = CURRENT_CONTEXT.scope(Arc::clone(&ctx), work).await;
        guard.disarm();
        let artifact = self.finalize(&ctx).await;
        (value, artifact)
    }

    /// Opens the named scope in the current operation's trace.
    pub fn start(&self, name: &str) -> Result<(), LoggerError> {
        self.record(name, LogType::Start, None)
    }

    /// Closes the named scope in the current operation's trace.
    pub fn end(&self, name: &str) -> Result<(), LoggerError> {
        self.record(name, LogType::End, None)
    }

    /// Appends a log line under the named scope.
    pub fn log(&self, name: &str, value: impl Into<String>) -> Result<(), LoggerError> {
        self.record(name, LogType::Log, Some(value.into()))
    }

    /// Records a return value the named scope consumed from its last call.
    pub fn store(&self, name: &str, value: impl Into<String>) -> Result<(), LoggerError> {
        self.record(name, LogType::Store, Some(value.into()))
    }

    /// Wraps `fut` so it carries the current operation context, for handing
    /// to `tokio::spawn`. Entries the spawned task records land in this
    /// operation's trace with race-free sequence numbers.
    pub fn propagate<F>(&self, fut: F) -> Result<impl Future<Output = F::Output>, LoggerError>
    where
        F: Future,
    {
        let ctx = CURRENT_CONTEXT
            .try_with(Arc::clone)
            .map_err(|_| LoggerError::NoActiveContext)?;
        Ok(CURRENT_CONTEXT.scope(ctx, fut))
    }

    /// Snapshot of the current operation's entries. Mainly useful in tests.
    pub fn current_entries(&self) -> Result<Vec<Entry>, LoggerError> {
        CURRENT_CONTEXT
            .try_with(|ctx| ctx.entries())
            .map_err(|_| LoggerError::NoActiveContext)
    }

    fn record(
        &self,
        name: &str,
        log_type: LogType,
        value: Option<String>,
    ) -> Result<(), LoggerError> {
        CURRENT_CONTEXT
            .try_with(|ctx| ctx.record(name, log_type, value))
            .map_err(|_| LoggerError::NoActiveContext)
    }

    /// Ships the operation's entries exactly once. Sink failures are logged
    /// and swallowed so the traced work's outcome is never affected.
    async fn finalize(&self, ctx: &OperationContext) -> Option<String> {
        let entries = ctx.take_entries();
        match self.sink.ship(&entries).await {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::error!(
                    operation_id = ctx.operation_id(),
                    entry_count = entries.len(),
                    error = %err,
                    "failed to ship flow log"
                );
                None
            }
        }
    }
}

/// Best-effort flush if `run` never reaches finalization: the work future
/// panicked, or the `run` future itself was dropped mid-flight. Shipping is
/// spawned fire-and-forget since `Drop` cannot await.
struct FlushGuard {
    ctx: Arc<OperationContext>,
    sink: Arc<dyn TraceSink>,
    armed: bool,
}

impl FlushGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let entries = self.ctx.take_entries();
        if entries.is_empty() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let sink = Arc::clone(&self.sink);
                let operation_id = self.ctx.operation_id().to_string();
                handle.spawn(async move {
                    if let Err(err) = sink.ship(&entries).await {
                        tracing::warn!(
                            operation_id,
                            error = %err,
                            "flush after abandoned run failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    operation_id = self.ctx.operation_id(),
                    entry_count = entries.len(),
                    "dropping flow log entries; no runtime available for flush"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn capturing_logger() -> (FlowLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (FlowLogger::with_sink(sink.clone()), sink)
    }

    #[tokio::test]
    async fn entries_get_gapless_sequences_in_call_order() {
        let (logger, sink) = capturing_logger();
        logger
            .run(async {
                logger.start("f").unwrap();
                logger.log("f", "x=1").unwrap();
                logger.end("f").unwrap();
            })
            .await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let entries = &batches[0];
        assert_eq!(entries.len(), 3);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        let types: Vec<LogType> = entries.iter().map(|e| e.log_type).collect();
        assert_eq!(types, vec![LogType::Start, LogType::Log, LogType::End]);
        assert!(entries.iter().all(|e| e.operation_id == entries[0].operation_id));
    }

    #[tokio::test]
    async fn logging_outside_run_fails_loudly() {
        let (logger, _) = capturing_logger();
        assert!(matches!(
            logger.log("f", "x"),
            Err(LoggerError::NoActiveContext)
        ));
        assert!(matches!(logger.start("f"), Err(LoggerError::NoActiveContext)));
        assert!(matches!(logger.end("f"), Err(LoggerError::NoActiveContext)));
        assert!(matches!(
            logger.store("f", "x"),
            Err(LoggerError::NoActiveContext)
        ));
    }

    #[tokio::test]
    async fn sequential_runs_get_distinct_operation_ids() {
        let (logger, sink) = capturing_logger();
        for _ in 0..2 {
            logger
                .run(async {
                    logger.start("calc").unwrap();
                    logger.end("calc").unwrap();
                })
                .await;
        }

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_ne!(batches[0][0].operation_id, batches[1][0].operation_id);
    }

    #[tokio::test]
    async fn nested_runs_are_isolated() {
        let (logger, sink) = capturing_logger();
        logger
            .run(async {
                logger.start("outer").unwrap();
                logger
                    .run(async {
                        logger.start("inner").unwrap();
                        logger.end("inner").unwrap();
                    })
                    .await;
                logger.end("outer").unwrap();
            })
            .await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        // Inner run finalizes first.
        let inner = &batches[0];
        let outer = &batches[1];
        assert!(inner.iter().all(|e| e.name == "inner"));
        assert!(outer.iter().all(|e| e.name == "outer"));
        assert_ne!(inner[0].operation_id, outer[0].operation_id);
        // Each context counted independently from zero.
        assert_eq!(inner.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(outer.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn interleaved_concurrent_runs_never_share_a_context() {
        let (logger, sink) = capturing_logger();

        let traced = |tag: &'static str| {
            let logger = logger.clone();
            async move {
                logger.run(async {
                    logger.start(tag).unwrap();
                    for i in 0..10 {
                        // Yield so the two operations interleave on the
                        // current worker.
                        tokio::task::yield_now().await;
                        logger.log(tag, format!("step {}", i)).unwrap();
                    }
                    logger.end(tag).unwrap();
                })
                .await
            }
        };

        tokio::join!(traced("left"), traced("right"));

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            // Partitioning by operation id recovers exactly the per-run
            // sequence 0..N-1.
            let op = &batch[0].operation_id;
            assert!(batch.iter().all(|e| &e.operation_id == op));
            assert!(batch.iter().all(|e| e.name == batch[0].name));
            let sequences: Vec<u64> = batch.iter().map(|e| e.sequence).collect();
            assert_eq!(sequences, (0..12).collect::<Vec<u64>>());
        }
        assert_ne!(batches[0][0].operation_id, batches[1][0].operation_id);
    }

    #[tokio::test]
    async fn failed_work_still_ships_captured_entries() {
        let (logger, sink) = capturing_logger();
        let result: Result<(), String> = logger
            .run(async {
                logger.start("doomed").unwrap();
                logger.log("doomed", "about to fail").unwrap();
                Err("boom".to_string())
            })
            .await;

        assert_eq!(result, Err("boom".to_string()));
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn panicking_work_flushes_via_drop_guard() {
        let (logger, sink) = capturing_logger();
        let logger2 = logger.clone();
        let handle = tokio::spawn(async move {
            logger2
                .run(async {
                    logger2.start("panicky").unwrap();
                    panic!("work blew up");
                })
                .await
        });
        assert!(handle.await.is_err());

        // The guard ships fire-and-forget; give the spawned flush a beat.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].name, "panicky");
    }

    #[tokio::test]
    async fn cancelled_run_flushes_via_drop_guard() {
        let (logger, sink) = capturing_logger();
        let logger2 = logger.clone();
        let handle = tokio::spawn(async move {
            logger2
                .run(async {
                    logger2.start("cancelled").unwrap();
                    // Park forever; the test aborts us mid-flight.
                    std::future::pending::<()>().await;
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.abort();
        assert!(handle.await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].name, "cancelled");
    }

    #[tokio::test]
    async fn propagate_carries_context_into_spawned_tasks() {
        let (logger, sink) = capturing_logger();
        logger
            .run(async {
                logger.start("parent").unwrap();
                let logger2 = logger.clone();
                let child = logger
                    .propagate(async move {
                        logger2.log("parent", "from spawned task").unwrap();
                    })
                    .unwrap();
                tokio::spawn(child).await.unwrap();
                logger.end("parent").unwrap();
            })
            .await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let entries = &batches[0];
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.operation_id == entries[0].operation_id));
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn propagate_outside_run_fails() {
        let (logger, _) = capturing_logger();
        assert!(logger.propagate(async {}).is_err());
    }

    #[tokio::test]
    async fn current_entries_snapshots_the_active_operation() {
        let (logger, _) = capturing_logger();
        logger
            .run(async {
                assert!(logger.current_entries().unwrap().is_empty());
                logger.start("f").unwrap();
                logger.log("f", "x=1").unwrap();

                let snapshot = logger.current_entries().unwrap();
                assert_eq!(snapshot.len(), 2);
                assert_eq!(snapshot[0].log_type, LogType::Start);
                assert_eq!(snapshot[1].value.as_deref(), Some("x=1"));
                assert_eq!(snapshot.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);

                logger.end("f").unwrap();
            })
            .await;

        // Outside any run the snapshot fails like the other primitives.
        assert!(matches!(
            logger.current_entries(),
            Err(LoggerError::NoActiveContext)
        ));
    }

    #[tokio::test]
    async fn run_returns_work_output_unchanged() {
        let (logger, _) = capturing_logger();
        let value = logger
            .run(async {
                logger.start("f").unwrap();
                logger.end("f").unwrap();
                42
            })
            .await;
        assert_eq!(value, 42);
    }
}
