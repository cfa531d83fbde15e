//! Buffered, back-pressured run log persistence
//!
//! Entries accumulate in a bounded channel and flush when a batch fills or a
//! timer elapses. The hard cap bounds memory: when the channel is full new
//! entries are dropped with a warning instead of blocking the caller — logs
//! must never stall workflow execution. A circuit breaker stops re-buffering
//! batches after consecutive flush failures, and a clean shutdown flushes
//! whatever is buffered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reflux_engine::{LogEntry, StepLogger};

use crate::models::CreateRunLog;
use crate::repositories::Database;

/// Destination for flushed batches; the database in production.
#[async_trait]
pub trait LogWriter: Send + Sync + 'static {
    async fn write(&self, batch: &[CreateRunLog]) -> Result<()>;
}

#[async_trait]
impl LogWriter for Database {
    async fn write(&self, batch: &[CreateRunLog]) -> Result<()> {
        self.insert_run_logs(batch).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunLoggerConfig {
    /// Flush once this many entries are buffered
    pub batch_size: usize,
    /// Flush at least this often
    pub flush_interval: Duration,
    /// Hard buffer cap; entries beyond it are dropped
    pub max_buffer: usize,
    /// Per-entry `data` cap; larger payloads become a truncation marker
    pub max_data_bytes: usize,
    /// Consecutive flush failures before failed batches are dropped
    pub breaker_threshold: u32,
}

impl Default for RunLoggerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(1),
            max_buffer: 10_000,
            max_data_bytes: 100 * 1024,
            breaker_threshold: 3,
        }
    }
}

/// Shared handle to the logger. Enqueueing is synchronous and never blocks;
/// a background task owns the flush schedule.
pub struct RunLogger {
    tx: Mutex<Option<mpsc::Sender<CreateRunLog>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
    max_data_bytes: usize,
}

impl RunLogger {
    pub fn spawn(db: Database, config: RunLoggerConfig) -> Self {
        Self::spawn_with_writer(db, config)
    }

    pub fn spawn_with_writer<W: LogWriter>(writer: W, config: RunLoggerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_buffer);
        let max_data_bytes = config.max_data_bytes;
        let worker = tokio::spawn(run_flush_loop(writer, rx, config));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
            max_data_bytes,
        }
    }

    /// Entries dropped so far (buffer full or breaker open).
    pub fn dropped_entries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn enqueue(&self, mut entry: CreateRunLog) {
        if let Some(data) = &entry.data {
            let size = serde_json::to_string(data).map(|s| s.len()).unwrap_or(0);
            if size > self.max_data_bytes {
                entry.data = Some(serde_json::json!({
                    "truncated": true,
                    "original_bytes": size,
                }));
            }
        }

        let guard = self.tx.lock().expect("run logger sender lock poisoned");
        let Some(tx) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(entry) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_total = total, "run log buffer full, dropping entry");
        }
    }

    /// Close the intake and wait for the final flush.
    pub async fn shutdown(&self) {
        self.tx
            .lock()
            .expect("run logger sender lock poisoned")
            .take();
        let worker = self
            .worker
            .lock()
            .expect("run logger worker lock poisoned")
            .take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                warn!(error = %err, "run logger worker ended abnormally");
            }
        }
    }
}

impl StepLogger for RunLogger {
    fn log(&self, entry: LogEntry) {
        self.enqueue(CreateRunLog {
            run_id: entry.run_id,
            step_id: entry.step_id,
            timestamp: Utc::now(),
            level: entry.level,
            message: entry.message,
            data: entry.data,
        });
    }
}

async fn run_flush_loop<W: LogWriter>(
    writer: W,
    mut rx: mpsc::Receiver<CreateRunLog>,
    config: RunLoggerConfig,
) {
    let mut buffer: Vec<CreateRunLog> = Vec::with_capacity(config.batch_size);
    let mut consecutive_failures: u32 = 0;
    let mut ticker = tokio::time::interval(config.flush_interval);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(entry) => {
                    buffer.push(entry);
                    if buffer.len() >= config.batch_size {
                        flush(&writer, &mut buffer, &mut consecutive_failures, &config).await;
                    }
                }
                None => {
                    flush(&writer, &mut buffer, &mut consecutive_failures, &config).await;
                    debug!("run logger shut down");
                    return;
                }
            },
            _ = ticker.tick() => {
                flush(&writer, &mut buffer, &mut consecutive_failures, &config).await;
            }
        }
    }
}

async fn flush<W: LogWriter>(
    writer: &W,
    buffer: &mut Vec<CreateRunLog>,
    consecutive_failures: &mut u32,
    config: &RunLoggerConfig,
) {
    if buffer.is_empty() {
        return;
    }
    match writer.write(buffer).await {
        Ok(()) => {
            buffer.clear();
            *consecutive_failures = 0;
        }
        Err(err) => {
            *consecutive_failures += 1;
            if *consecutive_failures >= config.breaker_threshold {
                warn!(
                    error = %err,
                    batch = buffer.len(),
                    failures = *consecutive_failures,
                    "dropping log batch after consecutive flush failures"
                );
                buffer.clear();
            } else {
                warn!(
                    error = %err,
                    batch = buffer.len(),
                    failures = *consecutive_failures,
                    "log flush failed, batch retained for retry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflux_contracts::LogLevel;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingWriter {
        batches: Mutex<Vec<Vec<CreateRunLog>>>,
        fail: AtomicBool,
        attempts: AtomicU64,
    }

    #[async_trait]
    impl LogWriter for Arc<RecordingWriter> {
        async fn write(&self, batch: &[CreateRunLog]) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("store unavailable");
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn entry(message: &str) -> CreateRunLog {
        CreateRunLog {
            run_id: Uuid::now_v7(),
            step_id: "step".to_string(),
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.to_string(),
            data: None,
        }
    }

    #[tokio::test]
    async fn overflowing_the_buffer_drops_exactly_the_excess() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = RunLogger::spawn_with_writer(
            writer.clone(),
            RunLoggerConfig {
                max_buffer: 5,
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        // Current-thread runtime: the worker cannot run between these
        // synchronous enqueues, so the channel is the whole buffer.
        for i in 0..8 {
            logger.enqueue(entry(&format!("m{i}")));
        }
        assert_eq!(logger.dropped_entries(), 3);
        logger.shutdown().await;
        let flushed: usize = writer.batches.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(flushed, 5);
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_entries() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = RunLogger::spawn_with_writer(
            writer.clone(),
            RunLoggerConfig {
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        logger.enqueue(entry("one"));
        logger.enqueue(entry("two"));
        logger.shutdown().await;

        let flushed: usize = writer.batches.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(flushed, 2);
    }

    #[tokio::test]
    async fn full_batches_flush_without_waiting_for_the_timer() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = RunLogger::spawn_with_writer(
            writer.clone(),
            RunLoggerConfig {
                batch_size: 2,
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        for i in 0..5 {
            logger.enqueue(entry(&format!("m{i}")));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let batches = writer.batches.lock().unwrap();
            assert_eq!(batches.len(), 2);
            assert!(batches.iter().all(|b| b.len() == 2));
        }

        logger.shutdown().await;
        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);
    }

    #[tokio::test]
    async fn oversized_data_becomes_a_truncation_marker() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = RunLogger::spawn_with_writer(
            writer.clone(),
            RunLoggerConfig {
                max_data_bytes: 64,
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        let mut big = entry("big");
        big.data = Some(serde_json::json!({ "blob": "x".repeat(500) }));
        logger.enqueue(big);
        logger.shutdown().await;

        let batches = writer.batches.lock().unwrap();
        let data = batches[0][0].data.as_ref().unwrap();
        assert_eq!(data["truncated"], true);
        assert!(data["original_bytes"].as_u64().unwrap() > 64);
    }

    #[tokio::test]
    async fn breaker_drops_batches_after_consecutive_failures() {
        let writer = Arc::new(RecordingWriter::default());
        writer.fail.store(true, Ordering::SeqCst);
        let logger = RunLogger::spawn_with_writer(
            writer.clone(),
            RunLoggerConfig {
                batch_size: 1,
                breaker_threshold: 2,
                flush_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );

        logger.enqueue(entry("doomed"));
        tokio::time::sleep(Duration::from_millis(80)).await;

        // First failure retains the batch, the second drops it; afterwards
        // nothing is left to retry.
        let attempts_after_drop = writer.attempts.load(Ordering::SeqCst);
        assert!(attempts_after_drop >= 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(writer.attempts.load(Ordering::SeqCst), attempts_after_drop);

        // Recovery: the breaker resets once a write succeeds.
        writer.fail.store(false, Ordering::SeqCst);
        logger.enqueue(entry("survivor"));
        logger.shutdown().await;
        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].message, "survivor");
    }
}
