//! Audit recorders.
//!
//! The evaluator hands every event to an [`AuditRecorder`] and returns
//! without waiting on the sink. [`QueuedAuditRecorder`] buffers events in a
//! bounded drop-oldest queue and delivers them in batches from a dedicated
//! thread, retrying failed batches with exponential backoff.
//! [`InlineAuditRecorder`] delivers synchronously on the caller's thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::event::AuditEvent;
use crate::queue::DropOldestQueue;
use crate::sink::AuditSink;

/// How long the delivery thread parks when the queue is empty.
const IDLE_PARK: Duration = Duration::from_millis(10);

/// Poll interval while waiting for a flush to complete.
const FLUSH_POLL: Duration = Duration::from_millis(1);

/// Errors constructing a recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("invalid audit recorder configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to spawn audit delivery thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Tuning for audit delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Maximum number of undelivered events held in memory.
    pub queue_capacity: usize,
    /// Maximum events per sink delivery.
    pub batch_size: usize,
    /// Retries after the first failed delivery of a batch.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles on every subsequent retry.
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 256,
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(2_000),
        }
    }
}

impl RecorderConfig {
    fn validate(&self) -> Result<(), RecorderError> {
        if self.queue_capacity == 0 {
            return Err(RecorderError::InvalidConfig("queue_capacity must be positive"));
        }
        if self.batch_size == 0 {
            return Err(RecorderError::InvalidConfig("batch_size must be positive"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(RecorderError::InvalidConfig(
                "initial_backoff must not exceed max_backoff",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Delivery counters.
///
/// `enqueued = delivered + dropped + failed + pending` at any quiescent point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderStats {
    /// Events accepted by `record`.
    pub enqueued: u64,
    /// Events the sink acknowledged.
    pub delivered: u64,
    /// Events evicted from a full queue before delivery.
    pub dropped: u64,
    /// Events whose batch exhausted its retries.
    pub failed: u64,
}

impl RecorderStats {
    /// Events accepted but not yet resolved.
    pub fn pending(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.delivered + self.dropped + self.failed)
    }
}

/// Destination for audit events produced by the evaluator.
pub trait AuditRecorder: Send + Sync {
    /// Accepts an event. Never blocks on the sink.
    fn record(&self, event: AuditEvent);

    /// Waits until every accepted event is delivered, dropped, or failed.
    ///
    /// Returns `false` if `timeout` elapsed first.
    fn flush(&self, timeout: Duration) -> bool;

    fn stats(&self) -> RecorderStats;
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RecorderStats {
        // Resolved counters are read before `enqueued` so `pending` never
        // underflows under concurrent recording.
        let delivered = self.delivered.load(Ordering::Acquire);
        let dropped = self.dropped.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let enqueued = self.enqueued.load(Ordering::Acquire);
        RecorderStats {
            enqueued,
            delivered,
            dropped,
            failed,
        }
    }
}

/// Delivers a batch, retrying with exponential backoff.
///
/// Returns whether the sink eventually accepted the batch.
fn deliver_with_retry(sink: &dyn AuditSink, batch: &[AuditEvent], config: &RecorderConfig) -> bool {
    let mut attempt = 0;
    loop {
        match sink.deliver(batch) {
            Ok(()) => {
                debug!(events = batch.len(), attempt, "Audit batch delivered");
                return true;
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.backoff(attempt);
                warn!(
                    error = %e,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Audit delivery failed, retrying"
                );
                thread::sleep(delay);
            }
            Err(e) => {
                error!(
                    error = %e,
                    events = batch.len(),
                    attempts = attempt + 1,
                    "Audit delivery failed, retries exhausted"
                );
                return false;
            }
        }
    }
}

struct Shared {
    queue: DropOldestQueue<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    config: RecorderConfig,
    counters: Counters,
    /// Set when shutdown begins; the delivery thread exits once the queue is empty.
    shutdown: AtomicBool,
    /// Set once the delivery thread has been joined.
    stopped: AtomicBool,
}

impl Shared {
    fn deliver(&self, batch: &[AuditEvent]) {
        let count = batch.len() as u64;
        if deliver_with_retry(self.sink.as_ref(), batch, &self.config) {
            self.counters.delivered.fetch_add(count, Ordering::AcqRel);
        } else {
            self.counters.failed.fetch_add(count, Ordering::AcqRel);
        }
    }

    fn run(&self) {
        debug!(
            capacity = self.queue.capacity(),
            batch_size = self.config.batch_size,
            "Audit delivery thread started"
        );
        loop {
            let batch = self.queue.pop_batch(self.config.batch_size);
            if batch.is_empty() {
                if self.shutdown.load(Ordering::Acquire) && self.queue.is_empty() {
                    break;
                }
                thread::park_timeout(IDLE_PARK);
                continue;
            }
            self.deliver(&batch);
        }
        debug!("Audit delivery thread stopped");
    }

    /// Delivers whatever is left in the queue on the calling thread.
    fn drain(&self) {
        loop {
            let batch = self.queue.pop_batch(self.config.batch_size);
            if batch.is_empty() {
                break;
            }
            self.deliver(&batch);
        }
    }

    /// Discards events pushed after the delivery thread stopped.
    fn discard_stranded(&self) {
        let mut discarded = 0u64;
        while self.queue.try_pop().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            self.counters.dropped.fetch_add(discarded, Ordering::AcqRel);
            warn!(events = discarded, "Audit recorder stopped, dropped late events");
        }
    }
}

/// Asynchronous recorder backed by a bounded queue and a delivery thread.
///
/// When the queue is full the oldest undelivered event is dropped and
/// counted. Dropping the recorder drains the queue and joins the thread.
pub struct QueuedAuditRecorder {
    shared: Arc<Shared>,
    worker: Thread,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for QueuedAuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedAuditRecorder")
            .field("config", &self.shared.config)
            .field("queued", &self.shared.queue.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl QueuedAuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, config: RecorderConfig) -> Result<Self, RecorderError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: DropOldestQueue::new(config.queue_capacity),
            sink,
            config,
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("fleetgate-audit".to_string())
            .spawn(move || worker_shared.run())?;
        let worker = handle.thread().clone();

        Ok(Self {
            shared,
            worker,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Number of events waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Drains the queue and stops the delivery thread.
    ///
    /// Idempotent. Events recorded afterwards are dropped and counted, never
    /// delivered on the caller's thread.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.worker.unpark();

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Audit delivery thread panicked");
            }
            // Events pushed while the thread was exiting are delivered here.
            // Anything pushed after `stopped` is visible is discarded by
            // `record` itself.
            self.shared.stopped.store(true, Ordering::SeqCst);
            self.shared.drain();
            let stats = self.stats();
            info!(
                delivered = stats.delivered,
                dropped = stats.dropped,
                failed = stats.failed,
                "Audit recorder shut down"
            );
        }
    }
}

impl AuditRecorder for QueuedAuditRecorder {
    fn record(&self, event: AuditEvent) {
        self.shared.counters.enqueued.fetch_add(1, Ordering::AcqRel);

        if self.shared.stopped.load(Ordering::SeqCst) {
            self.shared.counters.dropped.fetch_add(1, Ordering::AcqRel);
            warn!(event_id = %event.event_id(), "Audit recorder stopped, dropped event");
            return;
        }

        if let Some(evicted) = self.shared.queue.push(event) {
            self.shared.counters.dropped.fetch_add(1, Ordering::AcqRel);
            warn!(
                event_id = %evicted.event_id(),
                capacity = self.shared.queue.capacity(),
                "Audit queue full, dropped oldest event"
            );
        }
        if self.shared.stopped.load(Ordering::SeqCst) {
            self.shared.discard_stranded();
            return;
        }
        if self.shared.queue.len() >= self.shared.config.batch_size {
            self.worker.unpark();
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stats().pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.worker.unpark();
            thread::sleep(FLUSH_POLL);
        }
    }

    fn stats(&self) -> RecorderStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for QueuedAuditRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Synchronous recorder that delivers each event before `record` returns.
///
/// Used by the CLI and tests where ordering and immediacy matter more than
/// latency.
pub struct InlineAuditRecorder {
    sink: Arc<dyn AuditSink>,
    config: RecorderConfig,
    counters: Counters,
}

impl InlineAuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_config(sink, RecorderConfig::default())
    }

    pub fn with_config(sink: Arc<dyn AuditSink>, config: RecorderConfig) -> Self {
        Self {
            sink,
            config,
            counters: Counters::default(),
        }
    }
}

impl std::fmt::Debug for InlineAuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineAuditRecorder")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AuditRecorder for InlineAuditRecorder {
    fn record(&self, event: AuditEvent) {
        self.counters.enqueued.fetch_add(1, Ordering::AcqRel);
        if deliver_with_retry(self.sink.as_ref(), std::slice::from_ref(&event), &self.config) {
            self.counters.delivered.fetch_add(1, Ordering::AcqRel);
        } else {
            self.counters.failed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }

    fn stats(&self) -> RecorderStats {
        self.counters.snapshot()
    }
}
