//! Audit sinks.
//!
//! A sink is the durable, append-only destination for audit events. The
//! recorder hands it batches from its delivery thread; a sink error makes the
//! recorder retry the same batch.

use std::io::{self, Write};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

use crate::event::AuditEvent;

/// Failure to deliver a batch to a sink.
#[derive(Debug, Error)]
pub enum AuditDeliveryError {
    /// Writing to the underlying destination failed.
    #[error("audit sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized.
    #[error("audit event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The destination refused or is unreachable.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Appends a batch of events.
    ///
    /// After an error the recorder may call again with the same batch. A sink
    /// must not write an event twice when an earlier attempt got partway.
    fn deliver(&self, batch: &[AuditEvent]) -> Result<(), AuditDeliveryError>;
}

/// In-memory audit sink for testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn deliver(&self, batch: &[AuditEvent]) -> Result<(), AuditDeliveryError> {
        self.events
            .lock()
            .map_err(|_| AuditDeliveryError::Unavailable("audit sink lock poisoned".to_string()))?
            .extend_from_slice(batch);
        Ok(())
    }
}

/// Emits one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn deliver(&self, batch: &[AuditEvent]) -> Result<(), AuditDeliveryError> {
        for event in batch {
            info!(
                target: "fleetgate::audit",
                event_id = %event.event_id(),
                correlation_id = %event.correlation_id(),
                principal = %event.principal_id(),
                role = %event.role(),
                resource = %event.resource_id(),
                action = %event.action(),
                allowed = event.decision().allowed,
                step = ?event.step(),
                cache_hit = event.cache_hit(),
                latency_us = event.latency_us(),
                "Access decision"
            );
        }
        Ok(())
    }
}

/// Appends events as JSON lines to a writer.
///
/// A batch interrupted by a write error is resumed from the first unwritten
/// byte on the next attempt, so retries never duplicate lines.
#[derive(Debug)]
pub struct JsonLinesAuditSink<W: Write + Send> {
    state: Mutex<JsonLinesState<W>>,
}

#[derive(Debug)]
struct JsonLinesState<W> {
    writer: W,
    /// Serialized batch the writer has not fully accepted, and how far it got.
    unwritten: Option<(Vec<u8>, usize)>,
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(JsonLinesState {
                writer,
                unwritten: None,
            }),
        }
    }

    /// Returns the writer, flushing nothing further.
    pub fn into_inner(self) -> Option<W> {
        self.state.into_inner().ok().map(|state| state.writer)
    }
}

/// Writes `buf[offset..]`, returning how far it got on error.
fn write_from<W: Write>(writer: &mut W, buf: &[u8], offset: usize) -> Result<(), (usize, io::Error)> {
    let mut written = offset;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => return Err((written, io::Error::from(io::ErrorKind::WriteZero))),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn deliver(&self, batch: &[AuditEvent]) -> Result<(), AuditDeliveryError> {
        // Serialize the whole batch first so a bad event writes nothing.
        let mut buf = Vec::with_capacity(batch.len() * 256);
        for event in batch {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|_| AuditDeliveryError::Unavailable("audit writer lock poisoned".to_string()))?;
        let state = &mut *guard;

        let offset = match state.unwritten.take() {
            Some((previous, offset)) if previous == buf => offset,
            Some((previous, offset)) => {
                // An abandoned batch left a partial line. Finish it so the
                // log stays one event per line.
                debug!(
                    bytes = previous.len() - offset,
                    "Completing partially written audit batch"
                );
                if let Err((offset, e)) = write_from(&mut state.writer, &previous, offset) {
                    state.unwritten = Some((previous, offset));
                    return Err(e.into());
                }
                0
            }
            None => 0,
        };

        if let Err((offset, e)) = write_from(&mut state.writer, &buf, offset) {
            state.unwritten = Some((buf, offset));
            return Err(e.into());
        }
        if let Err(e) = state.writer.flush() {
            let len = buf.len();
            state.unwritten = Some((buf, len));
            return Err(e.into());
        }
        Ok(())
    }
}
