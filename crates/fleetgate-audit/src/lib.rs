//! # fleetgate-audit: Access decision audit trail
//!
//! Every authorization evaluation produces exactly one [`AuditEvent`],
//! including cached and denied evaluations. Events are handed to an
//! [`AuditRecorder`], which delivers them to an append-only [`AuditSink`]
//! off the request path.
//!
//! ```text
//! evaluate() ──record──▶ DropOldestQueue ──batch──▶ delivery thread ──▶ AuditSink
//!                         (bounded)                  (retry + backoff)
//! ```
//!
//! Overflow drops the oldest undelivered event and is counted in
//! [`RecorderStats::dropped`].

pub mod event;
pub mod queue;
pub mod recorder;
pub mod sink;

pub use event::AuditEvent;
pub use queue::DropOldestQueue;
pub use recorder::{
    AuditRecorder, InlineAuditRecorder, QueuedAuditRecorder, RecorderConfig, RecorderError,
    RecorderStats,
};
pub use sink::{AuditDeliveryError, AuditSink, InMemoryAuditSink, JsonLinesAuditSink, TracingAuditSink};
