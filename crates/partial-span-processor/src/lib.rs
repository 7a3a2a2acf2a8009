//! Partial Span Processor
//!
//! An [`opentelemetry_sdk::trace::SpanProcessor`] that emits periodic
//! "heartbeat" log records for every currently active span, and a final
//! "stop" record once `on_end` is observed. This guarantees trace visibility
//! even when a span never completes — process crash, unbounded work, an
//! orphaned operation — by letting an upstream collector reconstruct the
//! partial trace from heartbeats and reconcile it later against the stop.
//!
//! Conventional exporters emit a span only once, on end; if the process dies
//! first the trace is lost. This crate trades that single-shot guarantee for
//! a best-effort stream of periodic snapshots.

mod emit;
mod envelope;
mod error;
mod exporter;
mod queue;
mod registry;
mod scheduler;
mod span;

mod processor;

pub use error::PartialSpanError;
pub use exporter::{LogExporter, LogExporterBoxed, NullLogExporter, PartialLogRecord, StdoutLogExporter};
pub use processor::{PartialSpanProcessor, PartialSpanProcessorBuilder, ShutdownTimeout};
pub use span::Signal;
