use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::Key;
use opentelemetry_sdk::error::OTelSdkResult;

/// A single heartbeat/stop record handed to the log exporter.
///
/// Mirrors the shape spec.md §6 calls "LogRecord (external)": a timestamp,
/// the owning span's identifiers, an opaque serialized body, and the fixed
/// `partial.*` attribute set from §4.4.
#[derive(Debug, Clone)]
pub struct PartialLogRecord {
    pub timestamp: SystemTime,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub body: String,
    pub attributes: Vec<(Key, String)>,
}

/// Sink for heartbeat/stop records produced by the processor.
///
/// Written as a native-async trait so concrete exporters read like any other
/// `async fn` implementation; it is not object-safe, so the processor stores
/// exporters behind [`LogExporterBoxed`] instead.
pub trait LogExporter: Send + Sync + 'static {
    /// Exports a single-element batch, per spec.md §4.4 step 3.
    fn export(&self, record: PartialLogRecord) -> impl Future<Output = OTelSdkResult> + Send;

    /// Flushes any buffering the exporter itself performs. The processor
    /// core does no buffering of its own (spec.md §1 Non-goals).
    fn force_flush(&self) -> impl Future<Output = OTelSdkResult> + Send {
        async { Ok(()) }
    }

    /// Releases exporter resources. `timeout` is best-effort; exporters that
    /// cannot bound their own shutdown may ignore it.
    fn shutdown(&self, timeout: Duration) -> impl Future<Output = OTelSdkResult> + Send;
}

/// Object-safe counterpart of [`LogExporter`], used everywhere the processor
/// needs to hold an exporter behind a trait object.
pub trait LogExporterBoxed: Send + Sync + 'static {
    fn export_boxed(&self, record: PartialLogRecord) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>>;

    fn force_flush_boxed(&self) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>>;

    fn shutdown_boxed(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>>;
}

impl<T: LogExporter> LogExporterBoxed for T {
    fn export_boxed(&self, record: PartialLogRecord) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>> {
        Box::pin(self.export(record))
    }

    fn force_flush_boxed(&self) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>> {
        Box::pin(self.force_flush())
    }

    fn shutdown_boxed(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = OTelSdkResult> + Send + '_>> {
        Box::pin(self.shutdown(timeout))
    }
}

/// Exporter that writes each record to stdout as a single JSON line.
///
/// Intended for local debugging and the bundled demo, not production use.
pub struct StdoutLogExporter;

impl LogExporter for StdoutLogExporter {
    async fn export(&self, record: PartialLogRecord) -> OTelSdkResult {
        println!(
            "{{\"trace_id\":\"{}\",\"span_id\":\"{}\",\"body\":{}}}",
            record.trace_id, record.span_id, record.body
        );
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

/// Exporter that discards every record. Useful for benchmarking the
/// scheduler in isolation from I/O.
pub struct NullLogExporter;

impl LogExporter for NullLogExporter {
    async fn export(&self, _record: PartialLogRecord) -> OTelSdkResult {
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}
