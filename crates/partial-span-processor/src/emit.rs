use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use opentelemetry::{otel_warn, Key};
use opentelemetry_sdk::Resource;

use crate::envelope;
use crate::exporter::{LogExporterBoxed, PartialLogRecord};
use crate::span::{Signal, TrackedSpan};

/// Builds and hands off heartbeat/stop log records, per spec.md §4.4.
///
/// Shared between the scheduler thread (heartbeats) and `on_end` (stops);
/// holding no processor-lock of its own keeps emission outside the
/// scheduler's critical section, as spec.md §4.2 requires.
pub(crate) struct EmitPipeline {
    exporter: Arc<dyn LogExporterBoxed>,
    resource: RwLock<Resource>,
    heartbeat_interval_ms: u64,
}

impl EmitPipeline {
    pub(crate) fn new(exporter: Arc<dyn LogExporterBoxed>, heartbeat_interval_ms: u64) -> Self {
        Self {
            exporter,
            resource: RwLock::new(Resource::empty()),
            heartbeat_interval_ms,
        }
    }

    /// Lazily bound at first use, per spec.md §9 ("Resource propagation").
    pub(crate) fn set_resource(&self, resource: Resource) {
        *self.resource.write().expect("resource lock poisoned") = resource;
    }

    pub(crate) fn emit(&self, span: &TrackedSpan, signal: Signal, end_time: Option<SystemTime>) {
        let resource = self.resource.read().expect("resource lock poisoned").clone();
        let body = envelope::serialize(span, signal, end_time, &resource);
        let mut attributes = vec![(
            Key::from_static_str("partial.event"),
            signal.event_name().to_string(),
        )];
        match signal {
            Signal::Heartbeat => {
                attributes.push((
                    Key::from_static_str("partial.frequency"),
                    format!("{}ms", self.heartbeat_interval_ms),
                ));
                attributes.push((Key::from_static_str("partial.body.type"), "json/v1".to_string()));
            }
            Signal::Stop => {
                attributes.push((Key::from_static_str("partial.body.type"), "json/v1".to_string()));
            }
        }

        let record = PartialLogRecord {
            timestamp: SystemTime::now(),
            trace_id: span.trace_id,
            span_id: span.span_id,
            body,
            attributes,
        };

        // `export` is async only because `LogExporter` mirrors the host
        // SDK's exporter traits; the processor's own hooks are synchronous
        // (opentelemetry_sdk::trace::SpanProcessor), so we drive it inline.
        // Errors are logged and otherwise ignored: spec.md §7 ExporterRejected.
        if let Err(err) = futures_executor::block_on(self.exporter.export_boxed(record)) {
            otel_warn!(name: "PartialSpanProcessor.ExportFailed", reason = format!("{err}"));
        }
    }

    pub(crate) fn force_flush(&self) -> opentelemetry_sdk::error::OTelSdkResult {
        futures_executor::block_on(self.exporter.force_flush_boxed())
    }

    pub(crate) fn shutdown(&self, timeout: Duration) -> opentelemetry_sdk::error::OTelSdkResult {
        futures_executor::block_on(self.exporter.shutdown_boxed(timeout))
    }
}
