use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::Context;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use opentelemetry_sdk::Resource;

use crate::emit::EmitPipeline;
use crate::error::PartialSpanError;
use crate::exporter::LogExporterBoxed;
use crate::scheduler::{ProcessorState, Scheduler};
use crate::span::{Signal, TrackedSpan};

const DEFAULT_HEARTBEAT_INTERVAL_MS: i64 = 5000;
const DEFAULT_INITIAL_DELAY_MS: i64 = 5000;
const DEFAULT_PROCESS_INTERVAL_MS: i64 = 5000;

/// How long [`PartialSpanProcessor::shutdown_with_timeout`] waits for the
/// scheduler thread and the exporter to stop, per spec.md §5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTimeout {
    /// Signal and return immediately; do not join the scheduler thread.
    NoWait,
    /// Wait as long as it takes.
    Infinite,
    /// Wait up to the given duration, leaving the remainder (never
    /// negative) for the exporter's own shutdown.
    After(Duration),
}

/// A [`SpanProcessor`] that emits periodic heartbeat and final stop log
/// records for in-flight spans, so an upstream collector can reconstruct a
/// trace even if the process never calls `on_end`.
pub struct PartialSpanProcessor {
    state: Arc<Mutex<ProcessorState>>,
    scheduler: Arc<Scheduler>,
    emit: Arc<EmitPipeline>,
    initial_heartbeat_delay: Duration,
    disposed: AtomicBool,
}

impl PartialSpanProcessor {
    pub fn builder() -> PartialSpanProcessorBuilder {
        PartialSpanProcessorBuilder::default()
    }

    /// Signals the scheduler to exit, joins it within `timeout`, then
    /// forwards shutdown to the log exporter with the remaining budget.
    /// Returns `true` only if both shutdowns succeeded.
    pub fn shutdown_with_timeout(&self, timeout: ShutdownTimeout) -> bool {
        match timeout {
            ShutdownTimeout::NoWait => {
                let signaled = self.scheduler.shutdown(Duration::ZERO);
                let exported = self.emit.shutdown(Duration::ZERO).is_ok();
                signaled && exported
            }
            ShutdownTimeout::Infinite => {
                let joined = self.scheduler.shutdown(Duration::MAX);
                let exported = self.emit.shutdown(Duration::MAX).is_ok();
                joined && exported
            }
            ShutdownTimeout::After(budget) => {
                let start = std::time::Instant::now();
                let joined = self.scheduler.shutdown(budget);
                let remaining = budget.saturating_sub(start.elapsed());
                let exported = self.emit.shutdown(remaining).is_ok();
                joined && exported
            }
        }
    }

    /// Idempotent release of the scheduler signal and exporter.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_with_timeout(ShutdownTimeout::NoWait);
    }
}

impl SpanProcessor for PartialSpanProcessor {
    fn on_start(&self, span: &mut Span, _cx: &Context) {
        let tracked = Arc::new(TrackedSpan::from_live_span(span));
        let mut guard = self.state.lock().expect("processor state mutex poisoned");
        guard.start(tracked, std::time::Instant::now(), self.initial_heartbeat_delay);
    }

    fn on_end(&self, data: SpanData) {
        let span_id = data.span_context.span_id();
        let (removed, stop_owed) = {
            let mut guard = self.state.lock().expect("processor state mutex poisoned");
            guard.end(span_id)
        };
        let Some(previous) = removed else {
            return;
        };
        if !stop_owed {
            // Ended within the initial delay: never disclosed, no stop either.
            return;
        }
        let mut snapshot = (*previous).clone();
        snapshot.refresh_from_end(&data);
        self.emit.emit(&snapshot, Signal::Stop, Some(data.end_time));
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.scheduler.run_once();
        self.emit.force_flush()
    }

    fn shutdown(&self) -> OTelSdkResult {
        if self.shutdown_with_timeout(ShutdownTimeout::Infinite) {
            Ok(())
        } else {
            Err(OTelSdkError::InternalError(
                "partial span processor shutdown did not complete cleanly".to_string(),
            ))
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.emit.set_resource(resource.clone());
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        if PartialSpanProcessor::shutdown_with_timeout(self, ShutdownTimeout::After(timeout)) {
            Ok(())
        } else {
            Err(OTelSdkError::InternalError(
                "partial span processor shutdown did not complete within timeout".to_string(),
            ))
        }
    }
}

/// Validates construction parameters and starts the background scheduler.
///
/// spec.md §4.1: any invalid parameter fails construction with an
/// "invalid argument" error naming the offending field; nothing is started
/// until all parameters pass validation.
pub struct PartialSpanProcessorBuilder {
    log_exporter: Option<Arc<dyn LogExporterBoxed>>,
    heartbeat_interval_ms: i64,
    initial_heartbeat_delay_ms: i64,
    process_interval_ms: i64,
}

impl Default for PartialSpanProcessorBuilder {
    fn default() -> Self {
        Self {
            log_exporter: None,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            initial_heartbeat_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            process_interval_ms: DEFAULT_PROCESS_INTERVAL_MS,
        }
    }
}

impl PartialSpanProcessorBuilder {
    pub fn with_log_exporter(mut self, exporter: Arc<dyn LogExporterBoxed>) -> Self {
        self.log_exporter = Some(exporter);
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, value: i64) -> Self {
        self.heartbeat_interval_ms = value;
        self
    }

    pub fn with_initial_heartbeat_delay_ms(mut self, value: i64) -> Self {
        self.initial_heartbeat_delay_ms = value;
        self
    }

    pub fn with_process_interval_ms(mut self, value: i64) -> Self {
        self.process_interval_ms = value;
        self
    }

    pub fn build(self) -> Result<PartialSpanProcessor, PartialSpanError> {
        let Some(log_exporter) = self.log_exporter else {
            return Err(PartialSpanError::invalid("log_exporter", "must not be null"));
        };
        if self.heartbeat_interval_ms <= 0 {
            return Err(PartialSpanError::invalid(
                "heartbeat_interval_ms",
                format!("must be positive, got {}", self.heartbeat_interval_ms),
            ));
        }
        if self.initial_heartbeat_delay_ms < 0 {
            return Err(PartialSpanError::invalid(
                "initial_heartbeat_delay_ms",
                format!("must be non-negative, got {}", self.initial_heartbeat_delay_ms),
            ));
        }
        if self.process_interval_ms < 0 {
            return Err(PartialSpanError::invalid(
                "process_interval_ms",
                format!("must be non-negative, got {}", self.process_interval_ms),
            ));
        }

        let heartbeat_interval = Duration::from_millis(self.heartbeat_interval_ms as u64);
        let initial_heartbeat_delay = Duration::from_millis(self.initial_heartbeat_delay_ms as u64);
        let process_interval = Duration::from_millis(self.process_interval_ms as u64);

        let state = Arc::new(Mutex::new(ProcessorState::default()));
        let emit = Arc::new(EmitPipeline::new(log_exporter, self.heartbeat_interval_ms as u64));
        let scheduler = Scheduler::spawn(Arc::clone(&state), Arc::clone(&emit), heartbeat_interval, process_interval);

        Ok(PartialSpanProcessor {
            state,
            scheduler,
            emit,
            initial_heartbeat_delay,
            disposed: AtomicBool::new(false),
        })
    }
}
