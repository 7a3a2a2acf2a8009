use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::trace::{Span as _, Tracer, TracerProvider as _};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::TracerProvider;
use partial_span_processor::{LogExporter, PartialLogRecord, PartialSpanProcessor};

/// Records every record handed to it, for assertions against the seed
/// scenarios. Implements the crate's public `LogExporter` trait directly,
/// the same way any downstream consumer would plug in a real sink.
#[derive(Default)]
struct RecordingExporter {
    records: Mutex<Vec<PartialLogRecord>>,
}

impl RecordingExporter {
    fn events_for(&self, span_id: opentelemetry::trace::SpanId) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.span_id == span_id)
            .map(|r| {
                r.attributes
                    .iter()
                    .find(|(k, _)| k.as_str() == "partial.event")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl LogExporter for RecordingExporter {
    async fn export(&self, record: PartialLogRecord) -> OTelSdkResult {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

fn provider_with(
    exporter: Arc<RecordingExporter>,
    heartbeat_interval_ms: i64,
    initial_delay_ms: i64,
) -> TracerProvider {
    let processor = PartialSpanProcessor::builder()
        .with_log_exporter(exporter)
        .with_heartbeat_interval_ms(heartbeat_interval_ms)
        .with_initial_heartbeat_delay_ms(initial_delay_ms)
        .with_process_interval_ms(0)
        .build()
        .expect("valid configuration should build");

    TracerProvider::builder().with_span_processor(processor).build()
}

/// Scenario 1: interval=1000, delay=0, process=0 — start A, wait 1600ms, end A.
/// Expect exactly 2 heartbeats then 1 stop, all bearing A's span id.
#[test]
fn emits_two_heartbeats_then_stop() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 1000, 0);
    let tracer = provider.tracer("test");

    let mut span = tracer.start("A");
    let span_id = span.span_context().span_id();
    std::thread::sleep(Duration::from_millis(1600));
    span.end();
    std::thread::sleep(Duration::from_millis(50));

    let events = exporter.events_for(span_id);
    assert_eq!(events, vec!["heartbeat", "heartbeat", "stop"]);
}

/// Scenario 2: interval=1000, delay=1000, process=0 — start A, immediately
/// end A (<100ms). Expect zero records: the span never left DelayedQueue.
#[test]
fn no_records_for_span_ended_within_initial_delay() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 1000, 1000);
    let tracer = provider.tracer("test");

    let mut span = tracer.start("A");
    let span_id = span.span_context().span_id();
    span.end();
    std::thread::sleep(Duration::from_millis(50));

    assert!(exporter.events_for(span_id).is_empty());
}

/// Scenario 3: interval=1000, delay=1000, process=0 — start A, wait 2500ms,
/// end A. Expect at least 2 heartbeats then exactly 1 stop.
#[test]
fn emits_heartbeats_then_stop_after_delay() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 1000, 1000);
    let tracer = provider.tracer("test");

    let mut span = tracer.start("A");
    let span_id = span.span_context().span_id();
    std::thread::sleep(Duration::from_millis(2500));
    span.end();
    std::thread::sleep(Duration::from_millis(50));

    let events = exporter.events_for(span_id);
    assert!(events.len() >= 3, "expected at least 2 heartbeats + 1 stop, got {events:?}");
    assert_eq!(events.last().unwrap(), "stop");
    assert!(events.iter().take(events.len() - 1).all(|e| e == "heartbeat"));
}

/// Scenario 4: interval=1000, delay=0, process=0 — start A then B, wait
/// 1200ms, end B, wait 1200ms, end A. Both get heartbeats; each gets exactly
/// one stop.
#[test]
fn interleaves_heartbeats_across_two_spans() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 1000, 0);
    let tracer = provider.tracer("test");

    let mut a = tracer.start("A");
    let a_id = a.span_context().span_id();
    let mut b = tracer.start("B");
    let b_id = b.span_context().span_id();

    std::thread::sleep(Duration::from_millis(1200));
    b.end();
    std::thread::sleep(Duration::from_millis(1200));
    a.end();
    std::thread::sleep(Duration::from_millis(50));

    let a_events = exporter.events_for(a_id);
    let b_events = exporter.events_for(b_id);

    assert!(a_events.contains(&"heartbeat".to_string()));
    assert!(b_events.contains(&"heartbeat".to_string()));
    assert_eq!(a_events.iter().filter(|e| *e == "stop").count(), 1);
    assert_eq!(b_events.iter().filter(|e| *e == "stop").count(), 1);
}

/// Scenario 5: shutdown while a span is active — the scheduler stops
/// producing heartbeats for it.
#[test]
fn shutdown_stops_further_heartbeats() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 200, 0);
    let tracer = provider.tracer("test");

    let span = tracer.start("A");
    let span_id = span.span_context().span_id();
    std::thread::sleep(Duration::from_millis(350));
    assert!(provider.shutdown().is_ok());

    let count_at_shutdown = exporter.events_for(span_id).len();
    std::thread::sleep(Duration::from_millis(500));
    let count_after_wait = exporter.events_for(span_id).len();

    assert_eq!(count_at_shutdown, count_after_wait);
}

/// `force_flush` should surface a due heartbeat immediately rather than
/// waiting for the scheduler's own next tick.
#[test]
fn force_flush_emits_a_due_heartbeat_without_waiting() {
    let exporter = Arc::new(RecordingExporter::default());
    // A huge process interval means the scheduler thread itself will not
    // tick during this test; only force_flush's explicit pass should.
    let processor = PartialSpanProcessor::builder()
        .with_log_exporter(exporter.clone())
        .with_heartbeat_interval_ms(1000)
        .with_initial_heartbeat_delay_ms(0)
        .with_process_interval_ms(3_600_000)
        .build()
        .expect("valid configuration should build");
    let provider = TracerProvider::builder().with_span_processor(processor).build();
    let tracer = provider.tracer("test");

    let span = tracer.start("A");
    let span_id = span.span_context().span_id();
    std::thread::sleep(Duration::from_millis(20));

    assert!(exporter.events_for(span_id).is_empty());
    assert!(provider.force_flush().is_ok());
    assert_eq!(exporter.events_for(span_id), vec!["heartbeat"]);
}

/// Scenario 6: construction with a negative heartbeat interval fails,
/// naming the offending parameter.
#[test]
fn invalid_heartbeat_interval_fails_construction() {
    let exporter = Arc::new(RecordingExporter::default());
    let err = PartialSpanProcessor::builder()
        .with_log_exporter(exporter)
        .with_heartbeat_interval_ms(-1)
        .build()
        .expect_err("negative interval must be rejected");

    assert!(format!("{err}").contains("heartbeat_interval_ms"));
}

/// End-to-end body contents for scenario 1: the heartbeat body decodes to
/// the expected OTLP-shaped path, with no end time; the stop body carries
/// the same path with an end time present.
#[test]
fn heartbeat_and_stop_bodies_round_trip() {
    let exporter = Arc::new(RecordingExporter::default());
    let provider = provider_with(exporter.clone(), 500, 0);
    let tracer = provider.tracer("test");

    let mut span = tracer.start("A");
    let span_id = span.span_context().span_id();
    std::thread::sleep(Duration::from_millis(700));
    span.end();
    std::thread::sleep(Duration::from_millis(50));

    let records: Vec<PartialLogRecord> = exporter
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.span_id == span_id)
        .cloned()
        .collect();
    assert!(!records.is_empty());

    let expected_span_id = span_id.to_string();
    for record in &records {
        let value: serde_json::Value = serde_json::from_str(&record.body).unwrap();
        let span_json = &value["resource_spans"][0]["scope_spans"][0]["spans"][0];
        assert_eq!(span_json["span_id"], expected_span_id);
    }

    let heartbeat = records
        .iter()
        .find(|r| !r.body.contains("\"end_time_unix_nano\""))
        .expect("at least one heartbeat body without end_time_unix_nano");
    let heartbeat_json: serde_json::Value = serde_json::from_str(&heartbeat.body).unwrap();
    assert!(heartbeat_json["resource_spans"][0]["scope_spans"][0]["spans"][0]
        .get("end_time_unix_nano")
        .is_none());

    let stop = records.last().unwrap();
    let stop_json: serde_json::Value = serde_json::from_str(&stop.body).unwrap();
    assert!(stop_json["resource_spans"][0]["scope_spans"][0]["spans"][0]
        .get("end_time_unix_nano")
        .is_some());
}
