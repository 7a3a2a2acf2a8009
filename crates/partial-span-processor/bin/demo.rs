//! # Partial Span Processor Demo
//!
//! Starts a handful of spans of varying duration against a
//! `PartialSpanProcessor` wired to a stdout exporter, so you can watch
//! heartbeat and stop records arrive in real time.
//!
//! ## Running
//!
//! ```bash
//! cargo run -p partial-span-processor --bin partial-span-demo --release
//! ```

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{Span as _, Tracer, TracerProvider as _};
use opentelemetry_sdk::trace::TracerProvider;
use partial_span_processor::{PartialSpanProcessor, StdoutLogExporter};

fn main() {
    let processor = PartialSpanProcessor::builder()
        .with_log_exporter(Arc::new(StdoutLogExporter))
        .with_heartbeat_interval_ms(500)
        .with_initial_heartbeat_delay_ms(500)
        .with_process_interval_ms(100)
        .build()
        .expect("demo configuration is valid");

    let provider = TracerProvider::builder().with_span_processor(processor).build();
    let tracer = provider.tracer("partial-span-demo");

    println!("starting a short-lived span (ends before its first heartbeat)...");
    let mut quick = tracer.start("quick-operation");
    std::thread::sleep(Duration::from_millis(200));
    quick.end();

    println!("starting a long-lived span (several heartbeats, then a stop)...");
    let mut slow = tracer.start("slow-operation");
    std::thread::sleep(Duration::from_millis(2200));
    slow.end();

    println!("shutting down...");
    provider
        .shutdown()
        .expect("provider shutdown should forward to the processor cleanly");
}
