use std::time::SystemTime;

use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_sdk::trace::{Span, SpanData, SpanEvents, SpanLinks};

/// Which record is being emitted for a span.
///
/// Determines the attribute set the emit pipeline attaches and whether the
/// serialized envelope carries an end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A periodic snapshot of a still-active span.
    Heartbeat,
    /// The final snapshot of a span whose `on_end` has been observed.
    Stop,
}

impl Signal {
    pub(crate) fn event_name(self) -> &'static str {
        match self {
            Signal::Heartbeat => "heartbeat",
            Signal::Stop => "stop",
        }
    }
}

/// A snapshot of an active span, captured once at `on_start` and held by the
/// registry for as long as the span stays active.
///
/// `opentelemetry_sdk::trace::Span` does not let a processor poll it for
/// fresh attribute state between hooks, so every heartbeat reserializes this
/// same snapshot; only the heartbeat record's own `timestamp` and the final
/// stop record's `end_time` (taken from the `SpanData` passed to `on_end`)
/// advance. See DESIGN.md for the open-question resolution.
#[derive(Debug, Clone)]
pub struct TrackedSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: SpanId,
    pub trace_state: String,
    pub flags: u8,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<TrackedEvent>,
    pub links: Vec<TrackedLink>,
    pub status: Status,
    pub scope: InstrumentationScope,
}

/// Flattened copy of an `opentelemetry_sdk::trace::SpanEvents` entry.
#[derive(Debug, Clone)]
pub struct TrackedEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: Vec<KeyValue>,
}

/// Flattened copy of an `opentelemetry_sdk::trace::SpanLinks` entry.
#[derive(Debug, Clone)]
pub struct TrackedLink {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub attributes: Vec<KeyValue>,
}

impl TrackedSpan {
    /// Builds a snapshot from a span at `on_start`, before it has produced a
    /// `SpanData` of its own. `span_context`, `instrumentation_scope` and the
    /// other fields read here are the same ones the SDK later copies into
    /// `SpanData` when the span ends.
    pub(crate) fn from_live_span(span: &Span) -> Self {
        Self {
            trace_id: span.span_context.trace_id(),
            span_id: span.span_context.span_id(),
            parent_span_id: span.parent_span_id,
            trace_state: span.span_context.trace_state().header(),
            flags: span.span_context.trace_flags().to_u8(),
            name: span.name.clone().into_owned(),
            kind: span.span_kind.clone(),
            start_time: span.start_time,
            attributes: span.attributes.clone(),
            events: flatten_events(&span.events),
            links: flatten_links(&span.links),
            status: span.status.clone(),
            scope: span.instrumentation_scope.clone(),
        }
    }

    /// Refreshes status/attributes/events/links/name from the span's final
    /// snapshot, taken at `on_end`. Identifiers and start time never change.
    pub(crate) fn refresh_from_end(&mut self, data: &SpanData) {
        self.name = data.name.clone().into_owned();
        self.attributes = data.attributes.clone();
        self.events = flatten_events(&data.events);
        self.links = flatten_links(&data.links);
        self.status = data.status.clone();
    }
}

fn flatten_events(events: &SpanEvents) -> Vec<TrackedEvent> {
    events
        .iter()
        .map(|event| TrackedEvent {
            name: event.name.clone().into_owned(),
            timestamp: event.timestamp,
            attributes: event.attributes.clone(),
        })
        .collect()
}

fn flatten_links(links: &SpanLinks) -> Vec<TrackedLink> {
    links
        .iter()
        .map(|link| TrackedLink {
            trace_id: link.span_context.trace_id(),
            span_id: link.span_context.span_id(),
            attributes: link.attributes.clone(),
        })
        .collect()
}
