use opentelemetry::trace::{SpanKind, Status};
use opentelemetry::{Array, InstrumentationScope, KeyValue, Value};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use std::time::SystemTime;

use crate::span::{Signal, TrackedSpan};

/// Serializes a span snapshot into the OTLP-shaped JSON envelope spec.md
/// §4.5/§6 describes: a singleton `resource_spans[0].scope_spans[0].spans[0]`
/// tree. Treated as a pure function of `(span, signal, resource)`; no
/// processor state is read here.
pub(crate) fn serialize(span: &TrackedSpan, signal: Signal, end_time: Option<SystemTime>, resource: &Resource) -> String {
    let envelope = Envelope {
        resource_spans: [ResourceSpans {
            resource: ResourceProto {
                attributes: key_values_to_json(resource.iter().map(|(k, v)| KeyValue::new(k.clone(), v.clone()))),
            },
            scope_spans: [ScopeSpans {
                scope: scope_to_json(&span.scope),
                spans: [span_to_json(span, signal, end_time)],
            }],
        }],
    };
    serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Serialize)]
struct Envelope {
    resource_spans: [ResourceSpans; 1],
}

#[derive(Serialize)]
struct ResourceSpans {
    resource: ResourceProto,
    scope_spans: [ScopeSpans; 1],
}

#[derive(Serialize)]
struct ResourceProto {
    attributes: Vec<AttributeJson>,
}

#[derive(Serialize)]
struct ScopeSpans {
    scope: ScopeJson,
    spans: [SpanJson; 1],
}

#[derive(Serialize)]
struct ScopeJson {
    name: String,
    version: String,
}

fn scope_to_json(scope: &InstrumentationScope) -> ScopeJson {
    ScopeJson {
        name: scope.name().to_string(),
        version: scope.version().unwrap_or_default().to_string(),
    }
}

#[derive(Serialize)]
struct AttributeJson {
    key: String,
    value: serde_json::Value,
}

fn key_values_to_json(attrs: impl IntoIterator<Item = KeyValue>) -> Vec<AttributeJson> {
    attrs
        .into_iter()
        .map(|kv| AttributeJson {
            key: kv.key.to_string(),
            value: value_to_json(&kv.value),
        })
        .collect()
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I64(i) => serde_json::Value::from(*i),
        Value::F64(f) => serde_json::Value::from(*f),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Array(Array::Bool(items)) => items.iter().copied().map(serde_json::Value::Bool).collect(),
        Value::Array(Array::I64(items)) => items.iter().copied().map(serde_json::Value::from).collect(),
        Value::Array(Array::F64(items)) => items.iter().copied().map(serde_json::Value::from).collect(),
        Value::Array(Array::String(items)) => items.iter().map(|s| serde_json::Value::String(s.to_string())).collect(),
        _ => serde_json::Value::Null,
    }
}

#[derive(Serialize)]
struct SpanJson {
    trace_id: String,
    span_id: String,
    trace_state: String,
    parent_span_id: String,
    flags: u32,
    name: String,
    kind: u32,
    start_time_unix_nano: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time_unix_nano: Option<u64>,
    attributes: Vec<AttributeJson>,
    events: Vec<EventJson>,
    links: Vec<LinkJson>,
    status: StatusJson,
}

#[derive(Serialize)]
struct EventJson {
    name: String,
    time_unix_nano: u64,
    attributes: Vec<AttributeJson>,
}

#[derive(Serialize)]
struct LinkJson {
    trace_id: String,
    span_id: String,
    attributes: Vec<AttributeJson>,
}

#[derive(Serialize)]
struct StatusJson {
    code: u32,
    message: String,
}

fn span_to_json(span: &TrackedSpan, signal: Signal, end_time: Option<SystemTime>) -> SpanJson {
    SpanJson {
        trace_id: span.trace_id.to_string(),
        span_id: span.span_id.to_string(),
        trace_state: span.trace_state.clone(),
        parent_span_id: span.parent_span_id.to_string(),
        flags: span.flags as u32,
        name: span.name.clone(),
        kind: span_kind_code(span.kind),
        start_time_unix_nano: unix_nanos(span.start_time),
        end_time_unix_nano: match signal {
            Signal::Stop => end_time.map(unix_nanos),
            Signal::Heartbeat => None,
        },
        attributes: key_values_to_json(span.attributes.iter().cloned()),
        events: span
            .events
            .iter()
            .map(|e| EventJson {
                name: e.name.clone(),
                time_unix_nano: unix_nanos(e.timestamp),
                attributes: key_values_to_json(e.attributes.iter().cloned()),
            })
            .collect(),
        links: span
            .links
            .iter()
            .map(|l| LinkJson {
                trace_id: l.trace_id.to_string(),
                span_id: l.span_id.to_string(),
                attributes: key_values_to_json(l.attributes.iter().cloned()),
            })
            .collect(),
        status: status_to_json(&span.status),
    }
}

fn span_kind_code(kind: SpanKind) -> u32 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
        SpanKind::Consumer => 5,
    }
}

fn status_to_json(status: &Status) -> StatusJson {
    match status {
        Status::Unset => StatusJson { code: 0, message: String::new() },
        Status::Ok => StatusJson { code: 1, message: String::new() },
        Status::Error { description } => StatusJson {
            code: 2,
            message: description.to_string(),
        },
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{TrackedLink, TrackedEvent};
    use opentelemetry::trace::{SpanId, TraceId};

    fn sample_span() -> TrackedSpan {
        TrackedSpan {
            trace_id: TraceId::from_u128(1),
            span_id: SpanId::from_bytes(2u64.to_be_bytes()),
            parent_span_id: SpanId::INVALID,
            trace_state: String::new(),
            flags: 0,
            name: "op".to_string(),
            kind: SpanKind::Server,
            start_time: SystemTime::UNIX_EPOCH,
            attributes: vec![KeyValue::new("k", "v")],
            events: vec![TrackedEvent {
                name: "ev".to_string(),
                timestamp: SystemTime::UNIX_EPOCH,
                attributes: Vec::new(),
            }],
            links: vec![TrackedLink {
                trace_id: TraceId::from_u128(2),
                span_id: SpanId::from_bytes(3u64.to_be_bytes()),
                attributes: Vec::new(),
            }],
            status: Status::Ok,
            scope: InstrumentationScope::builder("partial-span-processor").build(),
        }
    }

    #[test]
    fn heartbeat_omits_end_time() {
        let resource = Resource::empty();
        let body = serialize(&sample_span(), Signal::Heartbeat, None, &resource);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let span = &value["resource_spans"][0]["scope_spans"][0]["spans"][0];
        assert!(span.get("end_time_unix_nano").is_none());
        assert_eq!(span["span_id"], "0000000000000002");
    }

    #[test]
    fn stop_includes_end_time() {
        let resource = Resource::empty();
        let body = serialize(&sample_span(), Signal::Stop, Some(SystemTime::UNIX_EPOCH), &resource);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let span = &value["resource_spans"][0]["scope_spans"][0]["spans"][0];
        assert_eq!(span["end_time_unix_nano"], 0);
    }

    #[test]
    fn round_trip_has_single_element_arrays() {
        let resource = Resource::empty();
        let body = serialize(&sample_span(), Signal::Heartbeat, None, &resource);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["resource_spans"].as_array().unwrap().len(), 1);
        assert_eq!(value["resource_spans"][0]["scope_spans"].as_array().unwrap().len(), 1);
        assert_eq!(
            value["resource_spans"][0]["scope_spans"][0]["spans"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn non_default_trace_state_and_flags_round_trip() {
        let mut span = sample_span();
        span.trace_state = "congo=t61rcWkgMzE".to_string();
        span.flags = opentelemetry::trace::TraceFlags::SAMPLED.to_u8();

        let resource = Resource::empty();
        let body = serialize(&span, Signal::Heartbeat, None, &resource);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let span_json = &value["resource_spans"][0]["scope_spans"][0]["spans"][0];

        assert_eq!(span_json["trace_state"], "congo=t61rcWkgMzE");
        assert_eq!(span_json["flags"], 1);
    }
}
