use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry::trace::SpanId;

use crate::span::TrackedSpan;

/// Index of spans observed via `on_start` that have not yet been observed via
/// `on_end`.
///
/// This type holds no lock of its own — it is one of the four collections
/// `scheduler::ProcessorState` guards behind a single `Mutex`, per the
/// concurrency design in spec.md §5. Its methods take `&mut self` and are
/// only ever called while that outer lock is held.
#[derive(Debug, Default)]
pub(crate) struct ActiveRegistry {
    spans: HashMap<SpanId, Arc<TrackedSpan>>,
}

impl ActiveRegistry {
    pub(crate) fn insert(&mut self, span: Arc<TrackedSpan>) {
        self.spans.insert(span.span_id, span);
    }

    /// Removes a span, returning it if it was present.
    pub(crate) fn remove(&mut self, span_id: SpanId) -> Option<Arc<TrackedSpan>> {
        self.spans.remove(&span_id)
    }

    pub(crate) fn lookup(&self, span_id: SpanId) -> Option<Arc<TrackedSpan>> {
        self.spans.get(&span_id).cloned()
    }

    pub(crate) fn contains(&self, span_id: SpanId) -> bool {
        self.spans.contains_key(&span_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }

    /// Enumerate-snapshot used only for diagnostics/tests.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<Arc<TrackedSpan>> {
        self.spans.values().cloned().collect()
    }
}
