use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use opentelemetry::otel_error;
use opentelemetry::trace::SpanId;

use crate::emit::EmitPipeline;
use crate::queue::{DelayedIndex, DelayedQueue, ReadyQueue};
use crate::registry::ActiveRegistry;
use crate::span::{Signal, TrackedSpan};

/// The four collections a span moves through, guarded by one mutex.
///
/// spec.md §5 prefers a single shared lock over sharded/lock-free structures:
/// the critical sections here are short, and "at most one queue per span" is
/// easiest to preserve under one lock.
#[derive(Default)]
pub(crate) struct ProcessorState {
    pub(crate) registry: ActiveRegistry,
    pub(crate) delayed: DelayedQueue,
    pub(crate) delayed_index: DelayedIndex,
    pub(crate) ready: ReadyQueue,
}

impl ProcessorState {
    /// `on_start`: register the span and enqueue its initial delayed
    /// heartbeat. Non-blocking aside from this one critical section.
    pub(crate) fn start(&mut self, span: Arc<TrackedSpan>, now: Instant, initial_delay: Duration) {
        let span_id = span.span_id;
        self.registry.insert(span);
        self.delayed.push(span_id, now + initial_delay);
        self.delayed_index.insert(span_id);
    }

    /// `on_end`: remove the span and report whether a stop record is owed —
    /// true iff the span had already left `DelayedQueue` (spec.md §4.1).
    pub(crate) fn end(&mut self, span_id: SpanId) -> (Option<Arc<TrackedSpan>>, bool) {
        let removed = self.registry.remove(span_id);
        let was_delayed = self.delayed_index.remove(span_id);
        (removed, !was_delayed)
    }
}

/// Owns the background worker and the shared state it drains.
///
/// A dedicated long-lived thread is preferred over timer-per-span to bound
/// thread count and centralize shutdown through one signal (spec.md §9).
pub(crate) struct Scheduler {
    pub(crate) state: Arc<Mutex<ProcessorState>>,
    emit: Arc<EmitPipeline>,
    heartbeat_interval: Duration,
    shutdown_tx: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Scheduler {
    pub(crate) fn spawn(
        state: Arc<Mutex<ProcessorState>>,
        emit: Arc<EmitPipeline>,
        heartbeat_interval: Duration,
        process_interval: Duration,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let worker_state = Arc::clone(&state);
        let worker_emit = Arc::clone(&emit);
        let handle = thread::Builder::new()
            .name("partial-span-processor-scheduler".to_string())
            .spawn(move || run(worker_state, worker_emit, heartbeat_interval, process_interval, shutdown_rx))
            .expect("failed to spawn partial span processor scheduler thread");

        Arc::new(Self {
            state,
            emit,
            heartbeat_interval,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Runs one DrainDelayed+DrainReady pass synchronously, outside the
    /// worker thread's own cadence, and emits whatever falls due.
    ///
    /// Used by `SpanProcessor::force_flush` to give pending heartbeats a
    /// chance to go out immediately rather than waiting for the next tick,
    /// without disturbing any span's pacing state.
    pub(crate) fn run_once(&self) {
        let now = Instant::now();
        let to_emit = drain_delayed(&self.state, now, self.heartbeat_interval);
        emit_batch(&self.emit, to_emit);
        let to_emit = drain_ready(&self.state, now, self.heartbeat_interval);
        emit_batch(&self.emit, to_emit);
    }

    /// Signals the worker to exit and joins it within `timeout`.
    ///
    /// Returns `true` iff the signal was delivered and the join completed in
    /// time. Idempotent: a second call after a successful shutdown is a
    /// no-op that returns `false` (spec.md §7 AlreadyShutDown).
    pub(crate) fn shutdown(&self, timeout: Duration) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        // A full channel (a prior signal already sent) is not an error here.
        let _ = self.shutdown_tx.try_send(());

        let Some(handle) = self.handle.lock().expect("scheduler handle mutex poisoned").take() else {
            return false;
        };

        if timeout.is_zero() {
            // "do not wait": detach the thread, it will exit on its own.
            return true;
        }
        if timeout == Duration::MAX {
            return handle.join().is_ok();
        }

        let joined = Arc::new(AtomicBool::new(false));
        let joined_writer = Arc::clone(&joined);
        let waiter = thread::spawn(move || {
            let ok = handle.join().is_ok();
            joined_writer.store(ok, Ordering::SeqCst);
        });
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if waiter.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        waiter.is_finished() && joined.load(Ordering::SeqCst)
    }
}

fn run(
    state: Arc<Mutex<ProcessorState>>,
    emit: Arc<EmitPipeline>,
    heartbeat_interval: Duration,
    process_interval: Duration,
    shutdown_rx: Receiver<()>,
) {
    loop {
        if process_interval.is_zero() {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => thread::yield_now(),
            }
        } else {
            match shutdown_rx.recv_timeout(process_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        let now = Instant::now();
        let to_emit = drain_delayed(&state, now, heartbeat_interval);
        emit_batch(&emit, to_emit);

        let to_emit = drain_ready(&state, now, heartbeat_interval);
        emit_batch(&emit, to_emit);
    }
}

/// DrainDelayed (spec.md §4.2): promote spans whose initial delay elapsed
/// into `ReadyQueue`, collecting their snapshot for heartbeat emission.
fn drain_delayed(state: &Mutex<ProcessorState>, now: Instant, heartbeat_interval: Duration) -> Vec<Arc<TrackedSpan>> {
    let mut collected = Vec::new();
    let mut guard = state.lock().expect("scheduler state mutex poisoned");
    while let Some(entry) = guard.delayed.pop_due(now) {
        guard.delayed_index.remove(entry.span_id);
        if let Some(span) = guard.registry.lookup(entry.span_id) {
            guard.ready.push(entry.span_id, now + heartbeat_interval);
            collected.push(span);
        }
        // Span ended before its first heartbeat: dropped silently.
    }
    collected
}

/// DrainReady (spec.md §4.2): re-enqueue spans still active and collect
/// their snapshot for this tick's heartbeat emission.
fn drain_ready(state: &Mutex<ProcessorState>, now: Instant, heartbeat_interval: Duration) -> Vec<Arc<TrackedSpan>> {
    let mut collected = Vec::new();
    let mut guard = state.lock().expect("scheduler state mutex poisoned");
    while let Some(entry) = guard.ready.pop_due(now) {
        if let Some(span) = guard.registry.lookup(entry.span_id) {
            guard.ready.push(entry.span_id, now + heartbeat_interval);
            collected.push(span);
        }
        // Span ended: silently dropped, per the tombstoning policy.
    }
    collected
}

/// Emits a batch outside the scheduler lock. A panicking serializer or
/// exporter is caught so one bad span never stops heartbeats for the rest
/// of this tick or any other span (spec.md §7 BackgroundPanic).
fn emit_batch(emit: &EmitPipeline, spans: Vec<Arc<TrackedSpan>>) {
    for span in spans {
        let result = panic::catch_unwind(AssertUnwindSafe(|| emit.emit(&span, Signal::Heartbeat, None)));
        if result.is_err() {
            otel_error!(
                name: "PartialSpanProcessor.HeartbeatPanic",
                span_id = format!("{}", span.span_id)
            );
        }
    }
}
