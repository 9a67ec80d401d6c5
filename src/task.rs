//! Lifecycle of one synthesis task: arming a cancellation pair, running the
//! native call on a worker thread, and reporting the outcome as events.
//!
//! All transitions (`start`, `stop`, run cleanup) happen under one per-task
//! lock. The run itself only holds the lock for its final cleanup, so `stop`
//! can always reach the native cancel token of an in-flight call.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::bridge::{encode_payload, NativeBridge};
use crate::cancel::{CancelHandle, CancelSignal, OwnedCancelToken};
use crate::engine::NativeEngine;
use crate::error::SynthesisError;
use crate::native::NativeApi;
use crate::note::SynthesisData;
use crate::payload::PayloadBuilder;
use crate::reconcile::{reconcile, SynthesisResult};
use crate::snapshot::NoteSnapshot;

const WORKER_THREAD_NAME: &str = "neutrino-tau-synthesis";

#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Only `1.0`, emitted right before [`SynthesisEvent::Complete`].
    Progress(f64),
    Complete(SynthesisResult),
    Error(String),
}

#[derive(Default)]
struct EventHub {
    subscribers: Mutex<Vec<mpsc::Sender<SynthesisEvent>>>,
}

impl EventHub {
    fn subscribe(&self) -> mpsc::Receiver<SynthesisEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn emit(&self, event: SynthesisEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[derive(Default)]
struct TaskState {
    signal: Option<CancelSignal>,
    native_token: Option<OwnedCancelToken>,
    worker: Option<JoinHandle<()>>,
}

impl TaskState {
    fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }
}

struct TaskInner {
    api: Arc<dyn NativeApi>,
    engine: Option<Arc<NativeEngine>>,
    voice_id: String,
    data: Arc<dyn SynthesisData>,
    snapshot: NoteSnapshot,
    state: Mutex<TaskState>,
    events: EventHub,
}

/// A synthesis job bound to one segment.
///
/// `start`, `stop` and `set_dirty` may be called from any thread at any time.
/// Results arrive through [`SynthesisTask::subscribe`].
pub struct SynthesisTask {
    inner: Arc<TaskInner>,
}

impl SynthesisTask {
    /// Snapshots the segment's notes immediately. A task without an engine
    /// reports an error on every run.
    pub fn new(
        data: Arc<dyn SynthesisData>,
        api: Arc<dyn NativeApi>,
        engine: Option<Arc<NativeEngine>>,
        voice_id: &str,
    ) -> Self {
        let snapshot = NoteSnapshot::capture(data.as_ref());
        Self {
            inner: Arc::new(TaskInner {
                api,
                engine,
                voice_id: voice_id.to_string(),
                data,
                snapshot,
                state: Mutex::new(TaskState::default()),
                events: EventHub::default(),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SynthesisEvent> {
        self.inner.events.subscribe()
    }

    /// Launches a run unless one is still in flight, in which case the call
    /// is ignored. A run counts as in flight until its worker thread has
    /// exited, which is slightly after `Complete` or `Error` is delivered,
    /// so a `start` issued straight from an event handler may be dropped.
    /// Poll [`SynthesisTask::is_running`] before restarting in that case.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.is_running() {
            tracing::debug!(voice = %inner.voice_id, "Synthesis already running, ignoring start");
            return;
        }

        if let Some(previous) = state.signal.take() {
            previous.cancel();
        }
        state.native_token = None;
        state.worker = None;

        let Some(native_token) = OwnedCancelToken::create(&inner.api) else {
            tracing::warn!("Native cancel token creation failed");
            inner
                .events
                .emit(SynthesisEvent::Error(SynthesisError::CancelTokenUnavailable.to_string()));
            return;
        };

        let signal = CancelSignal::new();
        let handle = native_token.handle();
        let run_inner = Arc::clone(inner);
        let run_signal = signal.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || run_inner.run(run_signal, handle));

        match spawned {
            Ok(worker) => {
                tracing::debug!(voice = %inner.voice_id, notes = inner.snapshot.len(), "Synthesis started");
                state.signal = Some(signal);
                state.native_token = Some(native_token);
                state.worker = Some(worker);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to launch synthesis worker");
                inner.events.emit(SynthesisEvent::Error(format!(
                    "Failed to launch synthesis worker: {e}"
                )));
            }
        }
    }

    /// Requests cancellation, locally and inside the native call. Returns
    /// without waiting for the run to notice.
    pub fn stop(&self) {
        let state = self.inner.lock_state();
        if let Some(signal) = &state.signal {
            signal.cancel();
        }
        if let Some(token) = &state.native_token {
            token.cancel();
        }
        tracing::debug!(voice = %self.inner.voice_id, "Synthesis stop requested");
    }

    /// Any edit invalidates the in-flight run.
    pub fn set_dirty(&self, reason: &str) {
        tracing::trace!(reason, "Synthesis task marked dirty");
        self.stop();
    }

    /// The engine has no pause point; accepted and ignored.
    pub fn suspend(&self) {}

    pub fn resume(&self) {}

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().is_running()
    }

    pub fn voice_id(&self) -> &str {
        &self.inner.voice_id
    }

    pub fn snapshot(&self) -> &NoteSnapshot {
        &self.inner.snapshot
    }
}

impl TaskInner {
    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, signal: CancelSignal, token: CancelHandle) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.synthesize(&signal, token)))
            .unwrap_or_else(|payload| Err(SynthesisError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    samples = result.samples.len(),
                    phoneme_notes = result.synthesized_phonemes.len(),
                    "Synthesis completed"
                );
                self.events.emit(SynthesisEvent::Progress(1.0));
                self.events.emit(SynthesisEvent::Complete(result));
            }
            Err(SynthesisError::Cancelled) => {
                tracing::debug!("Synthesis cancelled");
            }
            Err(e) if signal.is_cancelled() => {
                tracing::debug!(error = %e, "Synthesis failed after cancellation");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis failed");
                self.events
                    .emit(SynthesisEvent::Error(format!("Native synthesis failed: {e}")));
            }
        }

        self.release_token(token);
    }

    /// Checkpoints: before encoding, after the native call, after decoding.
    fn synthesize(
        &self,
        signal: &CancelSignal,
        token: CancelHandle,
    ) -> Result<SynthesisResult, SynthesisError> {
        let payload = PayloadBuilder::new(&self.snapshot, self.data.as_ref(), &self.voice_id).build();
        let engine = self
            .engine
            .as_deref()
            .ok_or(SynthesisError::EngineNotInitialized)?;
        signal.check()?;

        let request = encode_payload(&payload)?;
        let reply = NativeBridge::new(engine).call(&request, token);
        signal.check()?;

        let response = reply.decode()?;
        signal.check()?;

        Ok(reconcile(&self.snapshot, response))
    }

    /// Destroys the token only if a newer `start` has not replaced it.
    fn release_token(&self, token: CancelHandle) {
        let mut state = self.lock_state();
        if state
            .native_token
            .as_ref()
            .is_some_and(|owned| owned.handle() == token)
        {
            state.native_token = None;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
