pub mod alerts;
pub mod captions;

pub use alerts::{AlertBoard, AlertEvent, AlertInterpreter, ALERT_TTL};
pub use captions::{CaptionInterpreter, CaptionMode, TranscriptBuffer};

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::CaptureBackend;
use crate::live::{EncodedChunk, LiveConfig, LiveSession, ServerEvent, SessionHandle, Transport};

/// Feature-specific interpretation of decoded server events.
///
/// The engine owns the control flow; a strategy only decides what transcript
/// text and model text mean for its feature.
pub trait EventInterpreter: Send {
    fn on_event(&mut self, event: &ServerEvent);

    /// Called once from the teardown path; cancel feature timers here.
    fn on_teardown(&mut self) {}
}

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Active,
}

/// Per-feature state machine tying capture, session, and feature state
/// together.
///
/// While `Active`, exactly one capture source and one session handle are
/// live; every exit path (user stop, remote error, remote close, device
/// loss) converges on the same teardown routine that closes both together.
pub struct Supervisor {
    live_config: LiveConfig,
    state: Arc<Mutex<SupervisorState>>,
    stop_requested: Arc<AtomicBool>,
    // Replaced on every start(): a permit stored by a stop() that raced an
    // earlier open must not tear down the next session.
    stop_notify: Mutex<Arc<Notify>>,
    interpreter: Arc<Mutex<Option<Box<dyn EventInterpreter>>>>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(live_config: LiveConfig, interpreter: Box<dyn EventInterpreter>) -> Self {
        Self {
            live_config,
            state: Arc::new(Mutex::new(SupervisorState::Stopped)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            stop_notify: Mutex::new(Arc::new(Notify::new())),
            interpreter: Arc::new(Mutex::new(Some(interpreter))),
            run_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sequence capture start and session open, then run the frame pump and
    /// event loop until a terminal condition.
    ///
    /// Fails without leaving anything half-open: a capture failure opens no
    /// session, a session failure stops the capture, and a `stop()` that
    /// raced the open closes the freshly resolved handle immediately.
    pub async fn start(
        &self,
        mut backend: Box<dyn CaptureBackend>,
        transport: Arc<dyn Transport>,
    ) -> Result<()> {
        let stop_notify = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SupervisorState::Stopped {
                warn!("supervisor already started");
                return Ok(());
            }
            // Fresh stop signal for this attempt; whatever a raced stop()
            // left behind belongs to the previous session.
            self.stop_requested.store(false, Ordering::SeqCst);
            let fresh = Arc::new(Notify::new());
            *self.stop_notify.lock().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&fresh);
            *state = SupervisorState::Starting;
            fresh
        };

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                // Terminal for this attempt (PermissionDenied stays visible
                // on the backend state); nothing else was acquired.
                self.set_stopped();
                return Err(e).context("failed to start audio capture");
            }
        };

        if self.stop_requested.load(Ordering::SeqCst) {
            self.abort_start(backend, None).await;
            return Ok(());
        }

        let handle = match LiveSession::open(transport.as_ref(), &self.live_config).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_start(backend, None).await;
                return Err(e);
            }
        };

        if self.stop_requested.load(Ordering::SeqCst) {
            // stop() landed while open() was in flight: close the handle
            // now rather than leaving it open
            self.abort_start(backend, Some(&handle)).await;
            return Ok(());
        }

        let mut events = handle
            .events()
            .context("session event sequence already taken")?;
        let mut interpreter = self
            .interpreter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .context("supervisor interpreter unavailable")?;

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SupervisorState::Active;
        info!("supervisor active");

        let state = Arc::clone(&self.state);
        let interpreter_slot = Arc::clone(&self.interpreter);
        let mut frames = frames;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_frame = frames.recv() => match maybe_frame {
                        Some(frame) => {
                            // Active: encode and forward in capture order
                            handle.send(EncodedChunk::from_frame(&frame));
                        }
                        None => {
                            warn!("capture source ended (device lost); stopping");
                            break;
                        }
                    },
                    maybe_event = events.recv() => match maybe_event {
                        Some(ServerEvent::Connected) => debug!("session ready"),
                        Some(ServerEvent::Error(detail)) => {
                            error!("live session error: {}", detail);
                            break;
                        }
                        Some(ServerEvent::Closed) | None => {
                            info!("live session closed");
                            break;
                        }
                        Some(event) => interpreter.on_event(&event),
                    },
                    _ = stop_notify.notified() => {
                        info!("stop requested");
                        break;
                    }
                }
            }

            teardown(&mut backend, Some(&handle), Some(interpreter.as_mut())).await;

            *interpreter_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(interpreter);
            *state.lock().unwrap_or_else(|e| e.into_inner()) = SupervisorState::Stopped;
            info!("supervisor stopped");
        });

        *self.run_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(())
    }

    /// Request teardown. Idempotent (a stop on a stopped supervisor is a
    /// no-op), non-blocking, and safe to call from within an event callback
    /// or while `start()` is still resolving.
    pub fn stop(&self) {
        if self.state() == SupervisorState::Stopped {
            debug!("stop on a stopped supervisor is a no-op");
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .notify_one();
    }

    /// Wait for the run loop (if any) to finish its teardown.
    pub async fn join(&self) {
        let task = self.run_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("supervisor run task panicked: {}", e);
            }
        }
    }

    async fn abort_start(
        &self,
        mut backend: Box<dyn CaptureBackend>,
        handle: Option<&SessionHandle>,
    ) {
        teardown(&mut backend, handle, None).await;
        self.set_stopped();
    }

    fn set_stopped(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SupervisorState::Stopped;
    }
}

/// The single convergent teardown routine: session and capture are released
/// together and nothing here can fail outward.
async fn teardown(
    backend: &mut Box<dyn CaptureBackend>,
    handle: Option<&SessionHandle>,
    interpreter: Option<&mut dyn EventInterpreter>,
) {
    if let Some(handle) = handle {
        handle.close();
    }
    if let Err(e) = backend.stop().await {
        error!("capture teardown failed: {:#}", e);
    }
    if let Some(interpreter) = interpreter {
        interpreter.on_teardown();
    }
}
