use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::wire::{self, EncodedChunk, ServerEvent};

/// Configuration for one live connection, sent in the setup message.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Remote model identifier
    pub model: String,
    /// System instruction steering the remote (transcribe vs label sounds)
    pub system_instruction: String,
    /// Ask the remote to transcribe the input audio
    pub input_transcription: bool,
}

/// Connection lifecycle of a [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Raw inbound item from a transport connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One textual wire message
    Message(String),
    /// Transport-level failure (connection keeps winding down afterwards)
    Error(String),
}

/// One established bidirectional connection, as channels of text frames.
///
/// The inbound channel closing means the remote (or the transport) closed
/// the connection.
pub struct TransportConn {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Narrow seam over the concrete streaming client.
///
/// The session and everything above it only ever see this interface, never
/// transport-specific types.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection and deliver the setup message.
    async fn connect(&self, setup: String) -> Result<TransportConn>;
}

/// How long to wait for the remote's ready acknowledgment.
const OPEN_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the outbound chunk queue (chunks sent before the ready ack
/// park here and flush once the remote acknowledges).
const OUTBOUND_QUEUE: usize = 64;

/// Entry point for opening live sessions.
pub struct LiveSession;

impl LiveSession {
    /// Open one session: connect, send setup, and wait for the remote's
    /// ready acknowledgment. Fails (and fully disconnects) if the ack never
    /// arrives.
    pub async fn open(
        transport: &dyn Transport,
        config: &LiveConfig,
    ) -> Result<SessionHandle> {
        info!("opening live session: model={}", config.model);

        let conn = transport
            .connect(wire::setup_message(config))
            .await
            .context("failed to open live session")?;

        let handle = SessionHandle::spawn(conn);

        match tokio::time::timeout(OPEN_ACK_TIMEOUT, handle.opened()).await {
            Ok(true) => {
                info!("live session open");
                Ok(handle)
            }
            Ok(false) => {
                handle.close();
                anyhow::bail!("connection closed before the remote acknowledged setup")
            }
            Err(_) => {
                handle.close();
                anyhow::bail!("timed out waiting for the remote to acknowledge setup")
            }
        }
    }
}

/// One open bidirectional connection to the remote service.
///
/// Send order is preserved; inbound events are delivered in the order the
/// remote emitted them, terminated by [`ServerEvent::Closed`]. `close()` is
/// idempotent and safe from any code path, including event callbacks.
///
/// A consumer lagging a full queue behind may miss the `Closed` marker; the
/// event channel closing carries the same terminal meaning.
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    closed: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<EncodedChunk>,
    // The sole keeper of an event sender outside the reader task; cleared on
    // close so the event sequence actually terminates for its consumer.
    events_tx: Arc<Mutex<Option<mpsc::Sender<ServerEvent>>>>,
    events_rx: Mutex<Option<mpsc::Receiver<ServerEvent>>>,
    opened_rx: Mutex<Option<oneshot::Receiver<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn spawn(conn: TransportConn) -> Self {
        let TransportConn {
            outbound,
            mut inbound,
        } = conn;

        let state = Arc::new(Mutex::new(SessionState::Connecting));
        let closed = Arc::new(AtomicBool::new(false));
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<EncodedChunk>(OUTBOUND_QUEUE);
        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(64);
        let (opened_tx, opened_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let events_slot = Arc::new(Mutex::new(Some(events_tx.clone())));

        // Reader: one loop turning raw transport traffic into the unified
        // event sequence.
        let reader_events = events_tx;
        let reader_slot = Arc::clone(&events_slot);
        let reader_state = Arc::clone(&state);
        let reader_closed = Arc::clone(&closed);
        let reader_task = tokio::spawn(async move {
            let mut opened_tx = Some(opened_tx);
            let mut ready_tx = Some(ready_tx);

            while let Some(item) = inbound.recv().await {
                match item {
                    TransportEvent::Message(payload) => {
                        let events = match wire::decode_server_message(&payload) {
                            Ok(events) => events,
                            Err(e) => {
                                // Decode anomaly: skip, never crash the loop
                                warn!("skipping undecodable server message: {:#}", e);
                                continue;
                            }
                        };

                        for event in events {
                            if event == ServerEvent::Connected {
                                *reader_state.lock().unwrap_or_else(|e| e.into_inner()) =
                                    SessionState::Open;
                                if let Some(tx) = opened_tx.take() {
                                    let _ = tx.send(());
                                }
                                if let Some(tx) = ready_tx.take() {
                                    let _ = tx.send(());
                                }
                            }
                            if reader_events.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    TransportEvent::Error(detail) => {
                        warn!("live session transport error: {}", detail);
                        let _ = reader_events.send(ServerEvent::Error(detail)).await;
                    }
                }
            }

            // Remote close: mark the session closed and terminate the
            // sequence so consumers see exactly one Closed, then nothing.
            if !reader_closed.swap(true, Ordering::SeqCst) {
                *reader_state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::Closed;
                let _ = reader_events.send(ServerEvent::Closed).await;
            }
            drop(reader_events);
            reader_slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        });

        // Writer: holds chunks back until the remote acknowledged setup,
        // then forwards in order.
        let writer_task = tokio::spawn(async move {
            if ready_rx.await.is_err() {
                debug!("session closed before ready; discarding queued chunks");
                return;
            }
            while let Some(chunk) = chunk_rx.recv().await {
                let message = wire::media_message(&chunk);
                if outbound.send(message).await.is_err() {
                    debug!("transport outbound closed; stopping writer");
                    break;
                }
            }
        });

        Self {
            state,
            closed,
            chunk_tx,
            events_tx: events_slot,
            events_rx: Mutex::new(Some(events_rx)),
            opened_rx: Mutex::new(Some(opened_rx)),
            reader_task: Mutex::new(Some(reader_task)),
            writer_task: Mutex::new(Some(writer_task)),
        }
    }

    async fn opened(&self) -> bool {
        let rx = self.opened_rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        match rx {
            Some(rx) => rx.await.is_ok(),
            None => false,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a chunk for transmission.
    ///
    /// Never blocks and never fails: chunks sent before the ready ack queue
    /// and flush once the session is open; chunks sent after close (or on a
    /// full queue) are logged and dropped, so an audio callback can never
    /// crash on a closed session.
    pub fn send(&self, chunk: EncodedChunk) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("dropping {} byte chunk sent after close", chunk.data.len());
            return;
        }
        if let Err(e) = self.chunk_tx.try_send(chunk) {
            match e {
                mpsc::error::TrySendError::Full(chunk) => {
                    warn!("outbound queue full, dropping {} byte chunk", chunk.data.len());
                }
                mpsc::error::TrySendError::Closed(chunk) => {
                    debug!("dropping {} byte chunk sent after close", chunk.data.len());
                }
            }
        }
    }

    /// Take the inbound event sequence. Yields events in arrival order and
    /// ends with [`ServerEvent::Closed`]; can be taken once per session.
    ///
    /// If the queue is full when the session closes, the marker is skipped
    /// and the sequence simply ends; treat end of stream as terminal too.
    pub fn events(&self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.events_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Tear down the connection. Idempotent: the first call wins, repeat
    /// calls (from any path: user stop, error handler, drop) are no-ops.
    /// No events are emitted after this returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::Closing;
        info!("closing live session");

        // Terminal marker first (best effort on a backlogged queue), then
        // release our sender so the sequence ends for its consumer once the
        // reader is gone
        if let Some(tx) = self.events_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.try_send(ServerEvent::Closed);
        }

        if let Some(task) = self.reader_task.lock().unwrap_or_else(|e| e.into_inner()).take()
        {
            task.abort();
        }
        if let Some(task) = self.writer_task.lock().unwrap_or_else(|e| e.into_inner()).take()
        {
            task.abort();
        }

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::Closed;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
