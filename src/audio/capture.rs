use anyhow::Result;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One fixed-duration slice of captured audio (mono, normalized f32 samples).
///
/// Immutable once produced; consumed exactly once by the PCM encoder.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1.0, 1.0] (float noise may drift slightly out)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Output sample rate (the live endpoint expects 16kHz)
    pub sample_rate: u32,
    /// Samples per emitted frame
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz mono for the live endpoint
            frame_size: 4096,
        }
    }
}

/// Capture source lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Capturing,
    PermissionDenied,
}

/// Marker error raised when microphone access is refused.
///
/// Propagated through `anyhow::Error` so callers can downcast and treat the
/// denial as terminal for the session attempt (no retry).
#[derive(Debug)]
pub struct PermissionDenied;

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "microphone access denied")
    }
}

impl std::error::Error for PermissionDenied {}

/// Audio capture backend trait
///
/// Implementations own the physical device handle and the processing graph
/// that slices continuous input into fixed-size frames.
///
/// Contract:
/// - `start()` either begins emitting frames or fails with no partial graph
///   left running; on a refused device it fails with [`PermissionDenied`]
///   and no frame is ever delivered.
/// - `stop()` is idempotent; stopping an idle backend is a no-op.
/// - Device loss mid-capture closes the frame channel (the receiver observes
///   end of stream) after a full teardown, never a half-torn graph.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing; returns the channel frames are delivered on
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Current lifecycle state
    fn state(&self) -> CaptureState;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Deterministic backend driven by a prepared list of frames.
///
/// Stands in for a real microphone in tests and dry runs: the scripted
/// frames are delivered in order on `start()`, and the channel stays open
/// (as a live device would) until `stop()` releases it.
pub struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    deny_permission: bool,
    state: CaptureState,
    tx: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

/// Remote control over a [`ScriptedBackend`]'s frame source.
#[derive(Clone)]
pub struct ScriptedDevice {
    tx: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

impl ScriptedDevice {
    /// Sever the frame stream mid-capture, as an unplugged device would:
    /// the receiver observes end of stream.
    pub fn disconnect(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl ScriptedBackend {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            deny_permission: false,
            state: CaptureState::Idle,
            tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Backend that refuses the permission request instead of capturing.
    pub fn denied() -> Self {
        Self {
            frames: Vec::new(),
            deny_permission: true,
            state: CaptureState::Idle,
            tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle for simulating device loss while capturing.
    pub fn device(&self) -> ScriptedDevice {
        ScriptedDevice {
            tx: Arc::clone(&self.tx),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.state = CaptureState::Requesting;

        if self.deny_permission {
            self.state = CaptureState::PermissionDenied;
            return Err(anyhow::Error::new(PermissionDenied));
        }

        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in self.frames.drain(..) {
            // Channel is sized to hold the whole script
            let _ = tx.try_send(frame);
        }
        *self.tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self.state = CaptureState::Capturing;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        // Dropping the sender ends the frame stream
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.state = CaptureState::Idle;
        Ok(())
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Create the platform microphone backend.
///
/// Compiled in behind the `mic` feature; the default build treats the
/// microphone as an external boundary and only offers [`ScriptedBackend`].
pub fn create_mic_backend(config: CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    #[cfg(feature = "mic")]
    {
        let backend = super::mic::MicBackend::new(config)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "mic"))]
    {
        let _ = config;
        anyhow::bail!("microphone capture requires the `mic` feature")
    }
}
