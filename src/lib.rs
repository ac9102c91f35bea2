pub mod audio;
pub mod config;
pub mod live;
pub mod reminders;
pub mod supervisor;

pub use audio::{
    create_mic_backend, AudioFrame, CaptureBackend, CaptureConfig, CaptureState, PermissionDenied,
    ScriptedBackend, ScriptedDevice,
};
pub use config::Config;
pub use live::{
    EncodedChunk, LiveConfig, LiveSession, ServerEvent, SessionHandle, SessionState, Transport,
    TransportConn, TransportEvent, WsTransport,
};
pub use reminders::{AlarmService, AlarmSink, Medication, ReminderStore};
pub use supervisor::{
    AlertBoard, AlertEvent, AlertInterpreter, CaptionInterpreter, CaptionMode, EventInterpreter,
    Supervisor, SupervisorState, TranscriptBuffer,
};
