pub mod capture;
#[cfg(feature = "mic")]
pub mod mic;
pub mod pcm;

pub use capture::{
    create_mic_backend, AudioFrame, CaptureBackend, CaptureConfig, CaptureState, PermissionDenied,
    ScriptedBackend, ScriptedDevice,
};
pub use pcm::{decode_frame, encode_frame, mime_type};
