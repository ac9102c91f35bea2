pub mod session;
pub mod wire;
pub mod ws;

pub use session::{
    LiveConfig, LiveSession, SessionHandle, SessionState, Transport, TransportConn, TransportEvent,
};
pub use wire::{EncodedChunk, ServerEvent};
pub use ws::WsTransport;
