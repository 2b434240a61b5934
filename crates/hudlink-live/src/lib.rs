pub mod endpoint;
pub mod protocol;
pub mod ws;

pub use endpoint::{DuplexEndpoint, LiveSession, SessionEvent};
pub use protocol::{
    ClientMessage, MediaChunk, ServerMessage, SessionSetup, AUDIO_PCM_MIME, IMAGE_JPEG_MIME,
};
pub use ws::WsEndpoint;
