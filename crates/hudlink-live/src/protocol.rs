//! Wire protocol for the duplex session: a setup message carrying the
//! persona/voice configuration, realtime media input going out, and
//! audio/caption/interruption payloads coming back.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Sample-rate identifier the endpoint expects on outbound audio blocks.
pub const AUDIO_PCM_MIME: &str = "audio/pcm;rate=16000";

/// Encoding tag for outbound screen frames.
pub const IMAGE_JPEG_MIME: &str = "image/jpeg";

/// Default realtime audio/vision model.
pub const DEFAULT_REALTIME_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Default reply voice.
pub const DEFAULT_VOICE: &str = "Kore";

/// Opening configuration for one duplex session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetup {
    pub model: String,
    /// Opaque persona / system-instruction blob supplied by the caller.
    pub persona: String,
    pub voice: String,
}

impl SessionSetup {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            persona: persona.into(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// One outbound media payload, base64-encoded and mime-tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Setup { setup: SessionSetup },
    RealtimeInput { media: MediaChunk },
}

impl ClientMessage {
    /// An audio block already in wire form (base64 16 kHz PCM).
    pub fn audio_block(data: String) -> Self {
        ClientMessage::RealtimeInput {
            media: MediaChunk {
                mime_type: AUDIO_PCM_MIME.to_string(),
                data,
            },
        }
    }

    /// A compressed screen frame.
    pub fn video_frame(jpeg: &[u8]) -> Self {
        ClientMessage::RealtimeInput {
            media: MediaChunk {
                mime_type: IMAGE_JPEG_MIME.to_string(),
                data: BASE64.encode(jpeg),
            },
        }
    }
}

/// One inbound message. Fields are independent: a message may carry audio,
/// a caption fragment, an interruption marker, or any combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// base64 16-bit PCM at the output rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// The user began speaking over the assistant; queued playback must be
    /// discarded immediately.
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_message_round_trips() {
        let msg = ClientMessage::Setup {
            setup: SessionSetup::new("You are a tactical copilot."),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"setup\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn audio_block_carries_the_pcm_mime_tag() {
        let msg = ClientMessage::audio_block("QUJD".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(AUDIO_PCM_MIME));
        assert!(json.contains("\"type\":\"realtime_input\""));
    }

    #[test]
    fn video_frame_is_base64_tagged_jpeg() {
        let msg = ClientMessage::video_frame(&[0xFF, 0xD8, 0xFF]);
        match msg {
            ClientMessage::RealtimeInput { media } => {
                assert_eq!(media.mime_type, IMAGE_JPEG_MIME);
                assert_eq!(BASE64.decode(media.data).unwrap(), vec![0xFF, 0xD8, 0xFF]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn server_message_fields_default_when_absent() {
        let msg: ServerMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg, ServerMessage::default());

        let msg: ServerMessage =
            serde_json::from_str(r#"{"caption":"hello","interrupted":true}"#).unwrap();
        assert_eq!(msg.caption.as_deref(), Some("hello"));
        assert!(msg.interrupted);
        assert!(msg.audio.is_none());
    }
}
