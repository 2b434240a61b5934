use std::time::Duration;
use thiserror::Error;

/// Top-level session error taxonomy.
///
/// The controller consults `recovery_strategy()` to decide whether an error
/// tears down the session, schedules a reconnect, or is absorbed locally.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Device access refused: {device}")]
    PermissionDenied { device: String },

    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Transport closed: {reason}")]
    TransportClosed { reason: String },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Malformed inbound payload: {0}")]
    Decode(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Buffer overflow, dropped {count} samples")]
    BufferOverflow { count: usize },

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),

    #[error("CPAL error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// What the controller should do about an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Re-enter `Initializing` after the fixed delay, reusing device handles.
    Reconnect { delay: Duration },
    /// Drop the offending payload and continue the session.
    DropPayload,
    /// Substitute the sentinel / fallback value and continue.
    Fallback,
    /// Terminal for the attempt; requires an explicit user restart.
    Fatal,
}

/// Fixed backoff between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

impl SessionError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            SessionError::PermissionDenied { .. } | SessionError::TransportError(_) => {
                RecoveryStrategy::Fatal
            }
            SessionError::DeviceUnavailable { .. }
            | SessionError::TransportClosed { .. }
            | SessionError::Audio(AudioError::DeviceDisconnected)
            | SessionError::Audio(AudioError::Cpal(_)) => RecoveryStrategy::Reconnect {
                delay: RECONNECT_DELAY,
            },
            SessionError::Decode(_) => RecoveryStrategy::DropPayload,
            SessionError::Classification(_) => RecoveryStrategy::Fallback,
            SessionError::Audio(_) => RecoveryStrategy::Fatal,
        }
    }

    /// Terminal errors surface as a distinct user-visible status.
    pub fn is_fatal(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::Fatal
    }
}
