use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hudlink_audio::{
    outbound_audio_capacity, BlockReader, CaptureHandle, CapturePipeline, CaptureRing,
    EncodedAudio, MicCaptureThread, PipelineEvent, BLOCK_SIZE_SAMPLES,
};
use hudlink_foundation::{AudioError, SessionError};
use hudlink_telemetry::SessionMetrics;
use hudlink_vision::{ScreenSource, SharedScreenSource};

/// Driver seam over the actual microphone so the controller (and its tests)
/// never touch cpal directly.
pub trait MicDriver: Send {
    fn is_device_lost(&self) -> bool;
    fn stop(self: Box<Self>);
}

impl MicDriver for CaptureHandle {
    fn is_device_lost(&self) -> bool {
        CaptureHandle::is_device_lost(self)
    }

    fn stop(self: Box<Self>) {
        CaptureHandle::stop(*self);
    }
}

/// A held microphone: the device driver plus the capture pipeline feeding
/// encoded blocks. Survives reconnect attempts within one lineage.
pub struct MicHandle {
    pub driver: Box<dyn MicDriver>,
    pub audio_rx: mpsc::Receiver<EncodedAudio>,
    pub events_rx: mpsc::Receiver<PipelineEvent>,
    pub pipeline: Option<JoinHandle<()>>,
}

impl MicHandle {
    pub fn stop(self) {
        if let Some(pipeline) = self.pipeline {
            pipeline.abort();
        }
        self.driver.stop();
    }
}

/// Device handles owned solely by the session controller and shared between
/// the Reconnecting and Initializing states of one attempt lineage.
#[derive(Default)]
pub struct DeviceHandles {
    pub mic: Option<MicHandle>,
    pub screen: Option<Arc<dyn ScreenSource>>,
}

impl DeviceHandles {
    pub fn release(&mut self) {
        if let Some(mic) = self.mic.take() {
            mic.stop();
        }
        self.screen = None;
    }
}

/// One logical connection attempt lineage: persona, attempt counter, and
/// the devices carried across reconnects.
pub struct Session {
    pub persona: String,
    pub attempt: u32,
    pub devices: DeviceHandles,
}

impl Session {
    pub fn new(persona: String) -> Self {
        Self {
            persona,
            attempt: 0,
            devices: DeviceHandles::default(),
        }
    }
}

/// Acquires media devices. Reconnects reuse handles instead of calling
/// this again, which is what keeps the user from being re-prompted.
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn open_microphone(&self, metrics: SessionMetrics) -> Result<MicHandle, SessionError>;
    async fn open_screen(&self) -> Result<Arc<dyn ScreenSource>, SessionError>;
}

/// Production factory: cpal microphone plus the screen source the
/// embedding UI feeds.
pub struct MediaDeviceFactory {
    device_name: Option<String>,
    screen: Arc<SharedScreenSource>,
}

impl MediaDeviceFactory {
    pub fn new(device_name: Option<String>, screen: Arc<SharedScreenSource>) -> Self {
        Self {
            device_name,
            screen,
        }
    }
}

#[async_trait]
impl DeviceFactory for MediaDeviceFactory {
    async fn open_microphone(&self, metrics: SessionMetrics) -> Result<MicHandle, SessionError> {
        let (producer, consumer) = CaptureRing::new(BLOCK_SIZE_SAMPLES * 8).split();

        // Device acquisition blocks on the OS; keep it off the async
        // executor threads.
        let device_name = self.device_name.clone();
        let capture =
            tokio::task::spawn_blocking(move || MicCaptureThread::spawn(producer, device_name))
                .await
                .map_err(|_| SessionError::DeviceUnavailable {
                    device: "microphone".into(),
                })?
                .map_err(|err| match err {
                    // Refusal to open the device at acquisition time is the
                    // permission-denied path; anything later is device loss.
                    AudioError::DeviceNotFound { .. } | AudioError::BuildStream(_) => {
                        SessionError::PermissionDenied {
                            device: "microphone".into(),
                        }
                    }
                    other => SessionError::Audio(other),
                })?;

        let reader = BlockReader::new(consumer);
        let (audio_tx, audio_rx) = mpsc::channel(outbound_audio_capacity());
        let (events_tx, events_rx) = mpsc::channel(4);
        let pipeline = CapturePipeline::new(
            reader,
            audio_tx,
            events_tx,
            capture.device_lost_signal(),
            metrics,
        )
        .spawn();

        Ok(MicHandle {
            driver: Box::new(capture),
            audio_rx,
            events_rx,
            pipeline: Some(pipeline),
        })
    }

    async fn open_screen(&self) -> Result<Arc<dyn ScreenSource>, SessionError> {
        if self.screen.has_ended() {
            return Err(SessionError::PermissionDenied {
                device: "screen".into(),
            });
        }
        Ok(self.screen.clone())
    }
}
