use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::block_reader::BlockReader;
use crate::pcm;
use crate::BLOCK_SIZE_SAMPLES;
use hudlink_telemetry::SessionMetrics;

/// One capture block, already in wire form.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    /// base64 of 16-bit little-endian PCM at the input rate.
    pub data: String,
    pub sample_count: usize,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The capture device vanished mid-session.
    DeviceLost,
}

/// Continuously drains capture blocks, encodes them, and hands them to the
/// session's outbound channel. Muted blocks are drained but dropped.
pub struct CapturePipeline {
    reader: BlockReader,
    output_tx: mpsc::Sender<EncodedAudio>,
    events_tx: mpsc::Sender<PipelineEvent>,
    device_lost: Arc<AtomicBool>,
    metrics: SessionMetrics,
}

impl CapturePipeline {
    pub fn new(
        reader: BlockReader,
        output_tx: mpsc::Sender<EncodedAudio>,
        events_tx: mpsc::Sender<PipelineEvent>,
        device_lost: Arc<AtomicBool>,
        metrics: SessionMetrics,
    ) -> Self {
        Self {
            reader,
            output_tx,
            events_tx,
            device_lost,
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        tracing::info!("Capture pipeline started");

        loop {
            if self.device_lost.load(Ordering::SeqCst) {
                tracing::warn!("Capture device lost; notifying controller");
                let _ = self.events_tx.send(PipelineEvent::DeviceLost).await;
                break;
            }

            let muted = self.metrics.is_muted();
            match self.reader.poll_block(muted) {
                Some(block) => {
                    self.metrics.update_audio_level(&block.samples);

                    if block.muted {
                        // Drop, don't zero-fill: the device keeps draining but
                        // nothing goes out while mute is engaged.
                        self.metrics
                            .audio_blocks_muted
                            .fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let encoded = EncodedAudio {
                        data: pcm::encode_blocks_base64(&block.samples),
                        sample_count: block.samples.len(),
                        timestamp: block.timestamp,
                    };

                    // Enqueue-and-return; the pipeline never waits on the
                    // transport. A full queue means the session stalled, so
                    // the block is dropped like any other backpressure.
                    match self.output_tx.try_send(encoded) {
                        Ok(()) => {
                            self.metrics
                                .audio_blocks_sent
                                .fetch_add(1, Ordering::Relaxed);
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!("Outbound audio queue full; dropping block");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            tracing::info!("Outbound audio channel closed; pipeline exiting");
                            break;
                        }
                    }
                }
                None => {
                    // A full block accumulates every 256 ms at 16 kHz; a
                    // 50 ms poll checks several times per block period
                    // without burning CPU.
                    time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        tracing::info!("Capture pipeline stopped");
    }
}

/// Rough capacity for the outbound audio queue: a few seconds of blocks.
pub fn outbound_audio_capacity() -> usize {
    // 16 kHz / 4096-sample blocks is ~4 blocks a second.
    16_000 / BLOCK_SIZE_SAMPLES * 4
}
