use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::{EncodedFrame, ScreenSource};
use crate::scaler;
use hudlink_telemetry::{FpsTracker, SessionMetrics};

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Linear downscale factor applied before compression.
    pub downscale_factor: u32,
    /// JPEG quality bound, 1-100.
    pub jpeg_quality: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            downscale_factor: 3,
            jpeg_quality: 60,
        }
    }
}

/// Samples the shared screen on the controller's tick: poll the current
/// frame, downscale, compress, count. The controller forwards the result
/// and offers the same frame to the context classifier, so each tick
/// captures exactly once.
pub struct FrameSampler {
    source: Arc<dyn ScreenSource>,
    config: SamplerConfig,
    seq: u64,
    fps: FpsTracker,
    metrics: SessionMetrics,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn ScreenSource>, config: SamplerConfig, metrics: SessionMetrics) -> Self {
        Self {
            source,
            config,
            seq: 0,
            fps: FpsTracker::new(),
            metrics,
        }
    }

    /// One sampling tick. `None` means the source was not ready (still
    /// buffering) or produced an unusable frame; the tick is skipped
    /// without error either way.
    pub fn tick(&mut self) -> Option<EncodedFrame> {
        let raw = self.source.poll_frame()?;

        let scaled = match scaler::downscale(&raw, self.config.downscale_factor) {
            Some(scaled) => scaled,
            None => {
                tracing::debug!(
                    "Skipping {}x{} frame smaller than downscale block",
                    raw.width,
                    raw.height
                );
                return None;
            }
        };

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality);
        if let Err(err) = encoder.encode(
            &scaled.rgb,
            scaled.width,
            scaled.height,
            ExtendedColorType::Rgb8,
        ) {
            tracing::warn!("JPEG encode failed: {}", err);
            return None;
        }

        let frame = EncodedFrame {
            jpeg,
            width: scaled.width,
            height: scaled.height,
            seq: self.seq,
        };
        self.seq += 1;

        if let Some(fps) = self.fps.tick() {
            self.metrics.update_video_fps(fps);
        }

        Some(frame)
    }

    /// True once the user has stopped sharing.
    pub fn source_ended(&self) -> bool {
        self.source.has_ended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{RawFrame, SharedScreenSource};

    fn sampler_with_source() -> (Arc<SharedScreenSource>, FrameSampler) {
        let source = SharedScreenSource::new();
        let sampler = FrameSampler::new(
            source.clone(),
            SamplerConfig::default(),
            SessionMetrics::default(),
        );
        (source, sampler)
    }

    fn test_frame(width: u32, height: u32) -> RawFrame {
        let rgb: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        RawFrame::new(width, height, rgb)
    }

    #[test]
    fn tick_is_skipped_while_source_buffers() {
        let (_source, mut sampler) = sampler_with_source();
        assert!(sampler.tick().is_none());
    }

    #[test]
    fn tick_produces_downscaled_jpeg() {
        let (source, mut sampler) = sampler_with_source();
        source.push_frame(test_frame(90, 60));

        let frame = sampler.tick().expect("frame should be produced");
        assert_eq!((frame.width, frame.height), (30, 20));
        assert!(!frame.jpeg.is_empty());
        // JPEG SOI marker.
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn sequence_numbers_increase_per_produced_frame() {
        let (source, mut sampler) = sampler_with_source();
        source.push_frame(test_frame(30, 30));

        let a = sampler.tick().unwrap();
        let b = sampler.tick().unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
    }

    #[test]
    fn skipped_ticks_do_not_consume_sequence_numbers() {
        let (source, mut sampler) = sampler_with_source();
        assert!(sampler.tick().is_none());
        assert!(sampler.tick().is_none());

        source.push_frame(test_frame(30, 30));
        assert_eq!(sampler.tick().unwrap().seq, 0);
    }

    #[test]
    fn ended_source_is_reported() {
        let (source, sampler) = sampler_with_source();
        assert!(!sampler.source_ended());
        source.end();
        assert!(sampler.source_ended());
    }
}
