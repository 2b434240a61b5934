use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// One uncompressed RGB frame from the shared screen.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8, `width * height * 3` bytes.
    pub rgb: Vec<u8>,
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        debug_assert_eq!(rgb.len(), (width * height * 3) as usize);
        Self {
            width,
            height,
            rgb,
            captured_at: Instant::now(),
        }
    }
}

/// A downscaled, JPEG-compressed frame ready for transmission.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number of the sampling tick that produced this frame.
    pub seq: u64,
}

/// External screen-share collaborator.
///
/// The embedding UI owns the actual capture; the session only polls the
/// current frame and watches for the "ended" signal (user stopped sharing).
pub trait ScreenSource: Send + Sync {
    /// Most recent frame, if the source has produced one yet. Returning
    /// `None` (still buffering) skips the sampling tick without error.
    fn poll_frame(&self) -> Option<RawFrame>;

    /// True once the user has stopped sharing; treated as an exit trigger.
    fn has_ended(&self) -> bool;
}

/// Channel-style `ScreenSource` for embedders: the UI pushes frames, the
/// sampler polls whatever is current.
#[derive(Default)]
pub struct SharedScreenSource {
    latest: Mutex<Option<RawFrame>>,
    ended: AtomicBool,
}

impl SharedScreenSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the current frame.
    pub fn push_frame(&self, frame: RawFrame) {
        *self.latest.lock() = Some(frame);
    }

    /// Signal that the user stopped sharing. Irreversible for this source.
    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

impl ScreenSource for SharedScreenSource {
    fn poll_frame(&self) -> Option<RawFrame> {
        if self.has_ended() {
            return None;
        }
        self.latest.lock().clone()
    }

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_not_ready_until_first_frame() {
        let source = SharedScreenSource::new();
        assert!(source.poll_frame().is_none());

        source.push_frame(RawFrame::new(2, 2, vec![0u8; 12]));
        assert!(source.poll_frame().is_some());
    }

    #[test]
    fn ended_source_stops_yielding_frames() {
        let source = SharedScreenSource::new();
        source.push_frame(RawFrame::new(2, 2, vec![0u8; 12]));
        source.end();
        assert!(source.has_ended());
        assert!(source.poll_frame().is_none());
    }

    #[test]
    fn newer_frames_replace_older_ones() {
        let source = SharedScreenSource::new();
        source.push_frame(RawFrame::new(1, 1, vec![1, 2, 3]));
        source.push_frame(RawFrame::new(1, 1, vec![4, 5, 6]));
        assert_eq!(source.poll_frame().unwrap().rgb, vec![4, 5, 6]);
    }
}
