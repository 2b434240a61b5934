use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest caption transcript retained for display.
const CAPTION_LIMIT_CHARS: usize = 2048;

/// Shared metrics for cross-task session monitoring.
///
/// Everything here is a read-only observation for the UI layer; the session
/// components are the only writers.
#[derive(Clone)]
pub struct SessionMetrics {
    // Audio level monitoring (capture side)
    pub current_peak: Arc<AtomicI16>, // Peak sample value in current block
    pub current_rms: Arc<AtomicU64>,  // RMS * 1000 for precision

    // Outbound counters
    pub audio_blocks_sent: Arc<AtomicU64>,
    pub audio_blocks_muted: Arc<AtomicU64>, // Captured but dropped while muted
    pub video_frames_sent: Arc<AtomicU64>,
    pub video_fps: Arc<AtomicU64>, // Frames per second * 10

    // Playback
    pub segments_played: Arc<AtomicU64>,
    pub interruptions: Arc<AtomicU64>,
    pub speaking: Arc<AtomicBool>, // Assistant audio currently scheduled

    // Session lifecycle
    pub reconnect_attempts: Arc<AtomicU64>,
    pub muted: Arc<AtomicBool>,

    // Textual observations
    caption: Arc<RwLock<String>>,
    context_label: Arc<RwLock<String>>,
    advisories: Arc<RwLock<Vec<String>>>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            current_peak: Arc::new(AtomicI16::new(0)),
            current_rms: Arc::new(AtomicU64::new(0)),
            audio_blocks_sent: Arc::new(AtomicU64::new(0)),
            audio_blocks_muted: Arc::new(AtomicU64::new(0)),
            video_frames_sent: Arc::new(AtomicU64::new(0)),
            video_fps: Arc::new(AtomicU64::new(0)),
            segments_played: Arc::new(AtomicU64::new(0)),
            interruptions: Arc::new(AtomicU64::new(0)),
            speaking: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            muted: Arc::new(AtomicBool::new(false)),
            caption: Arc::new(RwLock::new(String::new())),
            context_label: Arc::new(RwLock::new("unknown".to_string())),
            advisories: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl SessionMetrics {
    pub fn update_audio_level(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let peak = samples.iter().map(|&s| s.saturating_abs()).max().unwrap_or(0);
        self.current_peak.store(peak, Ordering::Relaxed);

        let sum: i64 = samples.iter().map(|&s| s as i64 * s as i64).sum();
        let rms = ((sum as f64 / samples.len() as f64).sqrt() * 1000.0) as u64;
        self.current_rms.store(rms, Ordering::Relaxed);
    }

    pub fn update_video_fps(&self, fps: f64) {
        self.video_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Append a caption fragment, trimming the front when over the limit.
    pub fn push_caption(&self, fragment: &str) {
        let mut caption = self.caption.write();
        caption.push_str(fragment);
        if caption.len() > CAPTION_LIMIT_CHARS {
            let cut = caption.len() - CAPTION_LIMIT_CHARS;
            // Keep the cut on a char boundary.
            let cut = (cut..caption.len())
                .find(|&i| caption.is_char_boundary(i))
                .unwrap_or(caption.len());
            caption.drain(..cut);
        }
    }

    pub fn caption(&self) -> String {
        self.caption.read().clone()
    }

    pub fn set_context_label(&self, label: &str) {
        *self.context_label.write() = label.to_string();
    }

    pub fn context_label(&self) -> String {
        self.context_label.read().clone()
    }

    /// The whole list is swapped in one write; readers never see a partial set.
    pub fn replace_advisories(&self, advisories: Vec<String>) {
        *self.advisories.write() = advisories;
    }

    pub fn advisories(&self) -> Vec<String> {
        self.advisories.read().clone()
    }
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_level_tracks_peak_and_rms() {
        let metrics = SessionMetrics::default();
        metrics.update_audio_level(&[0, 100, -200, 50]);
        assert_eq!(metrics.current_peak.load(Ordering::Relaxed), 200);
        assert!(metrics.current_rms.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn advisories_replaced_wholesale() {
        let metrics = SessionMetrics::default();
        metrics.replace_advisories(vec!["a".into(), "b".into()]);
        metrics.replace_advisories(vec!["c".into()]);
        assert_eq!(metrics.advisories(), vec!["c".to_string()]);
    }

    #[test]
    fn caption_is_bounded() {
        let metrics = SessionMetrics::default();
        for _ in 0..200 {
            metrics.push_caption("0123456789012345678901234567890123456789");
        }
        assert!(metrics.caption().len() <= CAPTION_LIMIT_CHARS);
        assert!(metrics.caption().ends_with("0123456789"));
    }

    #[test]
    fn min_sample_does_not_overflow_peak() {
        let metrics = SessionMetrics::default();
        metrics.update_audio_level(&[i16::MIN]);
        assert_eq!(metrics.current_peak.load(Ordering::Relaxed), i16::MAX);
    }
}
