use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::output::SampleSink;
use crate::pcm;
use crate::OUTPUT_SAMPLE_RATE_HZ;
use hudlink_foundation::SharedClock;
use hudlink_telemetry::SessionMetrics;

/// Bookkeeping record for one scheduled segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub id: u64,
    pub start: Instant,
    pub duration: Duration,
}

impl Scheduled {
    pub fn end(&self) -> Instant {
        self.start + self.duration
    }
}

/// Owns the single `next_start_time` cursor and the active segment set.
///
/// Segments enqueue back-to-back: each start is the later of "now" and the
/// cursor, and the cursor advances by the segment's duration. Only an
/// explicit interruption resets the cursor.
pub struct PlaybackScheduler {
    clock: SharedClock,
    next_start: Option<Instant>,
    active: VecDeque<Scheduled>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            next_start: None,
            active: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Schedule the next segment in arrival order.
    pub fn enqueue(&mut self, sample_count: usize, sample_rate: u32) -> Scheduled {
        let now = self.clock.now();
        let start = match self.next_start {
            // If the cursor stalled behind the clock, the segment starts
            // immediately; a fresh segment never waits for stale time.
            Some(cursor) if cursor > now => cursor,
            _ => now,
        };
        let duration = Duration::from_secs_f64(sample_count as f64 / sample_rate as f64);
        self.next_start = Some(start + duration);

        let scheduled = Scheduled {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.active.push_back(scheduled.clone());
        scheduled
    }

    /// Hard stop: drop every pending segment and reset the cursor so the
    /// next segment starts fresh rather than queued behind stale audio.
    pub fn interrupt(&mut self) -> usize {
        let cancelled = self.active.len();
        self.active.clear();
        self.next_start = Some(self.clock.now());
        cancelled
    }

    /// Remove segments whose playback window has passed.
    pub fn reap_completed(&mut self) -> usize {
        let now = self.clock.now();
        let mut reaped = 0;
        while let Some(front) = self.active.front() {
            if front.end() <= now {
                self.active.pop_front();
                reaped += 1;
            } else {
                break;
            }
        }
        reaped
    }

    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.active.len()
    }

    /// Earliest completion deadline among active segments, if any.
    pub fn next_completion(&self) -> Option<Instant> {
        self.active.front().map(|s| s.end())
    }
}

/// Consumes inbound audio payloads in arrival order, schedules them, and
/// feeds samples to the output sink. Interruption clears both the schedule
/// and the sink's queue.
pub struct PlaybackWorker<S: SampleSink> {
    scheduler: PlaybackScheduler,
    sink: S,
    segment_rx: mpsc::Receiver<String>,
    interrupt_rx: mpsc::Receiver<()>,
    metrics: SessionMetrics,
}

impl<S: SampleSink> PlaybackWorker<S> {
    pub fn new(
        scheduler: PlaybackScheduler,
        sink: S,
        segment_rx: mpsc::Receiver<String>,
        interrupt_rx: mpsc::Receiver<()>,
        metrics: SessionMetrics,
    ) -> Self {
        Self {
            scheduler,
            sink,
            segment_rx,
            interrupt_rx,
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let PlaybackWorker {
            mut scheduler,
            sink,
            mut segment_rx,
            mut interrupt_rx,
            metrics,
        } = self;

        tracing::info!("Playback worker started");

        loop {
            let deadline = scheduler.next_completion();

            tokio::select! {
                // Interruption wins over everything else pending.
                biased;

                interrupt = interrupt_rx.recv() => {
                    match interrupt {
                        Some(()) => {
                            let cancelled = scheduler.interrupt();
                            sink.clear();
                            metrics.interruptions.fetch_add(1, Ordering::Relaxed);
                            metrics.speaking.store(false, Ordering::Relaxed);
                            tracing::debug!("Interruption: cancelled {} pending segments", cancelled);
                        }
                        None => break,
                    }
                }

                payload = segment_rx.recv() => {
                    match payload {
                        Some(payload) => handle_payload(&mut scheduler, &sink, &metrics, &payload),
                        None => break,
                    }
                }

                _ = sleep_until_instant(deadline), if deadline.is_some() => {
                    let reaped = scheduler.reap_completed();
                    metrics.segments_played.fetch_add(reaped as u64, Ordering::Relaxed);
                    metrics
                        .speaking
                        .store(scheduler.is_speaking(), Ordering::Relaxed);
                }
            }
        }

        tracing::info!("Playback worker stopped");
    }
}

fn handle_payload<S: SampleSink>(
    scheduler: &mut PlaybackScheduler,
    sink: &S,
    metrics: &SessionMetrics,
    payload: &str,
) {
    let samples = match pcm::decode_base64(payload) {
        Ok(samples) => samples,
        Err(err) => {
            // A malformed segment is dropped; the session continues.
            tracing::warn!("Dropping malformed audio payload: {}", err);
            return;
        }
    };
    if samples.is_empty() {
        return;
    }

    scheduler.enqueue(samples.len(), OUTPUT_SAMPLE_RATE_HZ);
    sink.queue(&samples);
    metrics.speaking.store(true, Ordering::Relaxed);
}

async fn sleep_until_instant(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant.into()).await,
        // Guarded out by the `if` on the select arm.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudlink_foundation::{Clock, TestClock};
    use std::sync::Arc;

    fn test_scheduler() -> (Arc<TestClock>, PlaybackScheduler) {
        let clock = Arc::new(TestClock::new());
        let scheduler = PlaybackScheduler::new(clock.clone());
        (clock, scheduler)
    }

    /// 500 ms worth of samples at the output rate.
    fn samples_ms(ms: u64) -> usize {
        (OUTPUT_SAMPLE_RATE_HZ as u64 * ms / 1000) as usize
    }

    #[test]
    fn back_to_back_segments_are_gapless() {
        let (_clock, mut scheduler) = test_scheduler();

        let first = scheduler.enqueue(samples_ms(500), OUTPUT_SAMPLE_RATE_HZ);
        let second = scheduler.enqueue(samples_ms(300), OUTPUT_SAMPLE_RATE_HZ);

        assert_eq!(second.start, first.start + Duration::from_millis(500));
        assert_eq!(second.duration, Duration::from_millis(300));
    }

    #[test]
    fn segments_never_overlap_and_starts_are_non_decreasing() {
        let (clock, mut scheduler) = test_scheduler();

        let mut previous: Option<Scheduled> = None;
        // Arbitrary arrival timing: sometimes the clock jumps past the
        // cursor, sometimes it stalls entirely.
        let arrivals = [0u64, 40, 0, 700, 0, 0, 123, 9];
        for (i, &advance_ms) in arrivals.iter().enumerate() {
            clock.advance(Duration::from_millis(advance_ms));
            let seg = scheduler.enqueue(samples_ms(100 + i as u64 * 10), OUTPUT_SAMPLE_RATE_HZ);

            assert!(seg.start >= clock.now(), "segment must not start in the past");
            if let Some(prev) = &previous {
                assert!(seg.start >= prev.start, "starts must be non-decreasing");
                assert!(seg.start >= prev.end(), "intervals must not overlap");
            }
            previous = Some(seg);
        }
    }

    #[test]
    fn stalled_clock_pushes_later_segment_after_earlier_end() {
        let (_clock, mut scheduler) = test_scheduler();

        // Clock does not move between enqueues at all.
        let first = scheduler.enqueue(samples_ms(200), OUTPUT_SAMPLE_RATE_HZ);
        let second = scheduler.enqueue(samples_ms(200), OUTPUT_SAMPLE_RATE_HZ);
        assert_eq!(second.start, first.end());
    }

    #[test]
    fn interruption_resets_the_schedule() {
        let (clock, mut scheduler) = test_scheduler();

        scheduler.enqueue(samples_ms(1000), OUTPUT_SAMPLE_RATE_HZ);
        scheduler.enqueue(samples_ms(1000), OUTPUT_SAMPLE_RATE_HZ);
        let stale_cursor = scheduler.next_start.unwrap();

        clock.advance(Duration::from_millis(100));
        let interruption_time = clock.now();
        let cancelled = scheduler.interrupt();
        assert_eq!(cancelled, 2);
        assert!(!scheduler.is_speaking());

        let next = scheduler.enqueue(samples_ms(100), OUTPUT_SAMPLE_RATE_HZ);
        assert!(next.start >= interruption_time);
        assert!(
            next.start < stale_cursor,
            "next segment must not queue behind stale audio"
        );
    }

    #[test]
    fn idle_gap_resets_start_to_now() {
        let (clock, mut scheduler) = test_scheduler();

        let first = scheduler.enqueue(samples_ms(100), OUTPUT_SAMPLE_RATE_HZ);
        // Long silence: the cursor is far behind the clock by now.
        clock.advance(Duration::from_secs(10));
        let second = scheduler.enqueue(samples_ms(100), OUTPUT_SAMPLE_RATE_HZ);

        assert_eq!(second.start, clock.now());
        assert!(second.start > first.end());
    }

    #[test]
    fn reap_removes_only_finished_segments() {
        let (clock, mut scheduler) = test_scheduler();

        scheduler.enqueue(samples_ms(100), OUTPUT_SAMPLE_RATE_HZ);
        scheduler.enqueue(samples_ms(100), OUTPUT_SAMPLE_RATE_HZ);
        assert_eq!(scheduler.pending(), 2);

        clock.advance(Duration::from_millis(150));
        assert_eq!(scheduler.reap_completed(), 1);
        assert_eq!(scheduler.pending(), 1);
        assert!(scheduler.is_speaking());

        clock.advance(Duration::from_millis(100));
        assert_eq!(scheduler.reap_completed(), 1);
        assert!(!scheduler.is_speaking());
    }
}
