//! End-to-end tests for the playback worker: arrival-order scheduling,
//! interruption, and malformed-payload handling, using an in-memory sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use hudlink_audio::output::SampleSink;
use hudlink_audio::{pcm, PlaybackScheduler, PlaybackWorker, OUTPUT_SAMPLE_RATE_HZ};
use hudlink_foundation::real_clock;
use hudlink_telemetry::SessionMetrics;

#[derive(Clone)]
struct MemorySink {
    queued: Arc<Mutex<Vec<f32>>>,
    clears: Arc<AtomicU64>,
}

impl MemorySink {
    fn new() -> Self {
        Self {
            queued: Arc::new(Mutex::new(Vec::new())),
            clears: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl SampleSink for MemorySink {
    fn queue(&self, samples: &[f32]) {
        self.queued.lock().extend_from_slice(samples);
    }

    fn clear(&self) {
        self.queued.lock().clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}

fn payload_ms(ms: u64, value: f32) -> String {
    let count = (OUTPUT_SAMPLE_RATE_HZ as u64 * ms / 1000) as usize;
    pcm::encode_base64(&vec![value; count])
}

struct Fixture {
    sink: MemorySink,
    metrics: SessionMetrics,
    segment_tx: mpsc::Sender<String>,
    interrupt_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

fn start_worker() -> Fixture {
    let sink = MemorySink::new();
    let metrics = SessionMetrics::default();
    let (segment_tx, segment_rx) = mpsc::channel(64);
    let (interrupt_tx, interrupt_rx) = mpsc::channel(4);
    let scheduler = PlaybackScheduler::new(real_clock());
    let worker = PlaybackWorker::new(
        scheduler,
        sink.clone(),
        segment_rx,
        interrupt_rx,
        metrics.clone(),
    );
    let handle = worker.spawn();
    Fixture {
        sink,
        metrics,
        segment_tx,
        interrupt_tx,
        handle,
    }
}

#[tokio::test]
async fn segments_reach_the_sink_in_arrival_order() {
    let fx = start_worker();

    fx.segment_tx.send(payload_ms(10, 0.25)).await.unwrap();
    fx.segment_tx.send(payload_ms(10, -0.25)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let queued = fx.sink.queued.lock().clone();
    let per_segment = (OUTPUT_SAMPLE_RATE_HZ as u64 * 10 / 1000) as usize;
    assert_eq!(queued.len(), per_segment * 2);
    assert!(queued[0] > 0.0, "first segment's samples come first");
    assert!(queued[per_segment] < 0.0, "second segment follows");

    fx.handle.abort();
}

#[tokio::test]
async fn interruption_clears_queued_audio() {
    let fx = start_worker();

    fx.segment_tx.send(payload_ms(500, 0.5)).await.unwrap();
    fx.segment_tx.send(payload_ms(500, 0.5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fx.sink.queued.lock().is_empty());

    fx.interrupt_tx.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(fx.sink.queued.lock().is_empty());
    assert_eq!(fx.sink.clears.load(Ordering::Relaxed), 1);
    assert_eq!(fx.metrics.interruptions.load(Ordering::Relaxed), 1);
    assert!(!fx.metrics.speaking.load(Ordering::Relaxed));

    // The next segment plays fresh after the interruption.
    fx.segment_tx.send(payload_ms(10, 0.1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!fx.sink.queued.lock().is_empty());

    fx.handle.abort();
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_session_continues() {
    let fx = start_worker();

    fx.segment_tx.send("!!!not-base64!!!".to_string()).await.unwrap();
    fx.segment_tx.send(payload_ms(10, 0.3)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let per_segment = (OUTPUT_SAMPLE_RATE_HZ as u64 * 10 / 1000) as usize;
    assert_eq!(
        fx.sink.queued.lock().len(),
        per_segment,
        "only the valid segment is rendered"
    );

    fx.handle.abort();
}

#[tokio::test]
async fn completed_segments_are_reaped_and_counted() {
    let fx = start_worker();

    fx.segment_tx.send(payload_ms(200, 0.2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.metrics.speaking.load(Ordering::Relaxed));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fx.metrics.segments_played.load(Ordering::Relaxed), 1);
    assert!(!fx.metrics.speaking.load(Ordering::Relaxed));

    fx.handle.abort();
}
