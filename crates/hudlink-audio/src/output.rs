use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use parking_lot::Mutex;

use crate::OUTPUT_SAMPLE_RATE_HZ;
use hudlink_foundation::AudioError;

/// Where the playback worker puts scheduled samples.
///
/// `clear` is the interruption path: everything queued but not yet rendered
/// is discarded immediately.
pub trait SampleSink: Send + 'static {
    fn queue(&self, samples: &[f32]);
    fn clear(&self);
}

/// cpal-backed mono output at the segment sample rate.
///
/// The stream lives on a dedicated thread (cpal streams must not cross
/// threads); this handle only touches the shared sample queue, so it moves
/// freely into the playback worker. The device callback drains the queue;
/// underruns render silence.
pub struct AudioOutput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    underruns: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioOutput {
    pub fn start() -> Result<Self, AudioError> {
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let underruns = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let thread_queue = queue.clone();
        let thread_underruns = underruns.clone();
        let thread_running = running.clone();
        let (startup_tx, startup_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                run_output(thread_queue, thread_underruns, thread_running, startup_tx);
            })
            .map_err(|e| AudioError::Fatal(format!("failed to spawn output thread: {e}")))?;

        match startup_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                queue,
                underruns,
                running,
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(AudioError::DeviceNotFound { name: None })
            }
        }
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn queued_samples(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.queue.lock().clear();
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SampleSink for AudioOutput {
    fn queue(&self, samples: &[f32]) {
        self.queue.lock().extend(samples.iter().copied());
    }

    fn clear(&self) {
        self.queue.lock().clear();
    }
}

fn run_output(
    queue: Arc<Mutex<VecDeque<f32>>>,
    underruns: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    startup_tx: crossbeam_channel::Sender<Result<(), AudioError>>,
) {
    let stream = match open_output_stream(queue, underruns) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = startup_tx.send(Err(err));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = startup_tx.send(Err(AudioError::PlayStream(err)));
        return;
    }
    let _ = startup_tx.send(Ok(()));
    tracing::info!("Audio output started at {} Hz mono", OUTPUT_SAMPLE_RATE_HZ);

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::info!("Audio output stopped");
}

fn open_output_stream(
    queue: Arc<Mutex<VecDeque<f32>>>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::DeviceNotFound { name: None })?;

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::FormatNotSupported {
            format: e.to_string(),
        })?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(AudioError::FormatNotSupported {
            format: format!("{:?}", supported.sample_format()),
        });
    }

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(OUTPUT_SAMPLE_RATE_HZ),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut buf = queue.lock();
                // A partial drain is a genuine underrun; an empty queue is
                // just silence between replies.
                let available = buf.len();
                if available > 0 && available < data.len() {
                    underruns.fetch_add(1, Ordering::Relaxed);
                }
                for sample in data.iter_mut() {
                    *sample = buf.pop_front().unwrap_or(0.0);
                }
            },
            |err| {
                tracing::error!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(AudioError::BuildStream)?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemorySink {
        queued: Mutex<Vec<f32>>,
        clears: AtomicU64,
    }

    impl SampleSink for Arc<MemorySink> {
        fn queue(&self, samples: &[f32]) {
            self.queued.lock().extend_from_slice(samples);
        }

        fn clear(&self) {
            self.queued.lock().clear();
            self.clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn sink_clear_discards_queued_samples() {
        let sink = Arc::new(MemorySink {
            queued: Mutex::new(Vec::new()),
            clears: AtomicU64::new(0),
        });
        sink.queue(&[0.1, 0.2]);
        assert_eq!(sink.queued.lock().len(), 2);
        sink.clear();
        assert!(sink.queued.lock().is_empty());
        assert_eq!(sink.clears.load(Ordering::Relaxed), 1);
    }
}
