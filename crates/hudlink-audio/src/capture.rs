use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::resampler::LinearResampler;
use crate::ring_buffer::RingProducer;
use crate::INPUT_SAMPLE_RATE_HZ;
use hudlink_foundation::AudioError;

/// Handle to the dedicated microphone thread.
///
/// The thread owns the cpal stream; shutdown is flag-based and the thread
/// joins on `stop` (or drop).
pub struct CaptureHandle {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    device_lost: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// True once the stream reported a fatal error (device vanished).
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    /// Shared flag for the pipeline worker to watch.
    pub fn device_lost_signal(&self) -> Arc<AtomicBool> {
        self.device_lost.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct MicCaptureThread;

impl MicCaptureThread {
    /// Open the default (or named) input device and stream 16 kHz mono i16
    /// into the ring. Returns once the stream is live or the open failed.
    pub fn spawn(
        producer: RingProducer,
        device_name: Option<String>,
    ) -> Result<CaptureHandle, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let device_lost = Arc::new(AtomicBool::new(false));

        let thread_running = running.clone();
        let thread_device_lost = device_lost.clone();
        let (startup_tx, startup_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                run_capture(
                    producer,
                    device_name,
                    thread_running,
                    thread_device_lost,
                    startup_tx,
                );
            })
            .map_err(|e| AudioError::Fatal(format!("failed to spawn capture thread: {e}")))?;

        // Wait for the stream to come up (or fail) before reporting success.
        match startup_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(CaptureHandle {
                handle: Some(handle),
                running,
                device_lost,
            }),
            Ok(Err(err)) => {
                running.store(false, Ordering::SeqCst);
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
}

fn run_capture(
    producer: RingProducer,
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    device_lost: Arc<AtomicBool>,
    startup_tx: crossbeam_channel::Sender<Result<(), AudioError>>,
) {
    let stream = match open_stream(producer, device_name, device_lost.clone()) {
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
    tracing::info!("Microphone capture started");

    while running.load(Ordering::SeqCst) && !device_lost.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::info!("Microphone capture stopped");
}

fn open_stream(
    mut ring: RingProducer,
    device_name: Option<String>,
    device_lost: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = match &device_name {
        Some(name) => host
            .input_devices()
            .map_err(|_| AudioError::DeviceNotFound {
                name: device_name.clone(),
            })?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or(AudioError::DeviceNotFound {
                name: device_name.clone(),
            })?,
        None => host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound { name: None })?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::FormatNotSupported {
            format: e.to_string(),
        })?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;

    tracing::debug!(
        "Opening input device {:?}: {} Hz, {} ch, {:?}",
        device.name().ok(),
        config.sample_rate.0,
        channels,
        sample_format
    );

    // Convert whatever the device gives us to 16 kHz mono inline; the
    // callback owns all conversion state so the hot path stays lock-free.
    let mut resampler = LinearResampler::new(config.sample_rate.0, INPUT_SAMPLE_RATE_HZ);
    let mut mono: Vec<i16> = Vec::new();

    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Input stream error: {}", err);
        device_lost.store(true, Ordering::SeqCst);
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                downmix_f32(data, channels, &mut mono);
                push_samples(&mut ring, &mut resampler, &mono);
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                downmix_i16(data, channels, &mut mono);
                push_samples(&mut ring, &mut resampler, &mono);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let signed: Vec<i16> = data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                downmix_i16(&signed, channels, &mut mono);
                push_samples(&mut ring, &mut resampler, &mono);
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            })
        }
    };

    Ok(stream)
}

fn downmix_f32(data: &[f32], channels: usize, mono: &mut Vec<i16>) {
    mono.clear();
    if channels <= 1 {
        mono.extend(
            data.iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
        );
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        let avg = (sum / channels as f32).clamp(-1.0, 1.0);
        mono.push((avg * i16::MAX as f32) as i16);
    }
}

fn downmix_i16(data: &[i16], channels: usize, mono: &mut Vec<i16>) {
    mono.clear();
    if channels <= 1 {
        mono.extend_from_slice(data);
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        mono.push((sum / channels as i32) as i16);
    }
}

fn push_samples(ring: &mut RingProducer, resampler: &mut LinearResampler, mono: &[i16]) {
    let converted = resampler.process(mono);
    if let Err(err) = ring.push(&converted) {
        // Overflow means the consumer stalled; drop and keep the device fed.
        tracing::warn!("Capture ring overflow: {}", err);
    }
}
