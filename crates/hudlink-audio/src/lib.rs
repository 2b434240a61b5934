pub mod block_reader;
pub mod capture;
pub mod output;
pub mod pcm;
pub mod pipeline;
pub mod playback;
pub mod resampler;
pub mod ring_buffer;

// Public API
pub use block_reader::{AudioBlock, BlockReader};
pub use capture::{CaptureHandle, MicCaptureThread};
pub use output::{AudioOutput, SampleSink};
pub use pcm::PcmError;
pub use pipeline::{outbound_audio_capacity, CapturePipeline, EncodedAudio, PipelineEvent};
pub use playback::{PlaybackScheduler, PlaybackWorker, Scheduled};
pub use ring_buffer::CaptureRing;

/// Microphone capture rate expected by the remote endpoint.
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Sample rate of audio segments streamed back from the endpoint.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Fixed capture block size; bounds latency and per-block overhead.
pub const BLOCK_SIZE_SAMPLES: usize = 4096;
