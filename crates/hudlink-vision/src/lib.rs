pub mod frame;
pub mod sampler;
pub mod scaler;

pub use frame::{EncodedFrame, RawFrame, ScreenSource, SharedScreenSource};
pub use sampler::{FrameSampler, SamplerConfig};

/// Cadence of the shared sampling tick.
pub const SAMPLE_INTERVAL_MS: u64 = 1000;
