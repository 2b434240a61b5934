//! Linear-interpolation rate conversion for devices that cannot open a
//! native 16 kHz stream. Voice capture does not need a polyphase filter;
//! interpolation keeps the hot path allocation-light and dependency-free.

/// Streaming downconverter from an arbitrary device rate to the target rate.
pub struct LinearResampler {
    ratio: f64,
    // Fractional read position carried across calls.
    position: f64,
    // Last sample of the previous input chunk, for interpolation across
    // the chunk boundary.
    carry: Option<i16>,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            ratio: input_rate as f64 / output_rate as f64,
            position: 0.0,
            carry: None,
        }
    }

    /// Identity conversions are handled without touching the samples.
    pub fn is_identity(&self) -> bool {
        self.ratio == 1.0
    }

    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if self.is_identity() {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        // Stitch the carried sample onto the front so interpolation spans
        // chunk boundaries. `position` is measured from that carried sample.
        let mut stitched;
        let samples = match self.carry.take() {
            Some(prev) => {
                stitched = Vec::with_capacity(input.len() + 1);
                stitched.push(prev);
                stitched.extend_from_slice(input);
                stitched.as_slice()
            }
            None => input,
        };

        let mut output = Vec::with_capacity((input.len() as f64 / self.ratio) as usize + 1);
        let mut pos = self.position;

        loop {
            let index = pos.floor() as usize;
            if index + 1 >= samples.len() {
                break;
            }
            let frac = pos - index as f64;
            let a = samples[index] as f64;
            let b = samples[index + 1] as f64;
            output.push((a + (b - a) * frac).round() as i16);
            pos += self.ratio;
        }

        // Remember where we are relative to the last input sample.
        self.position = pos - (samples.len() - 1) as f64;
        self.carry = samples.last().copied();
        output
    }
}
