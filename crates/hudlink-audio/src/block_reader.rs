use std::collections::VecDeque;
use std::time::Instant;

use crate::ring_buffer::RingConsumer;
use crate::{BLOCK_SIZE_SAMPLES, INPUT_SAMPLE_RATE_HZ};

/// A fixed-length capture block with its mute flag snapshot.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub samples: Vec<i16>,
    /// Mute state at the moment the block was assembled. Muted blocks are
    /// still drained from the device but are never transmitted.
    pub muted: bool,
    pub timestamp: Instant,
}

impl AudioBlock {
    pub fn sample_rate(&self) -> u32 {
        INPUT_SAMPLE_RATE_HZ
    }
}

/// Assembles fixed-size blocks from whatever the ring currently holds.
pub struct BlockReader {
    consumer: RingConsumer,
    pending: VecDeque<i16>,
    samples_emitted: u64,
    start_time: Instant,
    scratch: Vec<i16>,
}

impl BlockReader {
    pub fn new(consumer: RingConsumer) -> Self {
        Self {
            consumer,
            pending: VecDeque::with_capacity(BLOCK_SIZE_SAMPLES * 4),
            samples_emitted: 0,
            start_time: Instant::now(),
            scratch: vec![0i16; BLOCK_SIZE_SAMPLES],
        }
    }

    /// Drain the ring and, if a full block is available, emit it tagged with
    /// the given mute snapshot. Non-blocking.
    pub fn poll_block(&mut self, muted: bool) -> Option<AudioBlock> {
        loop {
            let read = self.consumer.pop(&mut self.scratch);
            if read == 0 {
                break;
            }
            self.pending.extend(&self.scratch[..read]);
        }

        if self.pending.len() < BLOCK_SIZE_SAMPLES {
            return None;
        }

        let samples: Vec<i16> = self.pending.drain(..BLOCK_SIZE_SAMPLES).collect();

        // Timestamp reconstructed from the sample count, not wall reads.
        let elapsed_ms = self.samples_emitted * 1000 / INPUT_SAMPLE_RATE_HZ as u64;
        let timestamp = self.start_time + std::time::Duration::from_millis(elapsed_ms);
        self.samples_emitted += BLOCK_SIZE_SAMPLES as u64;

        Some(AudioBlock {
            samples,
            muted,
            timestamp,
        })
    }

    pub fn buffered_samples(&self) -> usize {
        self.pending.len() + self.consumer.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::CaptureRing;

    #[test]
    fn no_block_until_full_size_available() {
        let (mut producer, consumer) = CaptureRing::new(BLOCK_SIZE_SAMPLES * 4).split();
        let mut reader = BlockReader::new(consumer);

        producer.push(&vec![7i16; BLOCK_SIZE_SAMPLES - 1]).unwrap();
        assert!(reader.poll_block(false).is_none());

        producer.push(&[7i16]).unwrap();
        let block = reader.poll_block(false).expect("block should be ready");
        assert_eq!(block.samples.len(), BLOCK_SIZE_SAMPLES);
        assert!(!block.muted);
    }

    #[test]
    fn mute_snapshot_is_taken_at_assembly_time() {
        let (mut producer, consumer) = CaptureRing::new(BLOCK_SIZE_SAMPLES * 4).split();
        let mut reader = BlockReader::new(consumer);

        producer.push(&vec![1i16; BLOCK_SIZE_SAMPLES]).unwrap();
        let block = reader.poll_block(true).unwrap();
        assert!(block.muted);

        producer.push(&vec![2i16; BLOCK_SIZE_SAMPLES]).unwrap();
        let block = reader.poll_block(false).unwrap();
        assert!(!block.muted);
    }

    #[test]
    fn blocks_preserve_sample_order() {
        let (mut producer, consumer) = CaptureRing::new(BLOCK_SIZE_SAMPLES * 4).split();
        let mut reader = BlockReader::new(consumer);

        let first: Vec<i16> = (0..BLOCK_SIZE_SAMPLES as i32).map(|i| (i % 311) as i16).collect();
        let second: Vec<i16> = (0..BLOCK_SIZE_SAMPLES as i32).map(|i| (i % 97) as i16).collect();
        producer.push(&first).unwrap();
        producer.push(&second).unwrap();

        assert_eq!(reader.poll_block(false).unwrap().samples, first);
        assert_eq!(reader.poll_block(false).unwrap().samples, second);
    }

    #[test]
    fn timestamps_advance_by_block_duration() {
        let (mut producer, consumer) = CaptureRing::new(BLOCK_SIZE_SAMPLES * 4).split();
        let mut reader = BlockReader::new(consumer);

        producer.push(&vec![0i16; BLOCK_SIZE_SAMPLES * 2]).unwrap();
        let a = reader.poll_block(false).unwrap();
        let b = reader.poll_block(false).unwrap();

        let expected_ms = BLOCK_SIZE_SAMPLES as u64 * 1000 / INPUT_SAMPLE_RATE_HZ as u64;
        assert_eq!(
            (b.timestamp - a.timestamp).as_millis() as u64,
            expected_ms
        );
    }
}
