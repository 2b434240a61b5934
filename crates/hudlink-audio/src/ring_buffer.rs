use hudlink_foundation::AudioError;
use rtrb::{Consumer, Producer, RingBuffer};

/// Lock-free SPSC ring between the cpal callback and the block reader.
///
/// The producer side lives on the real-time audio thread and must never
/// block; overflow is reported, not waited out.
pub struct CaptureRing {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl CaptureRing {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (RingProducer, RingConsumer) {
        (
            RingProducer {
                producer: self.producer,
            },
            RingConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer half, owned by the audio callback thread.
pub struct RingProducer {
    producer: Producer<i16>,
}

impl RingProducer {
    /// Non-blocking write; the whole slice goes in or nothing does.
    pub fn push(&mut self, samples: &[i16]) -> Result<usize, AudioError> {
        let mut chunk = match self.producer.write_chunk(samples.len()) {
            Ok(chunk) => chunk,
            Err(_) => {
                return Err(AudioError::BufferOverflow {
                    count: samples.len(),
                })
            }
        };

        // The chunk may wrap; fill both slices.
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        if !second.is_empty() {
            second.copy_from_slice(&samples[split..]);
        }
        chunk.commit_all();
        Ok(samples.len())
    }

    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half, owned by the block reader.
pub struct RingConsumer {
    consumer: Consumer<i16>,
}

impl RingConsumer {
    /// Non-blocking read of up to `buffer.len()` samples; returns the count.
    pub fn pop(&mut self, buffer: &mut [i16]) -> usize {
        let chunk = match self.consumer.read_chunk(buffer.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                self.consumer.read_chunk(available).unwrap()
            }
        };

        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        let split = first.len();
        buffer[..split].copy_from_slice(first);
        if !second.is_empty() {
            buffer[split..split + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }

    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}
