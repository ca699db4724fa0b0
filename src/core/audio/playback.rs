//! Pull-based playback buffer between the session event loop and the render
//! callback.
//!
//! The session controller pushes decoded PCM16 samples as `response.audio.delta`
//! events arrive; the audio output device pulls fixed-size blocks once per
//! render quantum. The two sides run on different threads, so every operation
//! goes through a single short-lived lock, and the render path only ever uses
//! `try_lock`: when the producer holds the lock the callback emits one quantum
//! of silence instead of waiting out the contention on the realtime thread.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Divisor used to normalize PCM16 samples into [-1.0, 1.0].
const PCM16_SCALE: f32 = 32768.0;

/// Shared FIFO of pending PCM16 samples.
///
/// Cloning is cheap; all clones observe the same queue. Samples are dequeued
/// in push order, never reordered or duplicated, and [`clear`](Self::clear)
/// discards everything pending atomically with respect to concurrent pulls.
#[derive(Debug, Clone, Default)]
pub struct PlaybackBuffer {
    queue: Arc<Mutex<VecDeque<i16>>>,
}

impl PlaybackBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples at the tail of the queue.
    pub fn push(&self, samples: &[i16]) {
        self.queue.lock().extend(samples.iter().copied());
    }

    /// Discard all pending samples.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Fill `out` with the next block of normalized samples.
    ///
    /// Dequeues up to `out.len()` samples, scales each into [-1.0, 1.0], and
    /// pads any shortfall with silence. Called from the render callback: it
    /// never blocks and never allocates. If the lock is contended the whole
    /// block is silence; the queued audio plays on the next quantum.
    pub fn pull_block(&self, out: &mut [f32]) {
        let Some(mut queue) = self.queue.try_lock() else {
            out.fill(0.0);
            return;
        };
        let available = queue.len().min(out.len());
        for slot in out.iter_mut().take(available) {
            // pop_front cannot fail here: `available` is bounded by queue.len()
            // and the lock is held for the whole loop.
            *slot = f32::from(queue.pop_front().unwrap_or(0)) / PCM16_SCALE;
        }
        out[available..].fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_in_push_order_with_silence_padding() {
        let buffer = PlaybackBuffer::new();
        buffer.push(&[100, 200, 300]);

        let mut block = [0.0f32; 2];
        buffer.pull_block(&mut block);
        assert_eq!(block, [100.0 / 32768.0, 200.0 / 32768.0]);

        buffer.pull_block(&mut block);
        assert_eq!(block, [300.0 / 32768.0, 0.0]);
    }

    #[test]
    fn test_pull_from_empty_is_silence() {
        let buffer = PlaybackBuffer::new();
        let mut block = [1.0f32; 4];
        buffer.pull_block(&mut block);
        assert_eq!(block, [0.0; 4]);
    }

    #[test]
    fn test_clear_discards_everything() {
        let buffer = PlaybackBuffer::new();
        buffer.push(&[1, 2, 3, 4]);
        buffer.clear();
        assert_eq!(buffer.len(), 0);

        let mut block = [1.0f32; 3];
        buffer.pull_block(&mut block);
        assert_eq!(block, [0.0; 3]);
    }

    #[test]
    fn test_negative_samples_normalize() {
        let buffer = PlaybackBuffer::new();
        buffer.push(&[-32768, 32767]);
        let mut block = [0.0f32; 2];
        buffer.pull_block(&mut block);
        assert_eq!(block[0], -1.0);
        assert!((block[1] - 32767.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clones_share_the_queue() {
        let buffer = PlaybackBuffer::new();
        let producer = buffer.clone();
        producer.push(&[7]);
        assert_eq!(buffer.len(), 1);
        producer.clear();
        assert!(buffer.is_empty());
    }

    /// Concurrent pushes, pulls, and clears must never corrupt the queue or
    /// produce a block mixing pre- and post-clear data. Each pushed batch is a
    /// run of one repeated value, so a mixed block would show two values with
    /// a zero gap inside a single pull.
    #[test]
    fn test_concurrent_clear_never_tears_a_block() {
        let buffer = PlaybackBuffer::new();
        let producer = buffer.clone();

        let writer = std::thread::spawn(move || {
            for round in 1..200i16 {
                producer.push(&[round; 64]);
                if round % 5 == 0 {
                    producer.clear();
                }
            }
        });

        let mut block = [0.0f32; 48];
        for _ in 0..500 {
            buffer.pull_block(&mut block);
            // Within one block, ignoring trailing silence, all samples must
            // come from a contiguous run of pushed batches in order.
            let values: Vec<f32> = block.iter().copied().filter(|v| *v != 0.0).collect();
            for pair in values.windows(2) {
                assert!(pair[1] >= pair[0], "block observed out-of-order samples");
            }
        }
        writer.join().unwrap();
    }
}
