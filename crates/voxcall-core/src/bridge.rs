//! **AudioBridge** — thread-safe sample queue between scheduling domains.
//!
//! The async side appends PCM frames (`write`), the hardware callback thread
//! drains fixed-size blocks (`read`). The callback must return promptly every
//! invocation, so `read` never blocks and never allocates beyond its output
//! block: a short buffer is answered with a zero-filled (silent) tail.
//! `clear` empties the queue atomically for barge-in.

use std::collections::VecDeque;
use std::sync::Mutex;

/// One fixed-format block of interleaved PCM16 samples.
///
/// Ephemeral: produced by capture or the backend, consumed once. The bridge
/// stores its own copy on insertion, so a frame can be reused or dropped
/// freely after `write`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sample rate in Hz (e.g. 24000).
    pub sample_rate: u32,
    /// Interleaved channel count (1 for mono).
    pub channels: u16,
    /// PCM16 payload.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }
}

/// A queued chunk with a read cursor, so a partially consumed chunk is
/// "requeued" by advancing `offset` instead of shifting samples.
struct Chunk {
    samples: Vec<i16>,
    offset: usize,
}

impl Chunk {
    fn remaining(&self) -> usize {
        self.samples.len() - self.offset
    }
}

struct BridgeState {
    queue: VecDeque<Chunk>,
    queued: usize,
    closed: bool,
}

/// Thread-safe FIFO bridging an async producer to a hardware-callback consumer.
///
/// Contract: `write` is called from the event loop, `read`/`clear` from the
/// audio callback thread. The internal mutex is the only lock in the crate and
/// is held for the minimum critical section; the sample copy on `write`
/// happens before the lock is taken.
pub struct AudioBridge {
    state: Mutex<BridgeState>,
}

impl Default for AudioBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BridgeState {
                queue: VecDeque::new(),
                queued: 0,
                closed: false,
            }),
        }
    }

    /// Append a copy of the frame's samples. Never blocks the caller beyond
    /// the queue push; silently dropped once the bridge is closed.
    pub fn write(&self, frame: &AudioFrame) {
        self.write_slice(&frame.samples);
    }

    /// Slice variant for capture callbacks that have no frame at hand.
    pub fn write_slice(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        // Copy outside the lock so the hardware thread never waits on it.
        let samples = samples.to_vec();
        let mut state = self.state.lock().expect("bridge lock poisoned");
        if state.closed {
            return;
        }
        state.queued += samples.len();
        state.queue.push_back(Chunk {
            samples,
            offset: 0,
        });
    }

    /// Pop exactly `sample_count` samples, splitting chunks as needed. A
    /// deficit is zero-filled at the tail instead of blocking or erroring.
    pub fn read(&self, sample_count: usize) -> Vec<i16> {
        let mut out = vec![0i16; sample_count];
        self.read_into(&mut out);
        out
    }

    /// Allocation-free variant of [`read`](Self::read) for the hardware
    /// callback: fills `out` from the queue and zeroes the remainder.
    pub fn read_into(&self, out: &mut [i16]) {
        let mut filled = 0;
        {
            let mut state = self.state.lock().expect("bridge lock poisoned");
            while filled < out.len() {
                let Some(front) = state.queue.front_mut() else {
                    break;
                };
                let take = front.remaining().min(out.len() - filled);
                let start = front.offset;
                out[filled..filled + take]
                    .copy_from_slice(&front.samples[start..start + take]);
                front.offset += take;
                filled += take;
                let exhausted = front.remaining() == 0;
                if exhausted {
                    state.queue.pop_front();
                }
                state.queued -= take;
            }
        }
        // Buffer underrun: the missing tail stays silent.
        for sample in &mut out[filled..] {
            *sample = 0;
        }
    }

    /// Atomically drop everything queued. Used for barge-in: stale assistant
    /// audio must stop immediately when the user starts speaking.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("bridge lock poisoned");
        state.queue.clear();
        state.queued = 0;
    }

    /// Mark the bridge closed and drop queued samples; later writes are no-ops.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("bridge lock poisoned");
        state.closed = true;
        state.queue.clear();
        state.queued = 0;
    }

    /// Number of samples currently queued.
    pub fn available(&self) -> usize {
        self.state.lock().expect("bridge lock poisoned").queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame::new(24000, 1, samples)
    }

    #[test]
    fn round_trips_samples_in_order() {
        let bridge = AudioBridge::new();
        bridge.write(&frame(vec![1, 2, 3]));
        bridge.write(&frame(vec![4, 5]));
        bridge.write(&frame(vec![6]));

        assert_eq!(bridge.read(6), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(bridge.available(), 0);
    }

    #[test]
    fn splits_oversized_chunk_and_requeues_remainder() {
        let bridge = AudioBridge::new();
        bridge.write(&frame(vec![10, 20, 30, 40, 50]));

        assert_eq!(bridge.read(2), vec![10, 20]);
        assert_eq!(bridge.available(), 3);
        assert_eq!(bridge.read(3), vec![30, 40, 50]);
    }

    #[test]
    fn underrun_is_zero_filled() {
        let bridge = AudioBridge::new();
        bridge.write(&frame(vec![7, 8]));

        assert_eq!(bridge.read(5), vec![7, 8, 0, 0, 0]);
        // Anything after an underrun read is pure silence.
        assert_eq!(bridge.read(3), vec![0, 0, 0]);
    }

    #[test]
    fn clear_then_read_is_silence() {
        let bridge = AudioBridge::new();
        bridge.write(&frame(vec![1; 480]));
        bridge.clear();

        assert_eq!(bridge.read(4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn writes_after_close_are_dropped() {
        let bridge = AudioBridge::new();
        bridge.close();
        bridge.write(&frame(vec![1, 2, 3]));

        assert_eq!(bridge.available(), 0);
        assert_eq!(bridge.read(2), vec![0, 0]);
    }

    #[test]
    fn frame_is_isolated_from_writer_after_insert() {
        let bridge = AudioBridge::new();
        let mut f = frame(vec![9, 9, 9]);
        bridge.write(&f);
        f.samples[0] = 0;

        assert_eq!(bridge.read(3), vec![9, 9, 9]);
    }

    #[test]
    fn concurrent_producer_and_consumer() {
        let bridge = Arc::new(AudioBridge::new());
        let writer = {
            let bridge = Arc::clone(&bridge);
            std::thread::spawn(move || {
                for i in 0..100i16 {
                    bridge.write(&frame(vec![i; 48]));
                }
            })
        };
        // Simulated hardware callback: fixed-size pulls, never blocking.
        let mut pulled = 0usize;
        let mut buf = vec![0i16; 64];
        while pulled < 100 * 48 {
            bridge.read_into(&mut buf);
            pulled += 64;
            if writer.is_finished() && bridge.available() == 0 {
                break;
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn frame_duration() {
        let f = AudioFrame::new(16000, 1, vec![0; 480]);
        assert_eq!(f.duration_ms(), 30);
        let stereo = AudioFrame::new(48000, 2, vec![0; 960]);
        assert_eq!(stereo.duration_ms(), 10);
    }
}
