//! Fixed-capacity circular store for interleaved audio frames.
//!
//! ## Layout
//!
//! One flat `Vec<f32>` of `capacity_frames * channels` samples. The write
//! cursor counts *frames*; a frame is `channels` consecutive samples. Once the
//! cursor has completed a full lap the buffer always holds exactly
//! `capacity_frames` frames, physically wrapped:
//!
//! ```text
//! physical:  [ newest tail | oldest ........ newest head ]
//!                          ▲ write_cursor
//! logical:   buf[cursor..] ++ buf[..cursor]   (oldest → newest)
//! ```
//!
//! The store itself is not synchronized. The capture session wraps it in
//! `Arc<parking_lot::Mutex<_>>` and every writer/reader takes that lock for
//! the duration of a single `write` or `snapshot` call, so a snapshot never
//! observes a half-applied split write.

use crate::error::{LookbackError, Result};

/// Circular storage for the most recent `capacity_frames` frames of audio.
#[derive(Debug)]
pub struct RingBuffer {
    /// Interleaved samples, `capacity_frames * channels` long, zero-initialised.
    samples: Vec<f32>,
    /// Samples per frame.
    channels: usize,
    /// Total frames the buffer can hold.
    capacity_frames: usize,
    /// Frame index of the next write position.
    write_cursor: usize,
    /// True once the cursor has wrapped at least once (every slot written).
    is_full: bool,
}

impl RingBuffer {
    /// Create a buffer holding `capacity_frames` frames of `channels`-channel
    /// audio.
    ///
    /// `max_block_frames` is the largest block a single `write` call is
    /// expected to deliver; the capacity must strictly exceed it so a block
    /// never laps itself.
    ///
    /// # Errors
    /// `LookbackError::Config` when any dimension is zero, the capacity does
    /// not exceed `max_block_frames`, or the sample count overflows `usize`.
    pub fn new(capacity_frames: usize, channels: usize, max_block_frames: usize) -> Result<Self> {
        if channels == 0 {
            return Err(LookbackError::Config("channel count must be positive".into()));
        }
        if capacity_frames == 0 {
            return Err(LookbackError::Config("buffer capacity must be positive".into()));
        }
        if capacity_frames <= max_block_frames {
            return Err(LookbackError::Config(format!(
                "buffer capacity ({capacity_frames} frames) must exceed the largest \
                 expected block ({max_block_frames} frames)"
            )));
        }
        let total = capacity_frames.checked_mul(channels).ok_or_else(|| {
            LookbackError::Config(format!(
                "{capacity_frames} frames x {channels} channels overflows addressable memory"
            ))
        })?;

        Ok(Self {
            samples: vec![0.0; total],
            channels,
            capacity_frames,
            write_cursor: 0,
            is_full: false,
        })
    }

    /// Copy a block of interleaved frames in at the cursor, wrapping at the
    /// end of the buffer.
    ///
    /// A block that straddles the boundary is applied as two contiguous
    /// copies inside this one call, so callers holding the lock around
    /// `write` get split-write atomicity for free. Blocks longer than the
    /// capacity (which configuration is supposed to rule out) keep only the
    /// newest lap.
    pub fn write(&mut self, interleaved: &[f32]) {
        debug_assert_eq!(interleaved.len() % self.channels, 0, "partial frame in block");
        let mut block = interleaved;
        let mut frames = block.len() / self.channels;
        if frames == 0 {
            return;
        }
        if frames > self.capacity_frames {
            block = &block[(frames - self.capacity_frames) * self.channels..];
            frames = self.capacity_frames;
        }

        let end = self.write_cursor + frames;
        let start = self.write_cursor * self.channels;
        if end < self.capacity_frames {
            self.samples[start..start + block.len()].copy_from_slice(block);
        } else {
            // Split copy: [cursor, capacity) then wrap to [0, remainder).
            let split = (self.capacity_frames - self.write_cursor) * self.channels;
            self.samples[start..].copy_from_slice(&block[..split]);
            self.samples[..block.len() - split].copy_from_slice(&block[split..]);
            self.is_full = true;
        }
        self.write_cursor = end % self.capacity_frames;
        if self.write_cursor == 0 {
            // Exactly one full lap completed.
            self.is_full = true;
        }
    }

    /// Full copy of the buffer contents in chronological (oldest → newest)
    /// order.
    ///
    /// Before the first wrap this is the first `write_cursor` frames as
    /// written; after it, the physically-wrapped layout is unrolled as
    /// `buf[cursor..] ++ buf[..cursor]`. Pure memory copy — callers may hold
    /// the buffer lock across it.
    pub fn snapshot(&self) -> Vec<f32> {
        let split = self.write_cursor * self.channels;
        if !self.is_full {
            return self.samples[..split].to_vec();
        }
        let mut out = Vec::with_capacity(self.samples.len());
        out.extend_from_slice(&self.samples[split..]);
        out.extend_from_slice(&self.samples[..split]);
        out
    }

    /// Total frames the buffer can hold.
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Samples per frame.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether every slot has been written at least once.
    pub fn is_full(&self) -> bool {
        self.is_full
    }

    /// Frame index of the next write position.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> RingBuffer {
        RingBuffer::new(capacity, 1, capacity - 1).unwrap()
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(RingBuffer::new(0, 1, 0).is_err());
        assert!(RingBuffer::new(8, 0, 4).is_err());
    }

    #[test]
    fn rejects_capacity_not_exceeding_block() {
        assert!(RingBuffer::new(1024, 1, 1024).is_err());
        assert!(RingBuffer::new(1024, 1, 2048).is_err());
        assert!(RingBuffer::new(1025, 1, 1024).is_ok());
    }

    #[test]
    fn snapshot_before_wrap_returns_writes_in_order() {
        let mut buf = ring(8);
        buf.write(&[1.0, 2.0]);
        buf.write(&[3.0]);
        assert!(!buf.is_full());
        assert_eq!(buf.write_cursor(), 3);
        assert_eq!(buf.snapshot(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_buffer_snapshots_empty() {
        let buf = ring(4);
        assert!(buf.snapshot().is_empty());
        assert!(!buf.is_full());
    }

    #[test]
    fn three_block_wrap_scenario() {
        // capacity 4, writes [1,2] [3,4] [5,6]: physically [5,6,3,4],
        // cursor 2, snapshot unrolls to [3,4,5,6].
        let mut buf = ring(4);
        buf.write(&[1.0, 2.0]);
        buf.write(&[3.0, 4.0]);
        buf.write(&[5.0, 6.0]);
        assert!(buf.is_full());
        assert_eq!(buf.write_cursor(), 2);
        assert_eq!(buf.snapshot(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn single_split_write_scenario() {
        // capacity 4, one 5-frame block: the tail wraps onto index 0,
        // cursor 1, snapshot is the last 4 frames.
        let mut buf = RingBuffer::new(4, 1, 3).unwrap();
        buf.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(buf.is_full());
        assert_eq!(buf.write_cursor(), 1);
        assert_eq!(buf.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn exact_lap_sets_full_with_cursor_at_zero() {
        let mut buf = ring(4);
        buf.write(&[1.0, 2.0, 3.0, 4.0]);
        assert!(buf.is_full());
        assert_eq!(buf.write_cursor(), 0);
        assert_eq!(buf.snapshot(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn matches_truncated_unbounded_log() {
        // Writing capacity + k frames in mixed block sizes must equal the
        // last `capacity` entries of a naive append-only log.
        let capacity = 16;
        let mut buf = ring(capacity);
        let mut log: Vec<f32> = Vec::new();
        let mut next = 0.0f32;
        for block_len in [3usize, 7, 1, 5, 4, 6, 2, 8, 3] {
            let block: Vec<f32> = (0..block_len)
                .map(|_| {
                    next += 1.0;
                    next
                })
                .collect();
            buf.write(&block);
            log.extend_from_slice(&block);
        }
        assert!(log.len() > capacity);
        assert!(buf.is_full());
        assert_eq!(buf.snapshot(), log[log.len() - capacity..].to_vec());
    }

    #[test]
    fn fill_state_flips_once_and_stays() {
        let mut buf = ring(6);
        for i in 0..20 {
            let before = buf.is_full();
            buf.write(&[i as f32]);
            // Full exactly from the write that completes the first lap.
            if i < 5 {
                assert!(!buf.is_full(), "filled too early at write {i}");
            } else {
                assert!(buf.is_full(), "not full at write {i}");
            }
            // Never un-fills.
            if before {
                assert!(buf.is_full());
            }
        }
    }

    #[test]
    fn interleaved_frames_stay_contiguous() {
        let mut buf = RingBuffer::new(3, 2, 2).unwrap();
        buf.write(&[1.0, -1.0, 2.0, -2.0]);
        buf.write(&[3.0, -3.0, 4.0, -4.0]);
        assert!(buf.is_full());
        // Last 3 frames, each frame's channel pair intact.
        assert_eq!(buf.snapshot(), vec![2.0, -2.0, 3.0, -3.0, 4.0, -4.0]);
    }

    #[test]
    fn oversized_block_keeps_newest_lap() {
        let mut buf = ring(4);
        let block: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        buf.write(&block);
        assert!(buf.is_full());
        assert_eq!(buf.snapshot(), vec![6.0, 7.0, 8.0, 9.0]);
    }
}
