//! Periodic snapshot drainer.
//!
//! Every `refresh` interval the drainer takes the buffer lock, copies the
//! chronologically ordered window out with [`RingBuffer::snapshot`], releases
//! the lock, and only then serializes the copy to the output WAV. Disk
//! latency therefore never blocks the capture callback; the O(capacity)
//! memory copy is the whole critical section.
//!
//! The output file is replaced atomically: the WAV is written to a sibling
//! temp file and renamed over the target, so a reader copying the file under
//! the shared lock never sees a partial write.
//!
//! [`RingBuffer::snapshot`]: crate::audio::ring::RingBuffer::snapshot

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::{audio::session::BufferHandle, error::Result};

/// Everything the drain loop needs, passed as one struct so the thread
/// closure stays tidy.
pub struct DrainContext {
    pub buffer: BufferHandle,
    pub sample_rate: u32,
    pub channels: u16,
    pub output_path: PathBuf,
    /// Wall-clock interval between drain cycles.
    pub refresh: Duration,
    /// Stop signal, observed once per cycle.
    pub stop: Receiver<()>,
}

/// Result of a single drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The buffer has not completed its first lap yet; nothing was written.
    /// Expected during the first `duration_secs` after start — not an error.
    NotYetFull,
    /// The snapshot file was rewritten with this many frames.
    Written { frames: usize },
}

/// Run the drain loop until the stop channel fires or disconnects.
///
/// Write failures are reported and swallowed; the next interval is the retry.
pub fn run(ctx: DrainContext) {
    info!(path = %ctx.output_path.display(), "snapshot drainer started");
    loop {
        match ctx.stop.recv_timeout(ctx.refresh) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        match drain_once(&ctx.buffer, ctx.sample_rate, ctx.channels, &ctx.output_path) {
            Ok(DrainOutcome::NotYetFull) => {
                debug!("rolling buffer not yet full; waiting to write snapshot")
            }
            Ok(DrainOutcome::Written { frames }) => {
                debug!(frames, path = %ctx.output_path.display(), "snapshot updated")
            }
            Err(e) => warn!("snapshot write failed (retrying next cycle): {e}"),
        }
    }
    info!("snapshot drainer stopped");
}

/// One drain cycle: snapshot under the lock, serialize after releasing it.
///
/// Draining twice with no intervening writes produces byte-identical files.
pub fn drain_once(
    buffer: &BufferHandle,
    sample_rate: u32,
    channels: u16,
    path: &Path,
) -> Result<DrainOutcome> {
    // Critical section: a memory copy, nothing else.
    let samples = {
        let buf = buffer.lock();
        if !buf.is_full() {
            return Ok(DrainOutcome::NotYetFull);
        }
        buf.snapshot()
    };

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let tmp = path.with_extension("wav.tmp");
    let mut writer = hound::WavWriter::create(&tmp, spec)?;
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    fs::rename(&tmp, path)?;

    Ok(DrainOutcome::Written {
        frames: samples.len() / channels as usize,
    })
}
