//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Perform I/O
//! - Allocate on the hot path (the i16/u8 conversion scratch is resized once
//!   and reused)
//! - Block on anything longer than the short-held buffer lock
//!
//! The callback's only side effect is `RingBuffer::write` behind the shared
//! lock; every critical section in this crate is a bounded memory copy, so
//! the wait is a few microseconds at worst.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread; `CaptureSession` accomplishes this by opening it inside the
//! dedicated audio thread.

pub mod drain;
pub mod ring;
pub mod session;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::error::Result;
#[cfg(not(feature = "audio-cpal"))]
use crate::error::LookbackError;
use self::session::{BufferHandle, CaptureConfig};

/// The block-delivery seam between the audio subsystem and the ring buffer.
///
/// One call per delivered block of interleaved f32 frames. Implementations
/// must be quick and deterministic — the caller may be a real-time callback.
pub trait BlockSink: Send {
    fn on_block(&mut self, interleaved: &[f32]);
}

/// The production sink: locks the shared buffer and applies the block.
pub struct RingWriter {
    buffer: BufferHandle,
}

impl RingWriter {
    pub fn new(buffer: BufferHandle) -> Self {
        Self { buffer }
    }
}

impl BlockSink for RingWriter {
    fn on_block(&mut self, interleaved: &[f32]) {
        self.buffer.lock().write(interleaved);
    }
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
}

impl AudioCapture {
    /// Open an input stream at exactly the configured sample rate and
    /// channel count, delivering every block to `sink`.
    ///
    /// Device selection: preferred name from the config, otherwise the
    /// default input device, otherwise the first available device.
    ///
    /// # Errors
    /// `LookbackError::NoDefaultInputDevice` when no microphone exists, or
    /// `LookbackError::AudioStream` when the device rejects the configured
    /// rate/channel combination — a configuration problem, reported before
    /// any capture starts.
    #[cfg(feature = "audio-cpal")]
    pub fn open<S: BlockSink + 'static>(
        config: &CaptureConfig,
        mut sink: S,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        use crate::error::LookbackError;
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = config.input_device.as_deref() {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| LookbackError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(LookbackError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "opening input device"
        );

        // The device's native sample format decides which callback we build;
        // rate and channel count come from our config and are not negotiated.
        let supported = device
            .default_input_config()
            .map_err(|e| LookbackError::AudioDevice(e.to_string()))?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Pre-clone one Arc per sample format branch so each closure owns its flag.
        let running_f32 = Arc::clone(&running);
        let running_i16 = Arc::clone(&running);
        let running_u8 = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _info| {
                    if !running_f32.load(Ordering::Relaxed) {
                        return;
                    }
                    sink.on_block(data);
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),

            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _info| {
                        if !running_i16.load(Ordering::Relaxed) {
                            return;
                        }
                        scratch.resize(data.len(), 0.0);
                        for (dst, sample) in scratch.iter_mut().zip(data) {
                            *dst = *sample as f32 / 32768.0;
                        }
                        sink.on_block(&scratch);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U8 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u8], _info| {
                        if !running_u8.load(Ordering::Relaxed) {
                            return;
                        }
                        scratch.resize(data.len(), 0.0);
                        for (dst, sample) in scratch.iter_mut().zip(data) {
                            *dst = (*sample as f32 - 128.0) / 128.0;
                        }
                        sink.on_block(&scratch);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(LookbackError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LookbackError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LookbackError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open<S: BlockSink + 'static>(
        _config: &CaptureConfig,
        _sink: S,
        _running: Arc<AtomicBool>,
    ) -> Result<Self> {
        Err(LookbackError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::RingBuffer;
    use parking_lot::Mutex;

    #[test]
    fn ring_writer_applies_blocks_under_the_lock() {
        let buffer: BufferHandle =
            Arc::new(Mutex::new(RingBuffer::new(4, 1, 3).unwrap()));
        let mut writer = RingWriter::new(Arc::clone(&buffer));

        writer.on_block(&[1.0, 2.0]);
        writer.on_block(&[3.0, 4.0]);
        writer.on_block(&[5.0, 6.0]);

        let buf = buffer.lock();
        assert!(buf.is_full());
        assert_eq!(buf.snapshot(), vec![3.0, 4.0, 5.0, 6.0]);
    }
}
