//! `CaptureSession` — owns the rolling buffer, its lock, and both worker
//! threads.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureSession::new()        state = Idle
//!     └─► start()              audio thread opens the stream (confirmed via
//!         │                    a sync oneshot), drainer spawned, state = Running
//!         └─► stop()           state = Stopping → signal both threads,
//!                              join both, state = Stopped (terminal)
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the audio thread opens the
//! stream itself and parks on the stop channel until shutdown; the stream is
//! dropped on the thread that created it. The drainer is an ordinary thread
//! woken every `refresh` interval.
//!
//! All cross-thread traffic goes through the shared buffer lock
//! ([`BufferHandle`]) and the two stop channels — there is no other shared
//! mutable state.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::info;

use crate::{
    audio::{drain, ring::RingBuffer, AudioCapture, RingWriter},
    error::{LookbackError, Result},
};

/// The shared mutual-exclusion handle guarding the ring buffer.
///
/// Cloned to the capture callback (writes), the drainer (snapshots) and the
/// packager (consistent copies of the on-disk snapshot file). Each holder
/// runs a single short critical section and never holds the lock across disk
/// or network I/O.
pub type BufferHandle = Arc<Mutex<RingBuffer>>;

/// Configuration for a rolling capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Seconds of audio the rolling window keeps. Default: 15.
    pub duration_secs: u32,
    /// Seconds between snapshot drains to disk. Default: 1.
    pub refresh_secs: u32,
    /// Path of the rolling snapshot WAV, fully rewritten each drain.
    pub output_path: PathBuf,
    /// Capture sample rate in Hz. Default: 44100.
    pub sample_rate: u32,
    /// Interleaved channel count. Default: 1.
    pub channels: u16,
    /// Largest block a single callback is expected to deliver, in frames.
    /// The window capacity must exceed this. Default: 4096.
    pub max_block_frames: usize,
    /// Preferred input device name; `None` uses default input selection.
    pub input_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration_secs: 15,
            refresh_secs: 1,
            output_path: PathBuf::from("rolling_audio.wav"),
            sample_rate: 44_100,
            channels: 1,
            max_block_frames: 4096,
            input_device: None,
        }
    }
}

impl CaptureConfig {
    /// Window capacity in frames: `duration_secs * sample_rate`.
    pub fn capacity_frames(&self) -> usize {
        self.duration_secs as usize * self.sample_rate as usize
    }

    /// Drain cadence as a `Duration`.
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_secs))
    }

    /// Fail fast on a configuration that cannot produce a valid session.
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(LookbackError::Config("duration_secs must be positive".into()));
        }
        if self.refresh_secs == 0 {
            return Err(LookbackError::Config("refresh_secs must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(LookbackError::Config("sample_rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(LookbackError::Config("channels must be positive".into()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(LookbackError::Config("output_path must not be empty".into()));
        }
        Ok(())
    }
}

/// Session lifecycle states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// A rolling audio capture session.
///
/// `CaptureSession` is `Send + Sync` — all fields use interior mutability, so
/// it can be wrapped in an `Arc` and shared between the control thread and
/// the trigger loop.
pub struct CaptureSession {
    config: CaptureConfig,
    /// The shared lock handle; buffer, cursor and fill flag all live behind it.
    buffer: BufferHandle,
    state: Mutex<SessionState>,
    /// Makes the capture callback a no-op once shutdown begins.
    running: Arc<AtomicBool>,
    audio_stop: Mutex<Option<Sender<()>>>,
    audio_join: Mutex<Option<JoinHandle<()>>>,
    drain_stop: Mutex<Option<Sender<()>>>,
    drain_join: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    /// Validate `config` and allocate the ring buffer. Does not start
    /// capturing — call [`start`](Self::start).
    pub fn new(config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        let ring = RingBuffer::new(
            config.capacity_frames(),
            config.channels as usize,
            config.max_block_frames,
        )?;

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(ring)),
            state: Mutex::new(SessionState::Idle),
            running: Arc::new(AtomicBool::new(false)),
            audio_stop: Mutex::new(None),
            audio_join: Mutex::new(None),
            drain_stop: Mutex::new(None),
            drain_join: Mutex::new(None),
        })
    }

    /// Open the input stream and spawn the snapshot drainer.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. Both worker threads keep running until [`stop`](Self::stop).
    ///
    /// # Errors
    /// - `LookbackError::AlreadyRunning` when already started.
    /// - `LookbackError::SessionStopped` after a previous `stop()`.
    /// - Device/stream errors from opening the input at the configured
    ///   rate and channel count.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Idle => *state = SessionState::Running,
                SessionState::Running | SessionState::Stopping => {
                    return Err(LookbackError::AlreadyRunning)
                }
                SessionState::Stopped => return Err(LookbackError::SessionStopped),
            }
        }
        self.running.store(true, Ordering::SeqCst);

        // ── Audio thread: open the !Send stream and hold it until stop ──
        let (audio_stop_tx, audio_stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();
        let config = self.config.clone();
        let writer = RingWriter::new(Arc::clone(&self.buffer));
        let running = Arc::clone(&self.running);

        let audio_join = std::thread::Builder::new()
            .name("lookback-audio".into())
            .spawn(move || {
                let capture = match AudioCapture::open(&config, writer, running) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(()));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                // Stream must be dropped on this thread; park until shutdown.
                let _ = audio_stop_rx.recv();
                drop(capture);
            })?;

        match open_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.fail_start();
                let _ = audio_join.join();
                return Err(e);
            }
            Err(_) => {
                // Channel closed before a message was sent — audio thread panicked?
                self.fail_start();
                let _ = audio_join.join();
                return Err(LookbackError::Other(anyhow::anyhow!(
                    "audio thread died before confirming device open"
                )));
            }
        }

        // ── Drainer thread ──
        let (drain_stop_tx, drain_stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = drain::DrainContext {
            buffer: Arc::clone(&self.buffer),
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            output_path: self.config.output_path.clone(),
            refresh: self.config.refresh(),
            stop: drain_stop_rx,
        };
        let drain_join = std::thread::Builder::new()
            .name("lookback-drain".into())
            .spawn(move || drain::run(ctx))?;

        *self.audio_stop.lock() = Some(audio_stop_tx);
        *self.audio_join.lock() = Some(audio_join);
        *self.drain_stop.lock() = Some(drain_stop_tx);
        *self.drain_join.lock() = Some(drain_join);

        info!(
            window_secs = self.config.duration_secs,
            refresh_secs = self.config.refresh_secs,
            path = %self.config.output_path.display(),
            "rolling capture started"
        );
        Ok(())
    }

    /// Signal both workers, halt the stream and join everything.
    ///
    /// # Errors
    /// `LookbackError::NotRunning` when the session is not running.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Running {
                return Err(LookbackError::NotRunning);
            }
            *state = SessionState::Stopping;
        }

        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.audio_stop.lock().take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.drain_stop.lock().take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.audio_join.lock().take() {
            let _ = join.join();
        }
        if let Some(join) = self.drain_join.lock().take() {
            let _ = join.join();
        }

        *self.state.lock() = SessionState::Stopped;
        info!("rolling capture stopped");
        Ok(())
    }

    /// Current lifecycle state (snapshot).
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The shared lock handle, for collaborators that need a consistent copy
    /// of the snapshot file (take the lock, copy, release — nothing more).
    pub fn lock_handle(&self) -> BufferHandle {
        Arc::clone(&self.buffer)
    }

    /// Path of the rolling snapshot file this session maintains.
    pub fn output_path(&self) -> &std::path::Path {
        &self.config.output_path
    }

    fn fail_start(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.state.lock() = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fields_are_rejected() {
        for mutate in [
            (|c: &mut CaptureConfig| c.duration_secs = 0) as fn(&mut CaptureConfig),
            |c| c.refresh_secs = 0,
            |c| c.sample_rate = 0,
            |c| c.channels = 0,
            |c| c.output_path = PathBuf::new(),
        ] {
            let mut config = CaptureConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn capacity_is_duration_times_rate() {
        let config = CaptureConfig {
            duration_secs: 15,
            sample_rate: 44_100,
            ..CaptureConfig::default()
        };
        assert_eq!(config.capacity_frames(), 661_500);
    }

    #[test]
    fn new_session_starts_idle() {
        let session = CaptureSession::new(CaptureConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn stop_without_start_errors() {
        let session = CaptureSession::new(CaptureConfig::default()).unwrap();
        assert!(matches!(session.stop(), Err(LookbackError::NotRunning)));
    }

    #[test]
    fn tiny_window_cannot_hold_a_block() {
        // 1 s at 1 kHz = 1000 frames, below the default 4096-frame block.
        let config = CaptureConfig {
            duration_secs: 1,
            sample_rate: 1_000,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            CaptureSession::new(config),
            Err(LookbackError::Config(_))
        ));
    }
}
