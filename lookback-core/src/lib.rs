//! # lookback-core
//!
//! Continuous-capture engine for a small always-on appliance: keep a rolling
//! window of the last N seconds of microphone audio and the last N webcam
//! photos, and bundle both into an archive when a physical button is pressed.
//!
//! ## Architecture
//!
//! ```text
//! Microphone ─► cpal callback ──(lock)──► Arc<Mutex<RingBuffer>>
//!                                              │
//!                            drainer thread ───┤ snapshot() under lock,
//!                            (every refresh)   │ WAV write after release
//!                                              ▼
//!                                        rolling WAV file ◄──(same lock)── packager copy
//!                                                                               │
//! Button press ─► ButtonWatcher ─► package_outputs ─► photos + WAV copy ─► zip archive
//! ```
//!
//! The audio callback never touches the disk; the drainer never holds the
//! buffer lock across file I/O. The packager takes the same lock only for the
//! brief file copy, so it can never observe a half-written snapshot.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod error;
pub mod package;
pub mod photo;
pub mod trigger;

// Convenience re-exports for downstream crates
pub use audio::drain::{drain_once, DrainOutcome};
pub use audio::ring::RingBuffer;
pub use audio::session::{BufferHandle, CaptureConfig, CaptureSession, SessionState};
pub use audio::{BlockSink, RingWriter};
pub use error::LookbackError;
pub use package::package_outputs;
pub use photo::{FrameGrabber, PhotoRoll, PhotoRollConfig, TestPatternGrabber};
pub use trigger::{ButtonWatcher, PressSource};
