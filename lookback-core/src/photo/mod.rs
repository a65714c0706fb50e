//! Rolling photo directory.
//!
//! A background thread grabs one frame per interval from a [`FrameGrabber`]
//! and writes it as `photo_NNNNNN.jpg`, evicting the oldest file once the
//! directory holds more than `max_photos`. The directory is cleared of stale
//! roll files at start, so its contents always describe the current run.
//!
//! Grab or write failures are logged and skipped — the roll favours staying
//! alive over completeness, same as the audio window.

pub mod stub;

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::error::{LookbackError, Result};

pub use stub::TestPatternGrabber;

const PHOTO_PREFIX: &str = "photo_";
const PHOTO_SUFFIX: &str = ".jpg";

/// Source of encoded JPEG frames.
///
/// Real camera backends (V4L2, libcamera) implement this; tests and
/// camera-less appliances use [`TestPatternGrabber`].
pub trait FrameGrabber: Send {
    /// Grab and encode one frame. Must return the full JPEG byte stream.
    fn grab_frame(&mut self) -> Result<Vec<u8>>;
}

/// Configuration for a rolling photo directory.
#[derive(Debug, Clone)]
pub struct PhotoRollConfig {
    /// Directory holding the roll. Created if missing.
    pub dir: PathBuf,
    /// Most-recent files kept on disk. Default: 15.
    pub max_photos: usize,
    /// Time between frames. Default: 1 s.
    pub interval: Duration,
}

impl Default for PhotoRollConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("photos"),
            max_photos: 15,
            interval: Duration::from_secs(1),
        }
    }
}

impl PhotoRollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_photos == 0 {
            return Err(LookbackError::Config("max_photos must be positive".into()));
        }
        if self.interval.is_zero() {
            return Err(LookbackError::Config("photo interval must be positive".into()));
        }
        Ok(())
    }
}

/// Handle to a running photo roll thread.
pub struct PhotoRoll {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl PhotoRoll {
    /// Prepare the directory (create, clear stale roll files) and spawn the
    /// capture thread.
    pub fn spawn(config: PhotoRollConfig, grabber: Box<dyn FrameGrabber>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;
        let stale = roll_photos(&config.dir)?;
        for photo in &stale {
            if let Err(e) = fs::remove_file(photo) {
                warn!("could not delete stale photo {}: {e}", photo.display());
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "cleared stale photos from previous run");
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let join = std::thread::Builder::new()
            .name("lookback-photos".into())
            .spawn(move || roll_loop(config, grabber, stop_rx))?;

        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    /// Signal the capture thread and join it.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn roll_loop(config: PhotoRollConfig, mut grabber: Box<dyn FrameGrabber>, stop_rx: Receiver<()>) {
    info!(dir = %config.dir.display(), "photo roll started");
    let mut counter = 0u64;
    loop {
        match stop_rx.recv_timeout(config.interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let jpeg = match grabber.grab_frame() {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("frame grab failed: {e}");
                continue;
            }
        };
        let path = config
            .dir
            .join(format!("{PHOTO_PREFIX}{counter:06}{PHOTO_SUFFIX}"));
        if let Err(e) = fs::write(&path, &jpeg) {
            warn!("could not write {}: {e}", path.display());
            continue;
        }
        debug!(path = %path.display(), bytes = jpeg.len(), "photo saved");
        counter += 1;
        if let Err(e) = evict_oldest(&config.dir, config.max_photos) {
            warn!("photo eviction failed: {e}");
        }
    }
    info!("photo roll stopped");
}

/// All roll files in the directory, sorted oldest → newest.
pub fn roll_photos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(PHOTO_PREFIX) && name.ends_with(PHOTO_SUFFIX) {
            photos.push(entry.path());
        }
    }
    photos.sort();
    Ok(photos)
}

/// The newest `n` roll files, oldest → newest. Missing directory is an empty
/// roll, not an error.
pub fn recent_photos(dir: &Path, n: usize) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut photos = roll_photos(dir)?;
    if photos.len() > n {
        photos.drain(..photos.len() - n);
    }
    Ok(photos)
}

fn evict_oldest(dir: &Path, max_photos: usize) -> Result<()> {
    let photos = roll_photos(dir)?;
    if photos.len() > max_photos {
        for oldest in &photos[..photos.len() - max_photos] {
            fs::remove_file(oldest)?;
            debug!(path = %oldest.display(), "evicted oldest photo");
        }
    }
    Ok(())
}
