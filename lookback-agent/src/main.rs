//! Lookback appliance entry point.
//!
//! Wires the rolling capture session, the photo roll and the button watcher
//! together, then runs the trigger→package→upload loop until Ctrl-C.
//!
//! ## Runtime note
//!
//! Everything stateful runs on plain threads owned by lookback-core; Tokio is
//! used only for signal handling and to host the blocking trigger loop on a
//! `spawn_blocking` thread.

mod settings;
mod upload;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use lookback_core::{
    package_outputs, ButtonWatcher, CaptureSession, PhotoRoll, TestPatternGrabber,
};
use settings::{default_settings_path, load_settings, AppSettings, PhotoSource};
use tracing::{error, info, warn};

/// How long the trigger loop blocks per wait before re-checking shutdown.
const TRIGGER_WAIT: Duration = Duration::from_millis(250);

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    info!(
        settings = %settings_path.display(),
        window_secs = settings.audio.duration_seconds,
        "lookback starting"
    );

    let session = Arc::new(
        CaptureSession::new(settings.capture_config())
            .context("invalid capture configuration")?,
    );
    session
        .start()
        .context("failed to start rolling audio capture")?;

    let photo_roll = match settings.photos.source {
        PhotoSource::TestPattern => Some(
            PhotoRoll::spawn(
                settings.photo_config(),
                Box::new(TestPatternGrabber::default()),
            )
            .context("failed to start photo roll")?,
        ),
        PhotoSource::Disabled => {
            info!("photo capture disabled by settings");
            None
        }
    };

    let watcher = build_watcher(&settings)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let trigger = tokio::task::spawn_blocking({
        let settings = settings.clone();
        let session = Arc::clone(&session);
        let shutdown = Arc::clone(&shutdown);
        move || trigger_loop(watcher, settings, session, shutdown)
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    shutdown.store(true, Ordering::SeqCst);
    trigger.await.context("trigger loop panicked")?;

    if let Some(roll) = photo_roll {
        roll.stop();
    }
    session.stop().context("failed to stop capture session")?;
    info!("lookback stopped cleanly");
    Ok(())
}

#[cfg(target_os = "linux")]
fn build_watcher(settings: &AppSettings) -> anyhow::Result<Option<ButtonWatcher>> {
    use lookback_core::trigger::EvdevButton;

    let Some(device) = settings.button.device.as_ref() else {
        warn!("no button device configured; trigger disabled");
        return Ok(None);
    };
    let source = EvdevButton::open(device, settings.button.key_code)
        .with_context(|| format!("cannot open button device {}", device.display()))?;
    let watcher = ButtonWatcher::spawn(Box::new(source), settings.button.poll_interval())
        .context("failed to start button watcher")?;
    info!(
        device = %device.display(),
        key_code = settings.button.key_code,
        "button watcher armed"
    );
    Ok(Some(watcher))
}

#[cfg(not(target_os = "linux"))]
fn build_watcher(_settings: &AppSettings) -> anyhow::Result<Option<ButtonWatcher>> {
    warn!("button input is only supported via evdev on Linux; trigger disabled");
    Ok(None)
}

/// Blocking loop: wait for a press, package, optionally upload, repeat.
fn trigger_loop(
    watcher: Option<ButtonWatcher>,
    settings: AppSettings,
    session: Arc<CaptureSession>,
    shutdown: Arc<AtomicBool>,
) {
    let lock = session.lock_handle();

    while !shutdown.load(Ordering::SeqCst) {
        let pressed = match &watcher {
            Some(watcher) => watcher.wait_for_press(TRIGGER_WAIT),
            None => {
                std::thread::sleep(TRIGGER_WAIT);
                false
            }
        };
        if !pressed {
            continue;
        }

        info!("trigger pressed; packaging outputs");
        match package_outputs(
            &settings.photos.directory,
            settings.photos.max_photos,
            session.output_path(),
            &lock,
            &settings.archive.directory,
        ) {
            Ok(archive) => {
                // The capture lock is long released here; network time is
                // the trigger thread's problem alone.
                if let Some(endpoint) = settings.archive.upload_url.as_deref() {
                    match upload::upload_archive(endpoint, &archive) {
                        Ok(()) => info!(archive = %archive.display(), "archive uploaded"),
                        Err(e) => {
                            warn!("archive upload failed (archive kept on disk): {e:#}")
                        }
                    }
                }
            }
            Err(e) => error!("packaging failed: {e}"),
        }
    }

    if let Some(watcher) = watcher {
        watcher.stop();
    }
}
