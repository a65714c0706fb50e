//! Physical trigger watching.
//!
//! A background thread polls a [`PressSource`] (a GPIO button, typically) at
//! a fixed interval. On press it emits one event and then debounces by
//! waiting for release before watching again, so holding the button yields a
//! single trigger. The owner consumes events with
//! [`ButtonWatcher::wait_for_press`] and shuts the thread down with
//! [`ButtonWatcher::stop`].

#[cfg(target_os = "linux")]
pub mod evdev;

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::error::Result;

#[cfg(target_os = "linux")]
pub use self::evdev::EvdevButton;

/// A debounce-free view of the physical button: just its current level.
///
/// Implementations may fail transiently (device unplugged, permission lost);
/// the watcher logs and keeps polling.
pub trait PressSource: Send {
    fn is_pressed(&mut self) -> Result<bool>;
}

/// Background poll thread for a single button.
pub struct ButtonWatcher {
    press_rx: Receiver<()>,
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ButtonWatcher {
    /// Spawn the poll thread. `poll` is the sampling interval (the original
    /// appliance used 50 ms).
    pub fn spawn(source: Box<dyn PressSource>, poll: Duration) -> Result<Self> {
        // Capacity 1: a press that arrives while the owner is busy packaging
        // collapses into the one pending event instead of queueing repeats.
        let (press_tx, press_rx) = crossbeam_channel::bounded::<()>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let join = std::thread::Builder::new()
            .name("lookback-button".into())
            .spawn(move || watch_loop(source, press_tx, stop_rx, poll))?;

        Ok(Self {
            press_rx,
            stop_tx,
            join: Some(join),
        })
    }

    /// Block up to `timeout` for the next press event. Returns `true` when a
    /// press was observed (and consumed).
    pub fn wait_for_press(&self, timeout: Duration) -> bool {
        self.press_rx.recv_timeout(timeout).is_ok()
    }

    /// Signal the poll thread and join it.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn watch_loop(
    mut source: Box<dyn PressSource>,
    press_tx: Sender<()>,
    stop_rx: Receiver<()>,
    poll: Duration,
) {
    info!("button watcher started");
    loop {
        match stop_rx.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        match source.is_pressed() {
            Ok(true) => {
                debug!("button pressed");
                let _ = press_tx.try_send(());
                // Debounce: wait for release before arming again.
                loop {
                    match stop_rx.recv_timeout(poll) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("button watcher stopped");
                            return;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    match source.is_pressed() {
                        Ok(true) => continue,
                        Ok(false) => break,
                        Err(e) => {
                            warn!("button read failed during debounce: {e}");
                            break;
                        }
                    }
                }
            }
            Ok(false) => {}
            Err(e) => warn!("button read failed: {e}"),
        }
    }
    info!("button watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays a scripted sequence of levels, then holds the last one.
    struct ScriptedButton {
        levels: VecDeque<bool>,
        last: bool,
    }

    impl ScriptedButton {
        fn new(levels: &[bool]) -> Self {
            Self {
                levels: levels.iter().copied().collect(),
                last: false,
            }
        }
    }

    impl PressSource for ScriptedButton {
        fn is_pressed(&mut self) -> Result<bool> {
            if let Some(level) = self.levels.pop_front() {
                self.last = level;
            }
            Ok(self.last)
        }
    }

    #[test]
    fn held_press_emits_a_single_event() {
        // Pressed for four polls, then released.
        let source = ScriptedButton::new(&[false, true, true, true, true, false, false]);
        let watcher =
            ButtonWatcher::spawn(Box::new(source), Duration::from_millis(1)).unwrap();

        assert!(watcher.wait_for_press(Duration::from_millis(500)));
        // The held portion must not produce a second event.
        assert!(!watcher.wait_for_press(Duration::from_millis(50)));
        watcher.stop();
    }

    #[test]
    fn two_distinct_presses_emit_two_events() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct ManualButton {
            level: Arc<AtomicBool>,
        }
        impl PressSource for ManualButton {
            fn is_pressed(&mut self) -> Result<bool> {
                Ok(self.level.load(Ordering::SeqCst))
            }
        }

        let level = Arc::new(AtomicBool::new(false));
        let watcher = ButtonWatcher::spawn(
            Box::new(ManualButton {
                level: Arc::clone(&level),
            }),
            Duration::from_millis(1),
        )
        .unwrap();

        level.store(true, Ordering::SeqCst);
        assert!(watcher.wait_for_press(Duration::from_millis(500)));
        level.store(false, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));

        level.store(true, Ordering::SeqCst);
        assert!(watcher.wait_for_press(Duration::from_millis(500)));
        watcher.stop();
    }

    #[test]
    fn stop_joins_promptly() {
        let source = ScriptedButton::new(&[false]);
        let watcher =
            ButtonWatcher::spawn(Box::new(source), Duration::from_millis(1)).unwrap();
        watcher.stop();
    }

    #[test]
    fn read_errors_do_not_kill_the_watcher() {
        struct FlakyButton {
            calls: usize,
        }
        impl PressSource for FlakyButton {
            fn is_pressed(&mut self) -> Result<bool> {
                self.calls += 1;
                match self.calls {
                    1 => Err(crate::error::LookbackError::Trigger("transient".into())),
                    2 => Ok(true),
                    _ => Ok(false),
                }
            }
        }

        let watcher = ButtonWatcher::spawn(
            Box::new(FlakyButton { calls: 0 }),
            Duration::from_millis(1),
        )
        .unwrap();
        assert!(watcher.wait_for_press(Duration::from_millis(500)));
        watcher.stop();
    }
}
