//! Linux button backend reading the kernel input layer.
//!
//! A button wired to a GPIO pin and declared as a `gpio-keys` node in the
//! device tree shows up as an ordinary `/dev/input/event*` device, so the
//! same backend also covers USB buttons and keyboards. Reading requires the
//! process to be in the `input` group (or root).

use std::path::Path;

use ::evdev::{Device, Key};

use super::PressSource;
use crate::error::{LookbackError, Result};

/// A single key/button on one input device.
pub struct EvdevButton {
    device: Device,
    key: Key,
}

impl EvdevButton {
    /// Open `path` (e.g. `/dev/input/event0`) and watch the key with the
    /// given code (`input-event-codes.h`; `KEY_PROG1` = 148, `BTN_0` = 0x100).
    pub fn open(path: impl AsRef<Path>, key_code: u16) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path).map_err(|e| {
            LookbackError::Trigger(format!(
                "cannot open input device {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            device,
            key: Key::new(key_code),
        })
    }
}

impl PressSource for EvdevButton {
    fn is_pressed(&mut self) -> Result<bool> {
        let keys = self
            .device
            .get_key_state()
            .map_err(|e| LookbackError::Trigger(format!("key state read failed: {e}")))?;
        Ok(keys.contains(self.key))
    }
}
