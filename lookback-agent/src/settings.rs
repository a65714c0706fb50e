//! Persistent appliance settings (JSON file).
//!
//! Path resolution: `LOOKBACK_CONFIG` env var, else `lookback.json` in the
//! working directory. A missing or unparseable file falls back to defaults —
//! the appliance must come up on first boot with no provisioning.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lookback_core::{CaptureConfig, PhotoRollConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub audio: AudioSettings,
    pub photos: PhotoSettings,
    pub button: ButtonSettings,
    pub archive: ArchiveSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AudioSettings {
    /// Seconds of audio kept in the rolling window.
    pub duration_seconds: u32,
    /// Seconds between snapshot writes.
    pub refresh_seconds: u32,
    /// Rolling snapshot WAV path.
    pub output_file: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Preferred input device name; `null` uses the system default.
    pub input_device: Option<String>,
    /// Largest callback block the window must absorb, in frames.
    pub max_block_frames: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            duration_seconds: 15,
            refresh_seconds: 1,
            output_file: PathBuf::from("rolling_audio.wav"),
            sample_rate: 44_100,
            channels: 1,
            input_device: None,
            max_block_frames: 4096,
        }
    }
}

/// Where photo frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhotoSource {
    /// Synthetic frames — appliances without a camera, and bench setups.
    TestPattern,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PhotoSettings {
    pub source: PhotoSource,
    pub directory: PathBuf,
    pub max_photos: usize,
    pub interval_seconds: u64,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            source: PhotoSource::TestPattern,
            directory: PathBuf::from("photos"),
            max_photos: 15,
            interval_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ButtonSettings {
    /// Input device node (e.g. `/dev/input/event0`); `null` disables the
    /// trigger.
    pub device: Option<PathBuf>,
    /// Key code from `input-event-codes.h`. Default 148 (`KEY_PROG1`), the
    /// usual gpio-keys assignment for a spare hardware button.
    pub key_code: u16,
    pub poll_interval_ms: u64,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            device: None,
            key_code: 148,
            poll_interval_ms: 50,
        }
    }
}

impl ButtonSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ArchiveSettings {
    /// Directory receiving trigger archives.
    pub directory: PathBuf,
    /// Optional HTTP endpoint archives are POSTed to after packaging.
    pub upload_url: Option<String>,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("archives"),
            upload_url: None,
        }
    }
}

impl AppSettings {
    /// Clamp out-of-range values instead of refusing to start; genuinely
    /// unusable combinations are still caught by `CaptureConfig::validate`.
    pub fn normalize(&mut self) {
        self.audio.duration_seconds = self.audio.duration_seconds.clamp(1, 600);
        self.audio.refresh_seconds = self
            .audio
            .refresh_seconds
            .clamp(1, self.audio.duration_seconds);
        self.photos.max_photos = self.photos.max_photos.clamp(1, 1_000);
        self.photos.interval_seconds = self.photos.interval_seconds.clamp(1, 3_600);
        self.button.poll_interval_ms = self.button.poll_interval_ms.clamp(10, 1_000);
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            duration_secs: self.audio.duration_seconds,
            refresh_secs: self.audio.refresh_seconds,
            output_path: self.audio.output_file.clone(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            max_block_frames: self.audio.max_block_frames,
            input_device: self.audio.input_device.clone(),
        }
    }

    pub fn photo_config(&self) -> PhotoRollConfig {
        PhotoRollConfig {
            dir: self.photos.directory.clone(),
            max_photos: self.photos.max_photos,
            interval: Duration::from_secs(self.photos.interval_seconds),
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    std::env::var_os("LOOKBACK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lookback.json"))
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or malformed.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "could not parse settings file {}: {e}; using defaults",
                    path.display()
                );
                AppSettings::default()
            }
        },
        Err(_) => {
            info!(
                "settings file {} not found; using defaults",
                path.display()
            );
            AppSettings::default()
        }
    };
    settings.normalize();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_capture_config() {
        let settings = AppSettings::default();
        assert!(settings.capture_config().validate().is_ok());
        assert!(settings.photo_config().validate().is_ok());
    }

    #[test]
    fn partial_file_fills_remaining_fields_with_defaults() {
        let json = r#"{ "audio": { "durationSeconds": 30 }, "button": { "device": "/dev/input/event2" } }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.audio.duration_seconds, 30);
        assert_eq!(settings.audio.sample_rate, 44_100);
        assert_eq!(
            settings.button.device.as_deref(),
            Some(Path::new("/dev/input/event2"))
        );
        assert_eq!(settings.button.key_code, 148);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings::default();
        settings.audio.duration_seconds = 0;
        settings.audio.refresh_seconds = 999;
        settings.button.poll_interval_ms = 1;
        settings.normalize();
        assert_eq!(settings.audio.duration_seconds, 1);
        assert_eq!(settings.audio.refresh_seconds, 1);
        assert_eq!(settings.button.poll_interval_ms, 10);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookback.json");
        fs::write(&path, "{ not json").unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.audio.duration_seconds, 15);
    }

    #[test]
    fn photo_source_uses_kebab_case() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "photos": { "source": "test-pattern" } }"#).unwrap();
        assert_eq!(settings.photos.source, PhotoSource::TestPattern);
    }
}
