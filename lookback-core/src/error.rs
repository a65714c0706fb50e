use thiserror::Error;

/// All errors produced by lookback-core.
#[derive(Debug, Error)]
pub enum LookbackError {
    #[error("invalid capture configuration: {0}")]
    Config(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("capture session is already running")]
    AlreadyRunning,

    #[error("capture session is not running")]
    NotRunning,

    #[error("capture session has already been stopped")]
    SessionStopped,

    #[error("snapshot serialization error: {0}")]
    Snapshot(#[from] hound::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("trigger input error: {0}")]
    Trigger(String),

    #[error("photo capture error: {0}")]
    Photo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LookbackError>;
