use thiserror::Error;

/// All errors produced by fabula-core.
#[derive(Debug, Error)]
pub enum FabulaError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("speech recognition error: {0}")]
    Recognition(String),

    #[error("illustration request failed: {0}")]
    Illustration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session is already recording")]
    AlreadyRecording,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FabulaError>;
