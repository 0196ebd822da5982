//! Error types for PetalMix

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalMixError {
    /// Unsupported sample size, channel count or sample rate.
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The source file could not be probed or decoded.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Operation on an empty or unusable resource.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PetalMixError>;
