//! Error types for the alarm subsystem.

/// Top-level error type for scheduling and ringing operations.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    /// Trigger time is not in the future.
    #[error("trigger time is not in the future")]
    InvalidTime,

    /// The platform withheld the exact-alarm capability.
    #[error("exact alarm scheduling permission denied")]
    PermissionDenied,

    /// Schedule store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// The timer facility rejected a registration.
    #[error("registration error: {0}")]
    Registration(String),

    /// Audio engine or sound source error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AlarmError>;
