//! Alarm audio: sound sources, decoding, and looping output.

use std::path::PathBuf;
use std::time::Duration;

pub mod sink;
pub mod source;

pub use sink::CpalSounder;

/// Where the alarm sound comes from. The ringing session walks these in
/// fallback order: configured file, built-in alarm tone, built-in
/// notification tone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundSource {
    /// User-configured sound file.
    File(PathBuf),
    /// Synthesized default alarm tone.
    BuiltinAlarm,
    /// Synthesized default notification tone.
    BuiltinNotification,
}

impl std::fmt::Display for SoundSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::BuiltinAlarm => write!(f, "built-in alarm tone"),
            Self::BuiltinNotification => write!(f, "built-in notification tone"),
        }
    }
}

/// Decoded mono audio ready for the output sink.
#[derive(Debug, Clone)]
pub struct DecodedSound {
    /// Interleaved mono samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// Loops a decoded sound until stopped.
///
/// Implementations report readiness asynchronously; `start_looping`
/// returns once playback has actually begun (or errors within
/// `ready_timeout`), so the caller can transition to ringing only after
/// sound is audible.
pub trait AlarmSounder: Send + Sync {
    /// Start looping playback. Blocks until the engine signals ready or
    /// the timeout elapses.
    fn start_looping(
        &self,
        sound: &DecodedSound,
        ready_timeout: Duration,
    ) -> crate::Result<Box<dyn RingingHandle>>;
}

/// Handle to an actively looping sound.
pub trait RingingHandle: Send {
    /// Stop playback and release the output stream. Idempotent.
    fn stop(&mut self);
}
