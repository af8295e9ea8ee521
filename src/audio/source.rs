//! Sound source loading.
//!
//! User-configured files are decoded to mono f32 via symphonia; the two
//! built-in sources are synthesized so a ringing session always has a
//! last-resort sound that cannot fail to load.

use super::{DecodedSound, SoundSource};
use crate::error::{AlarmError, Result};
use std::path::Path;

/// Sample rate for synthesized built-in tones.
const TONE_SAMPLE_RATE: u32 = 44_100;

/// Load a sound source into playable samples.
pub fn load(source: &SoundSource) -> Result<DecodedSound> {
    match source {
        SoundSource::File(path) => decode_file_to_mono_f32(path),
        SoundSource::BuiltinAlarm => Ok(builtin_alarm_tone()),
        SoundSource::BuiltinNotification => Ok(builtin_notification_tone()),
    }
}

fn decode_file_to_mono_f32(path: &Path) -> Result<DecodedSound> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .map_err(|e| AlarmError::Playback(format!("cannot open {}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AlarmError::Playback(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AlarmError::Playback("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AlarmError::Playback("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AlarmError::Playback(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    break;
                }
                return Err(AlarmError::Playback(format!("audio read error: {e}")));
            }
            Err(e) => return Err(AlarmError::Playback(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(AlarmError::Playback(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;

        let frames_usize = usize::try_from(frames).unwrap_or(usize::MAX);
        let required = frames_usize.saturating_mul(channels);
        let needs_new = match sample_buf.as_ref() {
            Some(b) => b.capacity() < required,
            None => true,
        };

        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }

        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
        }

        let data = match sample_buf.as_ref() {
            Some(b) => b.samples(),
            None => &[],
        };
        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            for frame in data.chunks_exact(channels) {
                let mut sum = 0.0f32;
                for s in frame {
                    sum += *s;
                }
                out.push(sum / channels as f32);
            }
        }
    }

    if out.is_empty() {
        return Err(AlarmError::Playback(format!(
            "{} decoded to zero samples",
            path.display()
        )));
    }

    Ok(DecodedSound {
        samples: out,
        sample_rate,
    })
}

/// Classic pulsed alarm beep: 880 Hz, 400 ms on / 200 ms off, twice.
/// The session loops the buffer, so two pulses are enough.
fn builtin_alarm_tone() -> DecodedSound {
    let mut samples = Vec::new();
    for _ in 0..2 {
        append_sine(&mut samples, 880.0, 0.4, 0.8);
        append_silence(&mut samples, 0.2);
    }
    DecodedSound {
        samples,
        sample_rate: TONE_SAMPLE_RATE,
    }
}

/// Softer two-tone chime used when the alarm tone itself is unplayable.
fn builtin_notification_tone() -> DecodedSound {
    let mut samples = Vec::new();
    append_sine(&mut samples, 660.0, 0.25, 0.5);
    append_sine(&mut samples, 880.0, 0.25, 0.5);
    append_silence(&mut samples, 0.5);
    DecodedSound {
        samples,
        sample_rate: TONE_SAMPLE_RATE,
    }
}

fn append_sine(samples: &mut Vec<f32>, freq: f32, seconds: f32, amplitude: f32) {
    let count = (seconds * TONE_SAMPLE_RATE as f32) as usize;
    let fade = (0.01 * TONE_SAMPLE_RATE as f32) as usize;
    for i in 0..count {
        let t = i as f32 / TONE_SAMPLE_RATE as f32;
        let mut value = amplitude * (2.0 * std::f32::consts::PI * freq * t).sin();
        // Short linear ramps at the edges avoid clicks between segments.
        if i < fade {
            value *= i as f32 / fade as f32;
        } else if count - i < fade {
            value *= (count - i) as f32 / fade as f32;
        }
        samples.push(value);
    }
}

fn append_silence(samples: &mut Vec<f32>, seconds: f32) {
    let count = (seconds * TONE_SAMPLE_RATE as f32) as usize;
    samples.extend(std::iter::repeat_n(0.0, count));
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn builtin_alarm_tone_loads() {
        let sound = load(&SoundSource::BuiltinAlarm).unwrap();
        assert_eq!(sound.sample_rate, TONE_SAMPLE_RATE);
        assert!(!sound.samples.is_empty());
        assert!(sound.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn builtin_notification_tone_loads() {
        let sound = load(&SoundSource::BuiltinNotification).unwrap();
        assert!(!sound.samples.is_empty());
    }

    #[test]
    fn missing_file_is_a_playback_error() {
        let err = load(&SoundSource::File("/nonexistent/alarm.mp3".into())).unwrap_err();
        assert!(matches!(err, AlarmError::Playback(_)));
    }

    #[test]
    fn garbage_file_is_a_playback_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarm.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let err = load(&SoundSource::File(path)).unwrap_err();
        assert!(matches!(err, AlarmError::Playback(_)));
    }

    #[test]
    fn alarm_tone_contains_silence_gap() {
        let sound = load(&SoundSource::BuiltinAlarm).unwrap();
        let silent = sound.samples.iter().filter(|s| **s == 0.0).count();
        // Two 200 ms gaps at 44.1 kHz.
        assert!(silent >= (0.4 * TONE_SAMPLE_RATE as f32) as usize);
    }
}
