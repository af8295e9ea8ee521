//! Looping audio output via cpal.
//!
//! The output stream lives on a dedicated thread because cpal streams are
//! not `Send`. The thread signals readiness (playback actually started)
//! or a startup error over a channel; the caller owns the timeout policy.

use super::{AlarmSounder, DecodedSound, RingingHandle};
use crate::error::{AlarmError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Alarm sound output through the system speakers.
pub struct CpalSounder {
    output_device: Option<String>,
}

impl CpalSounder {
    /// Create a sounder targeting the named device, or the system default.
    #[must_use]
    pub fn new(output_device: Option<String>) -> Self {
        Self { output_device }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AlarmError::Playback(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }

    fn resolve_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();

        if let Some(ref name) = self.output_device {
            host.output_devices()
                .map_err(|e| AlarmError::Playback(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| AlarmError::Playback(format!("output device '{name}' not found")))
        } else {
            host.default_output_device()
                .ok_or_else(|| AlarmError::Playback("no default output device".into()))
        }
    }
}

impl AlarmSounder for CpalSounder {
    fn start_looping(
        &self,
        sound: &DecodedSound,
        ready_timeout: Duration,
    ) -> Result<Box<dyn RingingHandle>> {
        if sound.samples.is_empty() {
            return Err(AlarmError::Playback("empty sound buffer".into()));
        }

        let device = self.resolve_device()?;
        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: sound.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let samples: Arc<Vec<f32>> = Arc::new(sound.samples.clone());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = std::thread::Builder::new()
            .name("alarm-audio".into())
            .spawn(move || {
                let mut position = 0usize;
                let loop_samples = Arc::clone(&samples);

                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            *sample = loop_samples[position];
                            // Loop indefinitely until explicitly stopped.
                            position = (position + 1) % loop_samples.len();
                        }
                    },
                    move |err| {
                        error!("alarm output stream error: {err}");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx
                            .send(Err(AlarmError::Playback(format!("cannot build stream: {e}"))));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx
                        .send(Err(AlarmError::Playback(format!("cannot start stream: {e}"))));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Hold the stream alive until stopped; dropping it tears
                // down the device callback.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("alarm audio stream stopped");
            })
            .map_err(|e| AlarmError::Playback(format!("cannot spawn audio thread: {e}")))?;

        match ready_rx.recv_timeout(ready_timeout) {
            Ok(Ok(())) => Ok(Box::new(CpalRingingHandle {
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = stop_tx.send(());
                Err(AlarmError::Playback(format!(
                    "audio engine not ready within {ready_timeout:?}"
                )))
            }
        }
    }
}

struct CpalRingingHandle {
    stop_tx: crossbeam_channel::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RingingHandle for CpalRingingHandle {
    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.stop_tx.send(());
            if thread.join().is_err() {
                error!("alarm audio thread panicked during stop");
            }
        }
    }
}

impl Drop for CpalRingingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
