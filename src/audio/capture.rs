//! Fixed-duration microphone capture via `cpal`.
//!
//! [`AudioSource`] is the seam the pipeline records through.
//! [`CpalRecorder`] is the production implementation: it opens the selected
//! input device, streams for the requested number of seconds, stops the
//! stream and returns a mono [`AudioBuffer`] at the device's native rate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::{AudioBuffer, AudioError};
use super::resample::downmix_to_mono;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("recording duration must be positive, got {0}s")]
    InvalidDuration(f32),

    #[error("capture buffer poisoned by the audio callback")]
    Poisoned,

    #[error(transparent)]
    Audio(#[from] AudioError),
}

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// Blocking, fixed-duration recorder.
///
/// Implementations must be `Send + Sync` so they can be moved onto the
/// blocking thread pool behind an `Arc<dyn AudioSource>`.
pub trait AudioSource: Send + Sync {
    /// Record `seconds` of audio and return it as a mono buffer.
    fn record(&self, seconds: f32) -> Result<AudioBuffer, CaptureError>;

    /// Human-readable identifier of the device being recorded from.
    fn device_label(&self) -> String;
}

// ---------------------------------------------------------------------------
// CpalRecorder
// ---------------------------------------------------------------------------

/// Records from a cpal input device selected by name or index.
#[derive(Debug, Clone, Default)]
pub struct CpalRecorder {
    /// Device name, or its index among the host's input devices.  `None`
    /// selects the default input device.
    device: Option<String>,
}

impl CpalRecorder {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    fn open_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        let Some(wanted) = self.device.as_deref() else {
            return host.default_input_device().ok_or(CaptureError::NoDevice);
        };

        let devices: Vec<cpal::Device> = host.input_devices()?.collect();

        if let Ok(index) = wanted.parse::<usize>() {
            return devices
                .into_iter()
                .nth(index)
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()));
        }

        devices
            .into_iter()
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))
    }
}

impl AudioSource for CpalRecorder {
    fn record(&self, seconds: f32) -> Result<AudioBuffer, CaptureError> {
        if seconds <= 0.0 || !seconds.is_finite() {
            return Err(CaptureError::InvalidDuration(seconds));
        }

        let device = self.open_device()?;
        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let wanted_samples =
            (seconds as f64 * sample_rate as f64).round() as usize * channels as usize;
        let captured = Arc::new(Mutex::new(Vec::<f32>::with_capacity(wanted_samples)));
        let sink = Arc::clone(&captured);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = sink.lock() {
                    let room = wanted_samples.saturating_sub(buf.len());
                    buf.extend_from_slice(&data[..data.len().min(room)]);
                }
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;

        log::debug!(
            "capture: recording {seconds}s at {sample_rate} Hz, {channels} ch"
        );
        stream.play()?;
        std::thread::sleep(Duration::from_secs_f32(seconds));
        drop(stream);

        let samples = {
            let mut buf = captured.lock().map_err(|_| CaptureError::Poisoned)?;
            std::mem::take(&mut *buf)
        };

        // A callback may have delivered a partial frame at the cut-off.
        let whole = samples.len() - samples.len() % channels as usize;
        let mut samples = samples;
        samples.truncate(whole);

        let mono = downmix_to_mono(samples, channels);
        Ok(AudioBuffer::mono(mono, sample_rate)?)
    }

    fn device_label(&self) -> String {
        self.device.clone().unwrap_or_else(|| "default".into())
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Returns a pre-built clip instead of touching audio hardware.
#[cfg(test)]
pub struct MockAudioSource {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub fail: bool,
}

#[cfg(test)]
impl MockAudioSource {
    /// Constant-amplitude clip of `frames` samples, whatever duration is asked for.
    pub fn tone(sample_rate: u32, frames: usize) -> Self {
        Self {
            samples: vec![0.25; frames],
            sample_rate,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 48_000,
            fail: true,
        }
    }
}

#[cfg(test)]
impl AudioSource for MockAudioSource {
    fn record(&self, _seconds: f32) -> Result<AudioBuffer, CaptureError> {
        if self.fail {
            return Err(CaptureError::NoDevice);
        }
        Ok(AudioBuffer::mono(self.samples.clone(), self.sample_rate)?)
    }

    fn device_label(&self) -> String {
        "mock".into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
