//! Owned audio clip with its sample rate and channel layout.
//!
//! An [`AudioBuffer`] is produced once by capture, consumed once by the
//! resampler and then dropped.

use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Errors raised while converting audio.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// A rate, channel count or sample layout is not usable.
    #[error("invalid audio parameter: {0}")]
    InvalidParameter(String),

    /// The resampling backend failed.
    #[error("resampling failed: {0}")]
    Resampling(String),
}

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Interleaved `f32` PCM samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap `samples` recorded at `sample_rate` Hz with `channels`
    /// interleaved channels.
    ///
    /// # Errors
    ///
    /// [`AudioError::InvalidParameter`] when the rate or channel count is
    /// zero, or when `samples.len()` is not a whole number of frames.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidParameter("sample rate must be > 0".into()));
        }
        if channels == 0 {
            return Err(AudioError::InvalidParameter("channel count must be > 0".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidParameter(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Convenience constructor for mono audio.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_frames_and_duration() {
        let buf = AudioBuffer::mono(vec![0.0; 8_000], 16_000).unwrap();
        assert_eq!(buf.frames(), 8_000);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_frames() {
        let buf = AudioBuffer::new(vec![0.0; 960], 48_000, 2).unwrap();
        assert_eq!(buf.frames(), 480);
        assert!((buf.duration_secs() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(matches!(
            AudioBuffer::mono(vec![0.0; 4], 0),
            Err(AudioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn zero_channels_rejected() {
        assert!(matches!(
            AudioBuffer::new(vec![0.0; 4], 16_000, 0),
            Err(AudioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn ragged_frames_rejected() {
        assert!(matches!(
            AudioBuffer::new(vec![0.0; 5], 16_000, 2),
            Err(AudioError::InvalidParameter(_))
        ));
    }
}
