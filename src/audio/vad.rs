//! Energy-based voice-activity filter.
//!
//! [`VadFilter`] removes silent stretches from a 16 kHz mono clip before it
//! reaches the STT engine.  Dropping silence keeps whisper from
//! hallucinating text in quiet periods and shortens inference.
//!
//! ## Algorithm
//!
//! Audio is split into 30 ms frames (480 samples @ 16 kHz).  A frame counts
//! as *voice* when its RMS amplitude exceeds the threshold.  Voice frames are
//! kept together with a short hangover of following frames so that word
//! endings are not clipped; every other frame is dropped and the survivors
//! are concatenated in order.

/// Frames kept after the last voice frame of a run (≈ 300 ms).
const HANGOVER_FRAMES: usize = 10;

/// Silence remover driven by per-frame RMS energy.
///
/// ```rust
/// use voice_order::audio::VadFilter;
///
/// let vad = VadFilter::new(0.01);
///
/// // 480 loud samples, 48 000 silent samples, 480 loud samples
/// let mut audio = vec![0.5_f32; 480];
/// audio.extend(vec![0.0_f32; 48_000]);
/// audio.extend(vec![0.5_f32; 480]);
///
/// let speech = vad.retain_voice(&audio);
/// assert!(speech.len() < audio.len() / 4);
/// ```
#[derive(Debug, Clone)]
pub struct VadFilter {
    /// RMS amplitude threshold; frames below this are considered silence.
    rms_threshold: f32,
    /// Frame size in samples.  Default: 480 samples = 30 ms at 16 kHz.
    frame_size: usize,
    hangover: usize,
}

impl VadFilter {
    /// Create a filter with the given RMS threshold and 30 ms frames.
    ///
    /// A typical threshold is `0.01` for a quiet room; use `0.02`–`0.05`
    /// in noisy environments.
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: 480,
            hangover: HANGOVER_FRAMES,
        }
    }

    /// Create a filter with a custom frame size and hangover (in frames).
    ///
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    #[cfg(test)]
    pub(crate) fn with_frames(rms_threshold: f32, frame_size: usize, hangover: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
            hangover,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    fn is_voice_frame(&self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }
        let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }

    /// Return only the voiced portion of `audio`.
    ///
    /// An entirely silent clip yields an empty vector.
    pub fn retain_voice(&self, audio: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(audio.len());
        let mut hangover_left = 0usize;

        for frame in audio.chunks(self.frame_size) {
            if self.is_voice_frame(frame) {
                hangover_left = self.hangover;
                out.extend_from_slice(frame);
            } else if hangover_left > 0 {
                hangover_left -= 1;
                out.extend_from_slice(frame);
            }
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(silent_pre: usize, voice: usize, silent_post: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; silent_pre];
        v.extend(vec![0.5_f32; voice]);
        v.extend(vec![0.0_f32; silent_post]);
        v
    }

    #[test]
    fn drops_leading_silence_and_keeps_hangover() {
        let vad = VadFilter::with_frames(0.01, 480, 1);
        let audio = make_signal(960, 480, 960);
        let kept = vad.retain_voice(&audio);
        // voice frame + one hangover frame
        assert_eq!(kept.len(), 960);
        assert!(kept[..480].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn drops_silence_between_voice_runs() {
        let vad = VadFilter::with_frames(0.01, 160, 0);
        let mut audio = make_signal(0, 160, 1_600);
        audio.extend(vec![0.5_f32; 160]);

        let kept = vad.retain_voice(&audio);
        assert_eq!(kept.len(), 320);
    }

    #[test]
    fn all_silence_returns_empty() {
        let vad = VadFilter::new(0.01);
        assert!(vad.retain_voice(&vec![0.0_f32; 16_000]).is_empty());
    }

    #[test]
    fn no_silence_returns_full_signal() {
        let vad = VadFilter::new(0.01);
        let audio = vec![0.5_f32; 960];
        assert_eq!(vad.retain_voice(&audio), audio);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(VadFilter::new(0.01).retain_voice(&[]).is_empty());
    }

    #[test]
    fn threshold_getter() {
        let vad = VadFilter::new(0.05);
        assert!((vad.threshold() - 0.05).abs() < 1e-7);
    }

    #[test]
    #[should_panic(expected = "frame_size must be > 0")]
    fn zero_frame_size_panics() {
        VadFilter::with_frames(0.01, 0, 0);
    }
}
