//! Sample-rate conversion and channel mixing.
//!
//! The whisper STT engine requires **16 kHz mono `f32`** audio while most
//! microphones deliver 44.1 or 48 kHz.  This module provides the two
//! conversion steps:
//!
//! 1. [`downmix_to_mono`]: average any number of interleaved channels.
//! 2. [`resample`]: band-limited rate conversion with `rubato`'s FFT
//!    resampler.

use rubato::{FftFixedIn, Resampler};

use super::buffer::{AudioBuffer, AudioError};

/// Input chunk handed to the FFT resampler per call.
const CHUNK_FRAMES: usize = 1024;
/// Sub-chunks per FFT chunk; 2 keeps latency low without hurting quality.
const SUB_CHUNKS: usize = 2;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.  With `channels == 1` the
/// input is returned as-is; with `channels == 0` the result is empty.
///
/// ```rust
/// use voice_order::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples,
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Number of frames [`resample`] produces for `frames` input frames:
/// `round(frames * target_rate / source_rate)`.
pub fn output_frames(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    let num = frames as u128 * target_rate as u128;
    let den = source_rate as u128;
    ((num + den / 2) / den) as usize
}

/// Convert `buffer` to `target_rate` Hz, keeping its channel layout.
///
/// * When the buffer is already at `target_rate` it is returned unchanged
///   (moved, not copied).
/// * Otherwise the result holds exactly
///   [`output_frames`]`(frames, source, target)` frames per channel.  The
///   FFT resampler's output delay is removed so the signal stays aligned.
///
/// # Errors
///
/// [`AudioError::InvalidParameter`] for a zero target rate;
/// [`AudioError::Resampling`] if `rubato` rejects the rate pair.
///
/// ```rust
/// use voice_order::audio::{resample, AudioBuffer};
///
/// let hi = AudioBuffer::mono(vec![0.0_f32; 48_000], 48_000).unwrap();
/// let lo = resample(hi, 16_000).unwrap();
/// assert_eq!(lo.frames(), 16_000);
/// assert_eq!(lo.sample_rate(), 16_000);
/// ```
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer, AudioError> {
    if target_rate == 0 {
        return Err(AudioError::InvalidParameter(
            "target sample rate must be > 0".into(),
        ));
    }

    let source_rate = buffer.sample_rate();
    if source_rate == target_rate {
        return Ok(buffer);
    }

    let channels = buffer.channels();
    let frames = buffer.frames();
    let expected = output_frames(frames, source_rate, target_rate);

    if frames == 0 {
        return AudioBuffer::new(Vec::new(), target_rate, channels);
    }

    let planar = deinterleave(buffer.samples(), channels as usize);

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        channels as usize,
    )
    .map_err(|e| AudioError::Resampling(e.to_string()))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted + CHUNK_FRAMES); channels as usize];

    // Full chunks.
    let mut pos = 0;
    while pos + resampler.input_frames_next() <= frames {
        let n = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[pos..pos + n]).collect();
        let produced = resampler
            .process(chunk.as_slice(), None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        append_planar(&mut out, produced);
        pos += n;
    }

    // Trailing partial chunk (zero-padded by rubato).
    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[pos..]).collect();
        let produced = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        append_planar(&mut out, produced);
    }

    // Flush the delay line until the delayed tail has been emitted.
    while out[0].len() < wanted {
        let produced = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| AudioError::Resampling(e.to_string()))?;
        if produced.first().map_or(true, Vec::is_empty) {
            break;
        }
        append_planar(&mut out, produced);
    }

    for channel in &mut out {
        let skip = delay.min(channel.len());
        channel.drain(..skip);
        channel.resize(expected, 0.0);
    }

    AudioBuffer::new(interleave(&out), target_rate, channels)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 1 {
        return vec![samples.to_vec()];
    }
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            planar[ch].push(s);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    if planar.len() == 1 {
        return planar[0].clone();
    }
    let frames = planar.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for ch in planar {
            out.push(ch[i]);
        }
    }
    out
}

fn append_planar(out: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(produced) {
        dst.extend_from_slice(&src);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
