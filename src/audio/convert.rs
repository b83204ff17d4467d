// Sample layout conversion: channel downmix and sample-rate conversion
//
// Capture backends and the compressed export path both need interleaved i16
// audio at the policy layout (44.1kHz mono). Sources arrive at whatever the
// device or file provides, often in small blocks, so conversion is stateful:
// one `Conformer` lives for a whole stream and carries the resampler history
// across blocks.

use anyhow::{Context, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames handed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

/// Average interleaved channels down to mono
pub fn to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Streaming sample-rate converter over interleaved i16 audio
///
/// Output is aligned with the input: the resampler delay is dropped from the
/// front and `finish` pads the tail, so a stream of N input frames yields
/// exactly `round(N * to / from)` output frames however it was split.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    channels: usize,
    ratio: f64,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Output frames still to drop for the resampler delay
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: u16) -> Result<Self> {
        let channels = channels.max(1) as usize;
        let ratio = to_rate as f64 / from_rate.max(1) as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, CHUNK_FRAMES, channels)
            .context("Failed to create resampler")?;
        let delay = resampler.output_delay();

        debug!(
            "Resampler ready: {}Hz -> {}Hz, {} channels, delay {} frames",
            from_rate, to_rate, channels, delay
        );

        Ok(Self {
            resampler,
            channels,
            ratio,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES); channels],
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Feed interleaved samples, returning whatever output is ready
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>> {
        for frame in samples.chunks_exact(self.channels) {
            for (plane, &sample) in self.pending.iter_mut().zip(frame) {
                plane.push(sample as f32 / 32768.0);
            }
            self.frames_in += 1;
        }

        let mut out = Vec::new();
        while self.pending[0].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(|p| p.drain(..needed).collect()).collect();
            let planes = self.resampler.process(&chunk, None).context("Resampling failed")?;
            self.emit(&planes, u64::MAX, &mut out);
        }
        Ok(out)
    }

    /// Flush the buffered tail; the stream is complete afterwards
    pub fn finish(&mut self) -> Result<Vec<i16>> {
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let mut out = Vec::new();

        let pending = std::mem::take(&mut self.pending);
        if !pending[0].is_empty() {
            let planes = self
                .resampler
                .process_partial(Some(pending.as_slice()), None)
                .context("Resampling failed")?;
            self.emit(&planes, expected, &mut out);
        }

        while self.frames_out < expected {
            let planes = self
                .resampler
                .process_partial::<Vec<f32>>(None, None)
                .context("Resampling failed")?;
            if planes.first().map(|p| p.is_empty()).unwrap_or(true) {
                break;
            }
            self.emit(&planes, expected, &mut out);
        }

        self.pending = vec![Vec::new(); self.channels];
        Ok(out)
    }

    fn emit(&mut self, planes: &[Vec<f32>], limit: u64, out: &mut Vec<i16>) {
        let frames = planes.first().map(|p| p.len()).unwrap_or(0);
        for i in 0..frames {
            if self.delay > 0 {
                self.delay -= 1;
                continue;
            }
            if self.frames_out >= limit {
                break;
            }
            for plane in planes {
                let value = (plane[i] * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32);
                out.push(value as i16);
            }
            self.frames_out += 1;
        }
    }
}

/// Converts a stream to the requested rate and channel count
///
/// Only mono output is produced by a downmix; any other channel mismatch
/// leaves the layout untouched.
pub struct Conformer {
    channels: u16,
    downmix: bool,
    resampler: Option<StreamResampler>,
}

impl Conformer {
    pub fn new(sample_rate: u32, channels: u16, target_rate: u32, target_channels: u16) -> Result<Self> {
        let downmix = target_channels == 1 && channels > 1;
        let out_channels = if downmix { 1 } else { channels };
        let resampler = if sample_rate != target_rate && sample_rate > 0 && target_rate > 0 {
            Some(StreamResampler::new(sample_rate, target_rate, out_channels)?)
        } else {
            None
        };

        Ok(Self {
            channels,
            downmix,
            resampler,
        })
    }

    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>> {
        let samples = if self.downmix {
            to_mono(samples, self.channels)
        } else {
            samples.to_vec()
        };

        match &mut self.resampler {
            Some(resampler) => resampler.push(&samples),
            None => Ok(samples),
        }
    }

    pub fn finish(&mut self) -> Result<Vec<i16>> {
        match &mut self.resampler {
            Some(resampler) => resampler.finish(),
            None => Ok(Vec::new()),
        }
    }
}

/// Convert a whole buffer of interleaved audio in one pass
pub fn conform(samples: &[i16], sample_rate: u32, channels: u16, target_rate: u32, target_channels: u16) -> Result<Vec<i16>> {
    let mut conformer = Conformer::new(sample_rate, channels, target_rate, target_channels)?;
    let mut out = conformer.push(samples)?;
    out.extend(conformer.finish()?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, frames: usize) -> Vec<i16> {
        (0..frames)
            .map(|i| {
                let t = i as f64 / rate as f64;
                (0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() * i16::MAX as f64) as i16
            })
            .collect()
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mono = to_mono(&[100, 200, -100, -300, i16::MAX, i16::MAX], 2);
        assert_eq!(mono, vec![150, -200, i16::MAX]);
    }

    #[test]
    fn test_mono_passthrough() {
        assert_eq!(to_mono(&[1, 2, 3], 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_conform_length() -> Result<()> {
        let output = conform(&sine(48000, 48000), 48000, 1, 44100, 1)?;
        assert_eq!(output.len(), 44100);
        Ok(())
    }

    #[test]
    fn test_blockwise_matches_whole_buffer_length() -> Result<()> {
        let input = sine(48000, 48000);
        let mut conformer = Conformer::new(48000, 1, 44100, 1)?;

        let mut output = Vec::new();
        for block in input.chunks(512) {
            output.extend(conformer.push(block)?);
        }
        output.extend(conformer.finish()?);

        assert_eq!(output.len(), 44100);
        assert_eq!(output, conform(&input, 48000, 1, 44100, 1)?);
        Ok(())
    }

    #[test]
    fn test_conform_keeps_level() -> Result<()> {
        let stereo_48k = vec![1000i16; 48000 * 2];
        let output = conform(&stereo_48k, 48000, 2, 44100, 1)?;
        assert_eq!(output.len(), 44100);

        // Edges see the zero padding; the body holds the input level
        assert!(output[1000..43000].iter().all(|&s| (s - 1000).abs() <= 2));
        Ok(())
    }

    #[test]
    fn test_conform_keeps_stereo() -> Result<()> {
        let stereo = vec![1i16, 2, 1, 2, 1, 2, 1, 2];
        assert_eq!(conform(&stereo, 44100, 2, 44100, 2)?, stereo);

        let resampled = conform(&vec![0i16; 4800 * 2], 48000, 2, 44100, 2)?;
        assert_eq!(resampled.len(), 4410 * 2);
        Ok(())
    }
}
