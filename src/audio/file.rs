use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use std::ops::Range;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::pcm::{PcmFormat, PcmSamples};

/// Fully decoded audio file (interleaved 16-bit PCM)
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode any supported file to 16-bit PCM
    ///
    /// 16-bit WAV is read directly; everything else (CAF, MP3, M4A, AIFF,
    /// 24-bit or float WAV) goes through symphonia.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        if !path.exists() {
            bail!("Audio file not found: {}", path.display());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let (sample_rate, channels, samples) = match extension.as_str() {
            "wav" => match read_wav(path) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("WAV fast path unavailable ({}), using symphonia", e);
                    decode_with_symphonia(path)?
                }
            },
            _ => decode_with_symphonia(path)?,
        };

        Ok(Self::from_samples(path.display().to_string(), sample_rate, channels, samples))
    }

    /// Build an in-memory file from interleaved samples
    pub fn from_samples(path: impl Into<String>, sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        let duration_seconds = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (sample_rate as f64 * channels as f64)
        };

        let file = Self {
            path: path.into(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        };

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            file.duration_seconds,
            file.sample_rate,
            file.channels,
            file.samples.len()
        );

        file
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Interleaved samples covering `[start, end)`, clamped to the file
    pub fn frames_between(&self, start: Duration, end: Duration) -> &[i16] {
        &self.samples[sample_range(self.sample_rate, self.channels, self.samples.len(), start, end)]
    }
}

/// Decoded audio at the source's own sample precision
///
/// Used where samples must pass through unchanged, such as lossless trims.
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: PcmSamples,
}

impl PcmAudio {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Audio file not found: {}", path.display());
        }

        let mut samples: Option<PcmSamples> = None;
        let (sample_rate, channels) = decode_packets(path, |decoded| {
            let target = samples.get_or_insert_with(|| PcmSamples::empty(native_format(&decoded)));
            append_native(target, decoded);
        })?;

        let samples = samples.unwrap_or_else(|| PcmSamples::empty(PcmFormat::Int16));
        debug!(
            "Decoded {} at {} ({}Hz, {} channels, {} samples)",
            path.display(),
            samples.format(),
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.samples.format()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Interleaved samples covering `[start, end)`, clamped to the file
    pub fn frames_between(&self, start: Duration, end: Duration) -> PcmSamples {
        self.samples
            .slice(sample_range(self.sample_rate, self.channels, self.samples.len(), start, end))
    }
}

/// Sample indices of whole frames in `[start, end)`
fn sample_range(sample_rate: u32, channels: u16, len: usize, start: Duration, end: Duration) -> Range<usize> {
    let channels = channels.max(1) as usize;
    let frames = len / channels;
    let to_frame = |d: Duration| ((d.as_secs_f64() * sample_rate as f64).round() as usize).min(frames);

    let first = to_frame(start);
    let last = to_frame(end).max(first);
    first * channels..last * channels
}

/// Stored precision of a decoded buffer; 8-bit widens to 16 without loss
fn native_format(decoded: &AudioBufferRef<'_>) -> PcmFormat {
    match decoded {
        AudioBufferRef::U8(_) | AudioBufferRef::S8(_) | AudioBufferRef::U16(_) | AudioBufferRef::S16(_) => {
            PcmFormat::Int16
        }
        AudioBufferRef::U24(_) | AudioBufferRef::S24(_) => PcmFormat::Int24,
        AudioBufferRef::U32(_) | AudioBufferRef::S32(_) => PcmFormat::Int32,
        AudioBufferRef::F32(_) => PcmFormat::Float32,
        AudioBufferRef::F64(_) => PcmFormat::Float64,
    }
}

fn append_native(target: &mut PcmSamples, decoded: AudioBufferRef<'_>) {
    let spec = *decoded.spec();
    let capacity = decoded.capacity() as u64;

    match target {
        PcmSamples::Int16(out) => {
            let mut buf = SampleBuffer::<i16>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend_from_slice(buf.samples());
        }
        PcmSamples::Int24(out) => {
            // i32 conversion left-aligns; shift back to the 24-bit value
            let mut buf = SampleBuffer::<i32>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend(buf.samples().iter().map(|&s| s >> 8));
        }
        PcmSamples::Int32(out) => {
            let mut buf = SampleBuffer::<i32>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend_from_slice(buf.samples());
        }
        PcmSamples::Float32(out) => {
            let mut buf = SampleBuffer::<f32>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend_from_slice(buf.samples());
        }
        PcmSamples::Float64(out) => {
            let mut buf = SampleBuffer::<f64>::new(capacity, spec);
            buf.copy_interleaved_ref(decoded);
            out.extend_from_slice(buf.samples());
        }
    }
}

fn read_wav(path: &Path) -> Result<(u32, u16, Vec<i16>)> {
    let reader = WavReader::open(path).context("Failed to open WAV file")?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "WAV is {}-bit {:?}, not 16-bit integer",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read audio samples")?;

    Ok((spec.sample_rate, spec.channels, samples))
}

fn decode_with_symphonia(path: &Path) -> Result<(u32, u16, Vec<i16>)> {
    let mut samples = Vec::new();
    let (sample_rate, channels) = decode_packets(path, |decoded| {
        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    })?;
    Ok((sample_rate, channels, samples))
}

/// Run every packet of the first audio track through its decoder
///
/// Returns the sample rate and channel count of the decoded stream.
fn decode_packets(path: &Path, mut on_buffer: impl FnMut(AudioBufferRef<'_>)) -> Result<(u32, u16)> {
    let file = File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported audio format: {:?}", path))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .context("No audio track found")?
        .clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;
        on_buffer(decoded);
    }

    if sample_rate == 0 || channels == 0 {
        bail!("Could not determine audio layout for {:?}", path);
    }

    Ok((sample_rate, channels))
}
