// Encoders: stream interleaved PCM into a library file
//
// Lossless output is written in-process as PCM CAF at the requested sample
// precision. AAC output is produced by piping 16-bit PCM into an ffmpeg child
// process, which writes the M4A container.

use anyhow::{bail, Context, Result};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, info, warn};

use super::caf::CafWriter;
use super::pcm::{PcmFormat, PcmSamples};
use crate::quality::{EncoderFormat, QualityPolicy};

/// Encoder configuration for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub format: EncoderFormat,
    /// Rate of the samples handed to the encoder (and of the output)
    pub sample_rate: u32,
    /// Channel count of the samples handed to the encoder
    pub channels: u16,
    /// Precision of the samples handed to the encoder
    pub pcm_format: PcmFormat,
}

impl EncoderSettings {
    /// Settings for the policy's own layout
    pub fn from_policy(policy: &QualityPolicy) -> Self {
        Self {
            format: policy.encoder_format,
            sample_rate: policy.sample_rate,
            channels: policy.channels,
            pcm_format: PcmFormat::Int16,
        }
    }

    /// Same format with a different PCM layout
    pub fn with_layout(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn with_pcm_format(mut self, pcm_format: PcmFormat) -> Self {
        self.pcm_format = pcm_format;
        self
    }
}

/// A single output file being encoded
pub trait SampleEncoder: Send {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()>;

    /// Write samples at their own precision
    ///
    /// Encoders that only take 16-bit input reject anything wider.
    fn write_pcm(&mut self, samples: &PcmSamples) -> Result<()> {
        match samples {
            PcmSamples::Int16(samples) => self.write_samples(samples),
            other => bail!("Encoder does not accept {} samples", other.format()),
        }
    }

    /// Flush and close the output; the file is complete once this returns
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Creates encoders for a path and settings
pub trait EncoderFactory: Send + Sync {
    fn create(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn SampleEncoder>>;
}

/// Default encoder set
#[derive(Debug, Clone)]
pub struct CodecEncoders {
    ffmpeg_path: PathBuf,
    aac_bitrate_kbps: u32,
}

impl CodecEncoders {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, aac_bitrate_kbps: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            aac_bitrate_kbps,
        }
    }
}

impl Default for CodecEncoders {
    fn default() -> Self {
        Self::new("ffmpeg", 128)
    }
}

impl EncoderFactory for CodecEncoders {
    fn create(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn SampleEncoder>> {
        debug!(
            "Creating {:?} encoder: {} ({}Hz, {} channels, {})",
            settings.format,
            path.display(),
            settings.sample_rate,
            settings.channels,
            settings.pcm_format
        );

        match settings.format {
            EncoderFormat::LinearPcm => {
                let writer =
                    CafWriter::create_with_format(path, settings.sample_rate, settings.channels, settings.pcm_format)?;
                Ok(Box::new(CafEncoder { writer }))
            }
            EncoderFormat::Aac => {
                if settings.pcm_format != PcmFormat::Int16 {
                    bail!("AAC encoder takes 16-bit input, not {}", settings.pcm_format);
                }
                let encoder = FfmpegAacEncoder::spawn(
                    &self.ffmpeg_path,
                    path,
                    settings,
                    self.aac_bitrate_kbps,
                )?;
                Ok(Box::new(encoder))
            }
        }
    }
}

struct CafEncoder {
    writer: CafWriter,
}

impl SampleEncoder for CafEncoder {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        self.writer.write_samples(samples)
    }

    fn write_pcm(&mut self, samples: &PcmSamples) -> Result<()> {
        self.writer.write_pcm(samples)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let frames = self.writer.finalize()?;
        debug!("CAF encoder finished: {} frames", frames);
        Ok(())
    }
}

/// AAC encoder backed by an ffmpeg child process
struct FfmpegAacEncoder {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    path: PathBuf,
}

impl FfmpegAacEncoder {
    fn spawn(ffmpeg: &Path, path: &Path, settings: &EncoderSettings, bitrate_kbps: u32) -> Result<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "s16le"])
            .args(["-ar", &settings.sample_rate.to_string()])
            .args(["-ac", &settings.channels.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-c:a", "aac", "-b:a", &format!("{}k", bitrate_kbps)])
            // Container is explicit: partial files do not carry the .m4a extension
            .args(["-f", "ipod"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start AAC encoder ({})", ffmpeg.display()))?;

        let stdin = child.stdin.take().context("AAC encoder has no stdin")?;

        info!("AAC encoder started: {}", path.display());

        Ok(Self {
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            path: path.to_path_buf(),
        })
    }
}

impl SampleEncoder for FfmpegAacEncoder {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        let stdin = self.stdin.as_mut().context("AAC encoder already finished")?;
        for &sample in samples {
            stdin
                .write_all(&sample.to_le_bytes())
                .context("Failed to write samples to AAC encoder")?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().context("Failed to flush AAC encoder input")?;
            // Dropping stdin closes the pipe and lets ffmpeg write the trailer
        }

        let child = self.child.take().context("AAC encoder already finished")?;
        let output = child
            .wait_with_output()
            .context("Failed to wait for AAC encoder")?;

        if !output.status.success() {
            bail!(
                "AAC encoding failed for {}: {}",
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!("AAC encoder finished: {}", self.path.display());
        Ok(())
    }
}

impl Drop for FfmpegAacEncoder {
    fn drop(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            warn!("AAC encoder dropped before finish, killing: {}", self.path.display());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
