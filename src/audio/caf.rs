// Core Audio Format (CAF) writer for linear PCM
//
// The lossless tier stores recordings and trimmed sounds as big-endian linear
// PCM inside a CAF container, at 16-bit for captures and at the source's own
// precision for trims. The data chunk size is written as -1 (unknown) while
// recording and patched on finalize. Reading goes through symphonia's CAF
// demuxer.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

use super::pcm::{PcmFormat, PcmSamples};

const HEADER_LEN: u64 = 8;
const DESC_CHUNK_LEN: u64 = 12 + 32;
/// Offset of the data chunk's size field
const DATA_SIZE_OFFSET: u64 = HEADER_LEN + DESC_CHUNK_LEN + 4;

const FLAG_IS_FLOAT: u32 = 1;

/// Streaming CAF writer
pub struct CafWriter {
    writer: Option<BufWriter<File>>,
    channels: u16,
    format: PcmFormat,
    samples_written: u64,
}

impl CafWriter {
    /// 16-bit integer CAF
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::create_with_format(path, sample_rate, channels, PcmFormat::Int16)
    }

    pub fn create_with_format(
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: u16,
        format: PcmFormat,
    ) -> Result<Self> {
        let path = path.as_ref();
        if channels == 0 {
            bail!("CAF file needs at least one channel");
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create CAF file: {:?}", path))?;
        let mut writer = BufWriter::new(file);

        let flags = if format.is_float() { FLAG_IS_FLOAT } else { 0 };
        let bytes_per_packet = format.bytes() as u32 * channels as u32;

        // File header
        writer.write_all(b"caff")?;
        writer.write_all(&1u16.to_be_bytes())?;
        writer.write_all(&0u16.to_be_bytes())?;

        // Audio description, big-endian samples
        writer.write_all(b"desc")?;
        writer.write_all(&32i64.to_be_bytes())?;
        writer.write_all(&(sample_rate as f64).to_be_bytes())?;
        writer.write_all(b"lpcm")?;
        writer.write_all(&flags.to_be_bytes())?;
        writer.write_all(&bytes_per_packet.to_be_bytes())?;
        writer.write_all(&1u32.to_be_bytes())?;
        writer.write_all(&(channels as u32).to_be_bytes())?;
        writer.write_all(&(format.bits() as u32).to_be_bytes())?;

        // Audio data, size unknown until finalize
        writer.write_all(b"data")?;
        writer.write_all(&(-1i64).to_be_bytes())?;
        writer.write_all(&0u32.to_be_bytes())?; // edit count

        Ok(Self {
            writer: Some(writer),
            channels,
            format,
            samples_written: 0,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if self.format != PcmFormat::Int16 {
            bail!("CAF writer expects {} samples, got 16-bit int", self.format);
        }
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_all(&sample.to_be_bytes())
                    .context("Failed to write sample to CAF")?;
            }
            self.samples_written += samples.len() as u64;
        }
        Ok(())
    }

    /// Write samples in the writer's own format
    pub fn write_pcm(&mut self, samples: &PcmSamples) -> Result<()> {
        if samples.format() != self.format {
            bail!("CAF writer expects {} samples, got {}", self.format, samples.format());
        }
        if let Some(writer) = &mut self.writer {
            writer
                .write_all(&samples.to_be_bytes())
                .context("Failed to write samples to CAF")?;
            self.samples_written += samples.len() as u64;
        }
        Ok(())
    }

    /// Number of complete frames written so far
    pub fn frames_written(&self) -> u64 {
        self.samples_written / self.channels as u64
    }

    /// Patch the data size, flush and close the file
    pub fn finalize(mut self) -> Result<u64> {
        self.finish()?;
        Ok(self.frames_written())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        let data_size = 4 + self.samples_written * self.format.bytes() as u64;
        writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        writer.write_all(&(data_size as i64).to_be_bytes())?;
        writer.seek(SeekFrom::End(0))?;

        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush CAF file")?;
        file.sync_all().context("Failed to sync CAF file")?;
        Ok(())
    }
}

impl Drop for CafWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finalize CAF writer on drop: {}", e);
        }
    }
}
