//! Quality policy
//!
//! Maps the two-valued quality tier to the file extension, encoder format and
//! PCM layout used by every other component. Holds no state: callers resolve
//! the policy again for each operation, since the tier can change between any
//! two operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sample rate used for recordings and compressed exports
pub const POLICY_SAMPLE_RATE: u32 = 44_100;

/// Channel count used for recordings and compressed exports
pub const POLICY_CHANNELS: u16 = 1;

/// User-selected audio quality tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Lossless CAF files; bundled presets are hidden
    #[default]
    Lossless,
    /// Compressed M4A files plus bundled presets
    Compressed,
}

impl QualityTier {
    pub const ALL: [QualityTier; 2] = [QualityTier::Lossless, QualityTier::Compressed];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Lossless => "lossless",
            QualityTier::Compressed => "compressed",
        }
    }

    /// Bundled presets are low-fidelity and only shown in the compressed tier
    pub fn shows_bundled_presets(&self) -> bool {
        matches!(self, QualityTier::Compressed)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lossless" | "high" | "alac" => Ok(QualityTier::Lossless),
            "compressed" | "space-saving" | "aac" => Ok(QualityTier::Compressed),
            other => anyhow::bail!("Unknown quality tier: {}", other),
        }
    }
}

/// Encoder format identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderFormat {
    /// 16-bit linear PCM in a CAF container
    LinearPcm,
    /// AAC in an MPEG-4 audio container
    Aac,
}

impl EncoderFormat {
    /// Four character code as written in container headers
    pub fn four_cc(&self) -> [u8; 4] {
        match self {
            EncoderFormat::LinearPcm => *b"lpcm",
            EncoderFormat::Aac => *b"aac ",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, EncoderFormat::LinearPcm)
    }
}

/// Settings resolved from a quality tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityPolicy {
    pub tier: QualityTier,
    pub extension: &'static str,
    pub encoder_format: EncoderFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl QualityPolicy {
    /// True when `path` carries this policy's extension (case-insensitive)
    pub fn matches_extension(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.extension))
            .unwrap_or(false)
    }
}

/// Resolve the policy for a tier
pub fn resolve(tier: QualityTier) -> QualityPolicy {
    match tier {
        QualityTier::Lossless => QualityPolicy {
            tier,
            extension: "caf",
            encoder_format: EncoderFormat::LinearPcm,
            sample_rate: POLICY_SAMPLE_RATE,
            channels: POLICY_CHANNELS,
        },
        QualityTier::Compressed => QualityPolicy {
            tier,
            extension: "m4a",
            encoder_format: EncoderFormat::Aac,
            sample_rate: POLICY_SAMPLE_RATE,
            channels: POLICY_CHANNELS,
        },
    }
}

/// File extensions an import picker should accept for a tier
pub fn allowed_import_extensions(tier: QualityTier) -> &'static [&'static str] {
    match tier {
        QualityTier::Lossless => &["wav", "aif", "aiff", "aifc", "caf"],
        QualityTier::Compressed => &["mp3", "m4a", "mp4", "aac"],
    }
}
