use serde::Serialize;
use std::fmt;

/// Stored precision of linear PCM samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmFormat {
    #[default]
    Int16,
    Int24,
    Int32,
    Float32,
    Float64,
}

impl PcmFormat {
    pub fn bits(&self) -> u16 {
        match self {
            PcmFormat::Int16 => 16,
            PcmFormat::Int24 => 24,
            PcmFormat::Int32 | PcmFormat::Float32 => 32,
            PcmFormat::Float64 => 64,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PcmFormat::Float32 | PcmFormat::Float64)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_float() { "float" } else { "int" };
        write!(f, "{}-bit {}", self.bits(), kind)
    }
}

/// Interleaved samples at their stored precision
///
/// Integer formats wider than 16 bits are right-aligned in `i32`, so a 24-bit
/// sample keeps its original value.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmSamples {
    Int16(Vec<i16>),
    Int24(Vec<i32>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl PcmSamples {
    pub fn empty(format: PcmFormat) -> Self {
        match format {
            PcmFormat::Int16 => PcmSamples::Int16(Vec::new()),
            PcmFormat::Int24 => PcmSamples::Int24(Vec::new()),
            PcmFormat::Int32 => PcmSamples::Int32(Vec::new()),
            PcmFormat::Float32 => PcmSamples::Float32(Vec::new()),
            PcmFormat::Float64 => PcmSamples::Float64(Vec::new()),
        }
    }

    pub fn format(&self) -> PcmFormat {
        match self {
            PcmSamples::Int16(_) => PcmFormat::Int16,
            PcmSamples::Int24(_) => PcmFormat::Int24,
            PcmSamples::Int32(_) => PcmFormat::Int32,
            PcmSamples::Float32(_) => PcmFormat::Float32,
            PcmSamples::Float64(_) => PcmFormat::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PcmSamples::Int16(s) => s.len(),
            PcmSamples::Int24(s) | PcmSamples::Int32(s) => s.len(),
            PcmSamples::Float32(s) => s.len(),
            PcmSamples::Float64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the samples in `range`
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        match self {
            PcmSamples::Int16(s) => PcmSamples::Int16(s[range].to_vec()),
            PcmSamples::Int24(s) => PcmSamples::Int24(s[range].to_vec()),
            PcmSamples::Int32(s) => PcmSamples::Int32(s[range].to_vec()),
            PcmSamples::Float32(s) => PcmSamples::Float32(s[range].to_vec()),
            PcmSamples::Float64(s) => PcmSamples::Float64(s[range].to_vec()),
        }
    }

    /// Big-endian bytes as stored in a CAF data chunk
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.format().bytes());
        match self {
            PcmSamples::Int16(s) => s.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
            PcmSamples::Int24(s) => s.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes()[1..])),
            PcmSamples::Int32(s) => s.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
            PcmSamples::Float32(s) => s.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
            PcmSamples::Float64(s) => s.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_widths() {
        assert_eq!(PcmFormat::default(), PcmFormat::Int16);
        assert_eq!(PcmFormat::Int24.bytes(), 3);
        assert!(PcmFormat::Float32.is_float());
        assert_eq!(PcmFormat::Float64.to_string(), "64-bit float");
    }

    #[test]
    fn test_24_bit_bytes_keep_low_three() {
        let samples = PcmSamples::Int24(vec![0x12_3456, -1, -0x80_0000]);
        assert_eq!(
            samples.to_be_bytes(),
            vec![0x12, 0x34, 0x56, 0xff, 0xff, 0xff, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_slice_keeps_format() {
        let samples = PcmSamples::Float32(vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(samples.slice(1..3), PcmSamples::Float32(vec![0.25, 0.5]));
        assert!(PcmSamples::empty(PcmFormat::Int24).is_empty());
    }
}
