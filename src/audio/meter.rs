// Peak level metering
//
// The capture writer stores the peak of the most recent frame; the metering
// tick reads it on its own cadence. Levels are decibels relative to full
// scale, floored at METER_FLOOR_DB for silence.

use std::sync::atomic::{AtomicU32, Ordering};

/// Level reported for silence or when nothing is being captured
pub const METER_FLOOR_DB: f32 = -160.0;

/// Peak level of a block of samples in dBFS
pub fn peak_db(samples: &[i16]) -> f32 {
    let peak = samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .unwrap_or(0);

    if peak == 0 {
        return METER_FLOOR_DB;
    }

    let normalized = peak as f32 / i16::MAX as f32;
    (20.0 * normalized.log10()).clamp(METER_FLOOR_DB, 0.0)
}

/// Latest level shared between the capture writer and the metering tick
#[derive(Debug)]
pub struct LevelMeter {
    bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(METER_FLOOR_DB.to_bits()),
        }
    }

    pub fn record(&self, samples: &[i16]) {
        self.bits.store(peak_db(samples).to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.bits.store(METER_FLOOR_DB.to_bits(), Ordering::Relaxed);
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_floor() {
        assert_eq!(peak_db(&[0, 0, 0]), METER_FLOOR_DB);
        assert_eq!(peak_db(&[]), METER_FLOOR_DB);
    }

    #[test]
    fn test_full_scale_is_zero() {
        assert!(peak_db(&[i16::MAX]).abs() < 0.001);
        assert!(peak_db(&[i16::MIN]).abs() < 0.001);
    }

    #[test]
    fn test_half_scale() {
        let level = peak_db(&[0, i16::MAX / 2, -100]);
        assert!((level + 6.02).abs() < 0.1, "got {}", level);
    }

    #[test]
    fn test_meter_tracks_latest_block() {
        let meter = LevelMeter::new();
        assert_eq!(meter.level_db(), METER_FLOOR_DB);

        meter.record(&[i16::MAX]);
        assert!(meter.level_db() > -0.01);

        meter.reset();
        assert_eq!(meter.level_db(), METER_FLOOR_DB);
    }
}
