//! Raw ADC readings to moisture percent via two-point calibration.

use anyhow::{ensure, Result};

/// Raw ADC values at the calibration endpoints: `dry_raw` reads as 0 %
/// moisture, `wet_raw` as 100 %. Capacitive sensors read LOWER when wet,
/// so `dry_raw > wet_raw` is the common orientation; both work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRange {
    dry_raw: i32,
    wet_raw: i32,
}

impl CalibrationRange {
    /// Equal endpoints make the interpolation degenerate; that is a
    /// configuration error and is rejected here, never at sample time.
    pub fn new(dry_raw: i32, wet_raw: i32) -> Result<Self> {
        ensure!(
            dry_raw != wet_raw,
            "calibration endpoints are both {dry_raw} - range is zero"
        );
        Ok(Self { dry_raw, wet_raw })
    }

    /// Map a raw reading onto 0..=100, with `dry_raw` at exactly 0 and
    /// `wet_raw` at exactly 100. Out-of-range readings clamp.
    pub fn percent(&self, raw: i32) -> i32 {
        let span = i64::from(self.wet_raw) - i64::from(self.dry_raw);
        let offset = i64::from(raw) - i64::from(self.dry_raw);
        (offset * 100 / span).clamp(0, 100) as i32
    }
}

// ===========================================================================
// Tests
// ===========================================================================
