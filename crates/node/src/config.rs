//! TOML config file loading and validation for the irrigation node.
//!
//! Everything tunable lives here: calibration endpoints, hysteresis
//! thresholds, sample counts, webhook delivery knobs, and the duty-cycle
//! multipliers. Validation rejects bad values at startup so the measurement
//! code never has to re-check them per cycle.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    pub calibration: Calibration,
    pub adc: Adc,
    pub thresholds: Thresholds,
    pub sampling: Sampling,
    pub tank: Tank,
    pub webhook: Webhook,
    pub sleep: Sleep,
    #[serde(default)]
    pub hw: HwConfig,
}

/// Raw ADC values at 0 % and 100 % soil moisture. Capacitive probes read
/// lower when wet, so `raw_dry > raw_wet` is the usual orientation.
#[derive(Debug, Deserialize)]
pub struct Calibration {
    pub raw_dry: i32,
    pub raw_wet: i32,
}

#[derive(Debug, Deserialize)]
pub struct Adc {
    /// Maximum raw reading the converter can produce.
    pub full_scale: i32,
    /// Reference voltage corresponding to a full-scale reading.
    pub ref_volts: f32,
}

/// Hysteresis band: irrigation starts below `start_percent` and the pump
/// sub-loop runs until a probe reading reaches `stop_percent`.
#[derive(Debug, Deserialize)]
pub struct Thresholds {
    pub start_percent: i32,
    pub stop_percent: i32,
}

#[derive(Debug, Deserialize)]
pub struct Sampling {
    /// Readings averaged for the main per-cycle measurement.
    pub cycle_samples: u32,
    /// Readings averaged for each probe inside the pump sub-loop.
    pub probe_samples: u32,
    /// Settle delay after each individual reading.
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Tank {
    /// Tank sensor voltage below which the low-level warning fires.
    pub low_level_volts: f32,
}

#[derive(Debug, Deserialize)]
pub struct Webhook {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub connect_attempts: u32,
    pub connect_timeout_ms: u64,
    pub response_timeout_sec: u64,
    pub poll_interval_ms: u64,
}

/// Sleep duration is `wake_interval * sleep_multiplier` seconds.
#[derive(Debug, Deserialize)]
pub struct Sleep {
    pub wake_interval: u64,
    pub sleep_multiplier: u64,
}

/// Hardware wiring, only consulted by `hw` builds. Defaults match the
/// reference board.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HwConfig {
    pub i2c_addr: u16,
    pub soil_channel: usize,
    pub tank_channel: usize,
    pub pump_gpio: u8,
    pub w1_device: String,
    pub iio_dir: String,
}

impl Default for HwConfig {
    fn default() -> Self {
        Self {
            i2c_addr: 0x48,
            soil_channel: 0,
            tank_channel: 1,
            pump_gpio: 21,
            w1_device: "/sys/bus/w1/devices/28-000000000000/w1_slave".to_string(),
            iio_dir: "/sys/bus/iio/devices/iio:device0".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// BCM GPIO pins usable for the pump line on the 40-pin header. GPIO 0-1
/// are reserved for the ID EEPROM; 28+ are not exposed.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

/// Highest ADS1115 single-ended input index.
const MAX_ADC_CHANNEL: usize = 3;

impl NodeConfig {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_measurement(&mut errors);
        self.validate_webhook(&mut errors);
        self.validate_sleep(&mut errors);
        self.validate_hw(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_measurement(&self, errors: &mut Vec<String>) {
        // -- ADC --------------------------------------------------------
        if self.adc.full_scale <= 0 {
            errors.push(format!(
                "adc: full_scale must be positive, got {}",
                self.adc.full_scale
            ));
        }
        if !(self.adc.ref_volts.is_finite() && self.adc.ref_volts > 0.0) {
            errors.push(format!(
                "adc: ref_volts must be a positive voltage, got {}",
                self.adc.ref_volts
            ));
        }

        // -- Calibration ------------------------------------------------
        let raw_range = 0..=self.adc.full_scale;
        if !raw_range.contains(&self.calibration.raw_dry) {
            errors.push(format!(
                "calibration: raw_dry {} out of ADC range [0, {}]",
                self.calibration.raw_dry, self.adc.full_scale
            ));
        }
        if !raw_range.contains(&self.calibration.raw_wet) {
            errors.push(format!(
                "calibration: raw_wet {} out of ADC range [0, {}]",
                self.calibration.raw_wet, self.adc.full_scale
            ));
        }
        if self.calibration.raw_dry == self.calibration.raw_wet {
            errors.push(format!(
                "calibration: raw_dry and raw_wet are both {} - range is zero",
                self.calibration.raw_dry
            ));
        }

        // -- Thresholds -------------------------------------------------
        if !(0..=100).contains(&self.thresholds.start_percent) {
            errors.push(format!(
                "thresholds: start_percent {} out of range [0, 100]",
                self.thresholds.start_percent
            ));
        }
        if !(0..=100).contains(&self.thresholds.stop_percent) {
            errors.push(format!(
                "thresholds: stop_percent {} out of range [0, 100]",
                self.thresholds.stop_percent
            ));
        }
        // The pump sub-loop only terminates once a probe reading reaches
        // stop_percent, so the band must be a real hysteresis band.
        if self.thresholds.stop_percent <= self.thresholds.start_percent {
            errors.push(format!(
                "thresholds: stop_percent ({}) must be greater than start_percent ({})",
                self.thresholds.stop_percent, self.thresholds.start_percent
            ));
        }

        // -- Sampling ---------------------------------------------------
        if self.sampling.cycle_samples == 0 {
            errors.push("sampling: cycle_samples must be at least 1".to_string());
        }
        if self.sampling.probe_samples == 0 {
            errors.push("sampling: probe_samples must be at least 1".to_string());
        }

        // -- Tank -------------------------------------------------------
        if !self.tank.low_level_volts.is_finite() || self.tank.low_level_volts < 0.0 {
            errors.push(format!(
                "tank: low_level_volts must be non-negative, got {}",
                self.tank.low_level_volts
            ));
        } else if self.adc.ref_volts.is_finite() && self.tank.low_level_volts > self.adc.ref_volts {
            errors.push(format!(
                "tank: low_level_volts ({}) exceeds adc ref_volts ({}) - warning would never clear",
                self.tank.low_level_volts, self.adc.ref_volts
            ));
        }
    }

    fn validate_webhook(&self, errors: &mut Vec<String>) {
        if self.webhook.host.trim().is_empty() {
            errors.push("webhook: host is empty".to_string());
        }
        if self.webhook.port == 0 {
            errors.push("webhook: port must be non-zero".to_string());
        }
        if !self.webhook.path.starts_with('/') {
            errors.push(format!(
                "webhook: path '{}' must start with '/'",
                self.webhook.path
            ));
        }
        if self.webhook.connect_attempts == 0 {
            errors.push("webhook: connect_attempts must be at least 1".to_string());
        }
        if self.webhook.connect_timeout_ms == 0 {
            errors.push("webhook: connect_timeout_ms must be positive".to_string());
        }
        if self.webhook.response_timeout_sec == 0 {
            errors.push("webhook: response_timeout_sec must be positive".to_string());
        }
        if self.webhook.poll_interval_ms == 0 {
            errors.push("webhook: poll_interval_ms must be positive".to_string());
        }
    }

    fn validate_sleep(&self, errors: &mut Vec<String>) {
        if self.sleep.wake_interval == 0 {
            errors.push("sleep: wake_interval must be at least 1".to_string());
        }
        if self.sleep.sleep_multiplier == 0 {
            errors.push("sleep: sleep_multiplier must be at least 1".to_string());
        }
    }

    fn validate_hw(&self, errors: &mut Vec<String>) {
        if !(0x08..=0x77).contains(&self.hw.i2c_addr) {
            errors.push(format!(
                "hw: i2c_addr {:#04x} outside the 7-bit address range [0x08, 0x77]",
                self.hw.i2c_addr
            ));
        }
        if self.hw.soil_channel > MAX_ADC_CHANNEL {
            errors.push(format!(
                "hw: soil_channel {} exceeds ADS1115 maximum ({MAX_ADC_CHANNEL})",
                self.hw.soil_channel
            ));
        }
        if self.hw.tank_channel > MAX_ADC_CHANNEL {
            errors.push(format!(
                "hw: tank_channel {} exceeds ADS1115 maximum ({MAX_ADC_CHANNEL})",
                self.hw.tank_channel
            ));
        }
        if self.hw.soil_channel == self.hw.tank_channel {
            errors.push(format!(
                "hw: soil_channel and tank_channel are both {}",
                self.hw.soil_channel
            ));
        }
        if !VALID_GPIO_PINS.contains(&self.hw.pump_gpio) {
            errors.push(format!(
                "hw: pump_gpio {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.hw.pump_gpio
            ));
        }
        if self.hw.w1_device.trim().is_empty() {
            errors.push("hw: w1_device is empty".to_string());
        }
        if self.hw.iio_dir.trim().is_empty() {
            errors.push("hw: iio_dir is empty".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<NodeConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: NodeConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
