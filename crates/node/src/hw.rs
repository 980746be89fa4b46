//! Hardware board for embedded Linux (feature `hw`): ADS1115 analog inputs
//! over I2C, a GPIO pump line, and sysfs-backed temperature/climate probes.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;

use crate::config::NodeConfig;
use crate::ports::{AnalogPort, ClimateProbe, SwitchPort, TempProbe};

// ---------------------------------------------------------------------------
// ADS1115
// ---------------------------------------------------------------------------

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

/// OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot), DR=100 (128 SPS),
/// comparator disabled.
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// MUX values for single-ended reads (AINx vs GND), bits [14:12].
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];
const MAX_CHANNEL: usize = 3;

/// Conversion time at 128 SPS is ~7.8 ms; wait 9 ms for margin.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register reads back as conversion-ready.
const OS_READY_BIT: u16 = 1 << 15;

fn config_for_channel(channel: usize) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel] << MUX_SHIFT)
}

/// One single-ended ADS1115 input, read in single-shot mode.
pub struct AdcChannel {
    i2c: I2c,
    channel: usize,
}

impl AdcChannel {
    pub fn open(addr: u16, channel: usize) -> Result<Self> {
        ensure!(
            channel <= MAX_CHANNEL,
            "ADS1115 channel {channel} out of range (0-{MAX_CHANNEL})"
        );
        let mut i2c = I2c::new().context("failed to open I2C bus")?;
        i2c.set_slave_address(addr)?;
        Ok(Self { i2c, channel })
    }
}

impl AnalogPort for AdcChannel {
    fn read(&mut self) -> Result<i32> {
        let config_bytes = config_for_channel(self.channel).to_be_bytes();
        self.i2c.block_write(REG_CONFIG, &config_bytes)?;
        thread::sleep(CONVERSION_WAIT);

        // One wait is normally enough at 128 SPS; confirm via the OS bit
        // and retry briefly if the conversion is still running.
        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        // Single-ended reads are non-negative; clamp against bus corruption.
        Ok(i32::from(i16::from_be_bytes(buf)).max(0))
    }
}

// ---------------------------------------------------------------------------
// Pump line
// ---------------------------------------------------------------------------

/// The pump relay line, driven active-high. Forced OFF at startup and on
/// drop so a crashed cycle cannot leave water running.
pub struct PumpLine {
    pin: OutputPin,
}

impl PumpLine {
    pub fn open(gpio_pin: u8) -> Result<Self> {
        let mut pin = Gpio::new()?.get(gpio_pin)?.into_output();
        pin.set_low();
        Ok(Self { pin })
    }
}

impl SwitchPort for PumpLine {
    fn set(&mut self, on: bool) -> Result<()> {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

impl Drop for PumpLine {
    fn drop(&mut self) {
        self.pin.set_low();
    }
}

// ---------------------------------------------------------------------------
// One-wire thermometer
// ---------------------------------------------------------------------------

/// DS18B20-class probe exposed by the kernel one-wire driver as a
/// `w1_slave` file under `/sys/bus/w1/devices/`.
pub struct W1Thermometer {
    path: PathBuf,
}

impl W1Thermometer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TempProbe for W1Thermometer {
    fn read_celsius(&mut self) -> f32 {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_w1_slave(&contents),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "w1 read failed: {e}");
                f32::NAN
            }
        }
    }
}

/// Parse the two-line `w1_slave` format. NaN when the CRC line does not end
/// in "YES" or the `t=` field is missing or malformed.
fn parse_w1_slave(contents: &str) -> f32 {
    let mut lines = contents.lines();
    let crc_ok = lines
        .next()
        .is_some_and(|line| line.trim_end().ends_with("YES"));
    if !crc_ok {
        return f32::NAN;
    }
    let Some(data) = lines.next() else {
        return f32::NAN;
    };
    match data.rsplit_once("t=") {
        Some((_, milli)) => milli
            .trim()
            .parse::<f32>()
            .map(|m| m / 1000.0)
            .unwrap_or(f32::NAN),
        None => f32::NAN,
    }
}

// ---------------------------------------------------------------------------
// IIO climate probe
// ---------------------------------------------------------------------------

/// DHT22-class probe through the kernel IIO driver: milli-unit values in
/// `in_humidityrelative_input` and `in_temp_input`.
pub struct IioClimateProbe {
    dir: PathBuf,
}

impl IioClimateProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_milli(&self, file: &str) -> f32 {
        let path = self.dir.join(file);
        match fs::read_to_string(&path) {
            Ok(contents) => parse_milli(&contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), "iio read failed: {e}");
                f32::NAN
            }
        }
    }
}

impl ClimateProbe for IioClimateProbe {
    fn read_humidity(&mut self) -> f32 {
        self.read_milli("in_humidityrelative_input")
    }

    fn read_celsius(&mut self) -> f32 {
        self.read_milli("in_temp_input")
    }
}

fn parse_milli(contents: &str) -> f32 {
    contents
        .trim()
        .parse::<f32>()
        .map(|m| m / 1000.0)
        .unwrap_or(f32::NAN)
}

// ---------------------------------------------------------------------------
// Board assembly
// ---------------------------------------------------------------------------

/// Open every hardware interface named in the `[hw]` config section.
pub fn build(
    cfg: &NodeConfig,
) -> Result<(AdcChannel, AdcChannel, PumpLine, W1Thermometer, IioClimateProbe)> {
    let hw = &cfg.hw;
    Ok((
        AdcChannel::open(hw.i2c_addr, hw.soil_channel).context("soil moisture ADC")?,
        AdcChannel::open(hw.i2c_addr, hw.tank_channel).context("tank level ADC")?,
        PumpLine::open(hw.pump_gpio).context("pump GPIO")?,
        W1Thermometer::new(&hw.w1_device),
        IioClimateProbe::new(&hw.iio_dir),
    ))
}

// ===========================================================================
// Tests
// ===========================================================================
