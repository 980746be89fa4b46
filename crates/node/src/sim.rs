//! Simulated board for development without hardware.
//!
//! Soil moisture follows a random walk with mean reversion and per-reading
//! electronic noise, and it responds to the pump: while watering, readings
//! trend toward the wet calibration endpoint. That response is what lets
//! the irrigation sub-loop terminate in simulation.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;

use crate::config::NodeConfig;
use crate::ports::{AnalogPort, ClimateProbe, SwitchPort, TempProbe};

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) with the Irwin-Hall method: sum of 12
/// uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Soil model
// ---------------------------------------------------------------------------

/// Evolving "true" soil state in raw ADC units. Direction-agnostic: all
/// steps are expressed along the signed dry-to-wet span, so inverted
/// calibrations (dry above wet) behave the same as forward ones.
struct SoilModel {
    base: f64,
    center: f64,
    dry_step: f64,
    wet_step: f64,
    walk_sigma: f64,
    noise_sigma: f64,
    mean_reversion: f64,
    lo: f64,
    hi: f64,
    full_scale: f64,
}

impl SoilModel {
    fn new(dry_raw: f64, wet_raw: f64, full_scale: f64) -> Self {
        let span = wet_raw - dry_raw; // signed: points toward "wetter"
        let magnitude = span.abs();
        Self {
            // Start on the dry side so a fresh node demonstrates a full
            // watering cycle soon after boot.
            base: dry_raw + span * 0.25,
            center: dry_raw + span * 0.30,
            dry_step: -span * 0.0005,
            wet_step: span * 0.005,
            walk_sigma: magnitude * 0.01,
            noise_sigma: magnitude * 0.005,
            mean_reversion: 0.02,
            lo: dry_raw.min(wet_raw),
            hi: dry_raw.max(wet_raw),
            full_scale,
        }
    }

    fn step(&mut self, watering: bool) -> i32 {
        let pull = self.mean_reversion * (self.center - self.base);
        let walk = gaussian(0.0, self.walk_sigma);
        let step = if watering { self.wet_step } else { self.dry_step };
        self.base = (self.base + pull + walk + step).clamp(self.lo, self.hi);

        let reading = self.base + gaussian(0.0, self.noise_sigma);
        reading.round().clamp(0.0, self.full_scale) as i32
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Simulated soil moisture input. Shares the pump line state so watering
/// feeds back into the readings.
pub struct SimSoil {
    model: SoilModel,
    pump_on: Rc<Cell<bool>>,
}

impl AnalogPort for SimSoil {
    fn read(&mut self) -> Result<i32> {
        Ok(self.model.step(self.pump_on.get()))
    }
}

/// Simulated tank level input: near-full with a little electronic noise.
pub struct SimTank {
    raw: f64,
    noise_sigma: f64,
    full_scale: f64,
}

impl AnalogPort for SimTank {
    fn read(&mut self) -> Result<i32> {
        Ok(gaussian(self.raw, self.noise_sigma)
            .round()
            .clamp(0.0, self.full_scale) as i32)
    }
}

/// Simulated pump relay.
pub struct SimPump {
    line: Rc<Cell<bool>>,
}

impl SwitchPort for SimPump {
    fn set(&mut self, on: bool) -> Result<()> {
        if self.line.replace(on) != on {
            tracing::debug!(on, "sim pump switched");
        }
        Ok(())
    }
}

pub struct SimSoilTemp;

impl TempProbe for SimSoilTemp {
    fn read_celsius(&mut self) -> f32 {
        gaussian(18.4, 0.2) as f32
    }
}

pub struct SimClimate;

impl ClimateProbe for SimClimate {
    fn read_humidity(&mut self) -> f32 {
        gaussian(52.0, 1.5) as f32
    }

    fn read_celsius(&mut self) -> f32 {
        gaussian(21.3, 0.3) as f32
    }
}

// ---------------------------------------------------------------------------
// Board assembly
// ---------------------------------------------------------------------------

/// Build a full set of simulated ports from the node's calibration and ADC
/// settings. Rebuilt every wake, like real hardware after deep sleep.
pub fn build(cfg: &NodeConfig) -> (SimSoil, SimTank, SimPump, SimSoilTemp, SimClimate) {
    let full_scale = f64::from(cfg.adc.full_scale);
    let pump_line = Rc::new(Cell::new(false));

    let soil = SimSoil {
        model: SoilModel::new(
            f64::from(cfg.calibration.raw_dry),
            f64::from(cfg.calibration.raw_wet),
            full_scale,
        ),
        pump_on: Rc::clone(&pump_line),
    };
    let tank = SimTank {
        raw: full_scale * 0.93,
        noise_sigma: full_scale * 0.002,
        full_scale,
    };

    (soil, tank, SimPump { line: pump_line }, SimSoilTemp, SimClimate)
}

// ===========================================================================
// Tests
// ===========================================================================
