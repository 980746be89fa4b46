//! One wake cycle: measure, decide, water, report.
//!
//! The controller owns every port for the duration of the cycle and is
//! rebuilt from scratch after each wake. Nothing in here survives the
//! power-down transition.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::moisture::CalibrationRange;
use crate::notify::{NotificationOutcome, NotificationRequest, Notify};
use crate::ports::{
    AnalogPort, ClimateProbe, Dashboard, SwitchPort, TempProbe, CH_AIR_HUMIDITY, CH_AIR_TEMP,
    CH_MOISTURE, CH_SOIL_TEMP,
};
use crate::sampler::sample_average;

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Everything measured and done during one wake cycle. Pushed to telemetry,
/// optionally notified, then dropped. Probe fields are `None` when the
/// sensor faulted this cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub soil_temp_c: Option<f32>,
    pub moisture: i32,
    pub air_humidity: Option<f32>,
    pub air_temp_c: Option<f32>,
    pub tank_volts: f32,
    pub irrigated: bool,
    pub pre_water: i32,
    pub post_water: i32,
}

// ---------------------------------------------------------------------------
// Cycle parameters
// ---------------------------------------------------------------------------

/// The measurement knobs a cycle needs, pulled out of the full config once
/// at startup so the cycle code never re-validates anything.
#[derive(Debug, Clone, Copy)]
pub struct CycleParams {
    pub range: CalibrationRange,
    pub start_percent: i32,
    pub stop_percent: i32,
    pub cycle_samples: u32,
    pub probe_samples: u32,
    pub settle: Duration,
    pub adc_full_scale: i32,
    pub adc_ref_volts: f32,
    pub low_level_volts: f32,
}

impl CycleParams {
    pub fn from_config(cfg: &NodeConfig) -> Result<Self> {
        Ok(Self {
            range: CalibrationRange::new(cfg.calibration.raw_dry, cfg.calibration.raw_wet)?,
            start_percent: cfg.thresholds.start_percent,
            stop_percent: cfg.thresholds.stop_percent,
            cycle_samples: cfg.sampling.cycle_samples,
            probe_samples: cfg.sampling.probe_samples,
            settle: Duration::from_millis(cfg.sampling.settle_ms),
            adc_full_scale: cfg.adc.full_scale,
            adc_ref_volts: cfg.adc.ref_volts,
            low_level_volts: cfg.tank.low_level_volts,
        })
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller<S, W, P, T, C, D, N> {
    params: CycleParams,
    soil: S,
    tank: W,
    pump: P,
    soil_temp: T,
    climate: C,
    dashboard: D,
    notifier: N,
}

impl<S, W, P, T, C, D, N> Controller<S, W, P, T, C, D, N>
where
    S: AnalogPort,
    W: AnalogPort,
    P: SwitchPort,
    T: TempProbe,
    C: ClimateProbe,
    D: Dashboard,
    N: Notify,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: CycleParams,
        soil: S,
        tank: W,
        pump: P,
        soil_temp: T,
        climate: C,
        dashboard: D,
        notifier: N,
    ) -> Self {
        Self {
            params,
            soil,
            tank,
            pump,
            soil_temp,
            climate,
            dashboard,
            notifier,
        }
    }

    /// Run one full measure-decide-act-report cycle and hand back the
    /// report. The caller owns the sleep transition that follows.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        // Soil temperature first; a dead probe downgrades the field, not
        // the cycle.
        let soil_temp_c = present(self.soil_temp.read_celsius());
        if soil_temp_c.is_none() {
            self.dashboard
                .alert("Failed to read from soil temperature probe!");
        }

        let raw = sample_average(&mut self.soil, self.params.cycle_samples, self.params.settle)
            .await?;
        let pre_water = self.params.range.percent(raw);
        info!(raw, moisture = pre_water, "soil measured");

        let (irrigated, post_water) = if pre_water < self.params.start_percent {
            (true, self.irrigate().await?)
        } else {
            (false, pre_water)
        };

        // Air climate; same fault convention as the soil probe.
        let air_humidity = present(self.climate.read_humidity());
        let air_temp_c = present(self.climate.read_celsius());
        if air_humidity.is_none() || air_temp_c.is_none() {
            self.dashboard
                .alert("Failed to read from air humidity/temperature probe!");
        }

        let tank_raw = self.tank.read()?;
        let tank_volts =
            tank_raw as f32 * self.params.adc_ref_volts / self.params.adc_full_scale as f32;

        // Numeric channels carry readings; faulted fields were already
        // reported as alerts and are skipped here.
        if let Some(t) = soil_temp_c {
            self.dashboard.push_value(CH_SOIL_TEMP, f64::from(t));
        }
        self.dashboard.push_value(CH_MOISTURE, f64::from(pre_water));
        if let Some(h) = air_humidity {
            self.dashboard.push_value(CH_AIR_HUMIDITY, f64::from(h));
        }
        if let Some(t) = air_temp_c {
            self.dashboard.push_value(CH_AIR_TEMP, f64::from(t));
        }

        if tank_volts < self.params.low_level_volts {
            warn!(tank_volts = f64::from(tank_volts), "tank level low");
            self.dashboard
                .alert("Water level is too low!\nCheck the water level in the tank.");
        }

        if irrigated {
            let outcome = self
                .notifier
                .notify(
                    NotificationRequest {
                        field_start: pre_water,
                        field_end: post_water,
                    },
                    &mut self.dashboard,
                )
                .await;
            match outcome {
                NotificationOutcome::Delivered(_) => info!("watering event delivered"),
                NotificationOutcome::ConnectFailed => {
                    warn!("watering event not delivered: connect failed")
                }
                NotificationOutcome::NoResponse => {
                    warn!("watering event not delivered: no response")
                }
            }
        }

        Ok(CycleReport {
            soil_temp_c,
            moisture: pre_water,
            air_humidity,
            air_temp_c,
            tank_volts,
            irrigated,
            pre_water,
            post_water,
        })
    }

    /// Pump sub-loop. Deliberately has no iteration bound or timeout: a
    /// sensor that never crosses the stop threshold keeps the pump running
    /// (see DESIGN.md). The pump line is released on every exit path,
    /// errors included.
    async fn irrigate(&mut self) -> Result<i32> {
        info!(stop_percent = self.params.stop_percent, "soil dry, watering");

        let result = self.pump_until_wet().await;
        let off = self.pump.set(false);
        let post = result?;
        off?;

        info!(moisture = post, "irrigation complete");
        Ok(post)
    }

    async fn pump_until_wet(&mut self) -> Result<i32> {
        loop {
            self.pump.set(true)?;
            let raw =
                sample_average(&mut self.soil, self.params.probe_samples, self.params.settle)
                    .await?;
            let pct = self.params.range.percent(raw);
            if pct >= self.params.stop_percent {
                return Ok(pct);
            }
        }
    }
}

/// NaN is the ports' fault convention; the report uses `Option` instead.
fn present(value: f32) -> Option<f32> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
