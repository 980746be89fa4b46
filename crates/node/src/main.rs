mod config;
mod controller;
#[cfg(feature = "hw")]
mod hw;
mod moisture;
mod notify;
mod ports;
mod power;
mod sampler;
#[cfg(feature = "sim")]
mod sim;

#[cfg(not(any(feature = "sim", feature = "hw")))]
compile_error!("enable either the `sim` or `hw` feature");

use std::env;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::NodeConfig;
use controller::{Controller, CycleParams, CycleReport};
use notify::NotificationClient;
use ports::LogDashboard;
use power::{HostPower, PowerControl, SleepSpec};

// The node is single-threaded cooperative: one timer tick drives one full
// cycle, so a current-thread runtime is all it gets.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = env::var("NODE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;

    let sleep_spec =
        SleepSpec::from_multipliers(cfg.sleep.wake_interval, cfg.sleep.sleep_multiplier);
    let mut power = HostPower::new();

    info!(
        config = %config_path,
        sleep_secs = sleep_spec.as_duration().as_secs(),
        "node starting"
    );

    loop {
        // Deep sleep discards the whole process, so each wake rebuilds the
        // board and controller from config; nothing carries over.
        match run_one_cycle(&cfg).await {
            Ok(report) => info!(
                soil_temp_c = ?report.soil_temp_c,
                moisture = report.moisture,
                air_humidity = ?report.air_humidity,
                air_temp_c = ?report.air_temp_c,
                tank_volts = f64::from(report.tank_volts),
                irrigated = report.irrigated,
                pre_water = report.pre_water,
                post_water = report.post_water,
                "cycle complete"
            ),
            Err(e) => error!("cycle failed: {e:#}"),
        }

        power.arm_wake_timer(sleep_spec);
        let _wake = power.enter_low_power().await;
    }
}

async fn run_one_cycle(cfg: &NodeConfig) -> Result<CycleReport> {
    let params = CycleParams::from_config(cfg)?;
    let (soil, tank, pump, soil_temp, climate) = board(cfg)?;

    let mut controller = Controller::new(
        params,
        soil,
        tank,
        pump,
        soil_temp,
        climate,
        LogDashboard,
        NotificationClient::from_config(&cfg.webhook),
    );
    controller.run_cycle().await
}

#[cfg(all(feature = "sim", not(feature = "hw")))]
fn board(
    cfg: &NodeConfig,
) -> Result<(sim::SimSoil, sim::SimTank, sim::SimPump, sim::SimSoilTemp, sim::SimClimate)> {
    Ok(sim::build(cfg))
}

#[cfg(feature = "hw")]
fn board(
    cfg: &NodeConfig,
) -> Result<(hw::AdcChannel, hw::AdcChannel, hw::PumpLine, hw::W1Thermometer, hw::IioClimateProbe)>
{
    hw::build(cfg)
}
