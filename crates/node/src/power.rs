//! Duty-cycle scheduling: how long the node sleeps between cycles and the
//! seam through which it gets there.

use std::time::Duration;

/// The wake timer counts microseconds.
const MICROS_PER_SEC: u64 = 1_000_000;

/// An armed sleep interval, carried in the wake timer's native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSpec {
    micros: u64,
}

impl SleepSpec {
    /// Sleep duration is the product of the two configured multipliers, in
    /// seconds. It does not depend on anything measured during the cycle.
    pub fn from_multipliers(wake_interval: u64, sleep_multiplier: u64) -> Self {
        Self {
            micros: wake_interval * sleep_multiplier * MICROS_PER_SEC,
        }
    }

    pub fn as_micros(&self) -> u64 {
        self.micros
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros)
    }
}

/// Proof that the node came back from low power. Everything cycle-scoped
/// must be rebuilt after receiving one; nothing from before it is valid.
#[derive(Debug)]
pub struct Wake;

/// The power-down seam. On real deep-sleep hardware `enter_low_power`
/// tears the whole process down; implementations here return a [`Wake`]
/// token instead so hosted builds can loop. Callers must flush all
/// telemetry and notification work first, because conceptually nothing
/// after the call executes.
#[allow(async_fn_in_trait)]
pub trait PowerControl {
    fn arm_wake_timer(&mut self, spec: SleepSpec);
    async fn enter_low_power(&mut self) -> Wake;
}

/// Hosted stand-in for the deep-sleep timer: suspends the task for the
/// armed interval on the runtime clock.
pub struct HostPower {
    armed: Option<SleepSpec>,
}

impl HostPower {
    pub fn new() -> Self {
        Self { armed: None }
    }
}

impl PowerControl for HostPower {
    fn arm_wake_timer(&mut self, spec: SleepSpec) {
        tracing::info!(sleep_us = spec.as_micros(), "wake timer armed");
        self.armed = Some(spec);
    }

    async fn enter_low_power(&mut self) -> Wake {
        let spec = self
            .armed
            .take()
            .expect("wake timer must be armed before entering low power");
        tracing::info!("entering low power");
        tokio::time::sleep(spec.as_duration()).await;
        Wake
    }
}

// ===========================================================================
// Tests
// ===========================================================================
