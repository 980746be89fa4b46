//! Capability traits for the node's physical interfaces and the dashboard
//! telemetry sink. Each trait covers exactly one piece of hardware so the
//! controller can be exercised against fakes.

use anyhow::Result;

/// One analog input line (soil moisture, tank level). Readings are raw ADC
/// counts in `[0, full_scale]`.
pub trait AnalogPort {
    fn read(&mut self) -> Result<i32>;
}

/// The pump's digital control line.
pub trait SwitchPort {
    fn set(&mut self, on: bool) -> Result<()>;
}

/// Soil temperature probe. Returns degrees Celsius, or NaN when the bus
/// read fails; the controller reports the fault and carries on.
pub trait TempProbe {
    fn read_celsius(&mut self) -> f32;
}

/// Combined air humidity/temperature probe. Same NaN-on-fault convention
/// as [`TempProbe`].
pub trait ClimateProbe {
    fn read_humidity(&mut self) -> f32;
    fn read_celsius(&mut self) -> f32;
}

// ---------------------------------------------------------------------------
// Dashboard sink
// ---------------------------------------------------------------------------

/// Dashboard virtual channels. 0-3 carry the per-cycle numeric readings;
/// 10 is the free-text delivery/status feed.
pub const CH_SOIL_TEMP: u8 = 0;
pub const CH_MOISTURE: u8 = 1;
pub const CH_AIR_HUMIDITY: u8 = 2;
pub const CH_AIR_TEMP: u8 = 3;
pub const CH_STATUS: u8 = 10;

/// Write-only telemetry sink. The transport/session protocol behind it is
/// an external collaborator; the node only decides what gets pushed.
pub trait Dashboard {
    fn push_value(&mut self, channel: u8, value: f64);
    fn push_status(&mut self, channel: u8, text: &str);
    /// Out-of-band alert (sensor fault, low tank level).
    fn alert(&mut self, text: &str);
}

/// Dashboard backed by the log stream, for builds without a live dashboard
/// session.
pub struct LogDashboard;

impl Dashboard for LogDashboard {
    fn push_value(&mut self, channel: u8, value: f64) {
        tracing::info!(channel, value, "dashboard write");
    }

    fn push_status(&mut self, channel: u8, text: &str) {
        tracing::info!(channel, text, "dashboard status");
    }

    fn alert(&mut self, text: &str) {
        tracing::warn!(text, "dashboard alert");
    }
}

/// Capture sink recording every push in order.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingDashboard {
    pub values: Vec<(u8, f64)>,
    pub statuses: Vec<(u8, String)>,
    pub alerts: Vec<String>,
}

#[cfg(test)]
impl Dashboard for RecordingDashboard {
    fn push_value(&mut self, channel: u8, value: f64) {
        self.values.push((channel, value));
    }

    fn push_status(&mut self, channel: u8, text: &str) {
        self.statuses.push((channel, text.to_string()));
    }

    fn alert(&mut self, text: &str) {
        self.alerts.push(text.to_string());
    }
}

// ===========================================================================
// Tests
// ===========================================================================
