//! Capability traits for injected hardware handles.
//!
//! Every trait here is a fixed interface that an implementation must satisfy
//! in full; there is no runtime probing for optional methods. Controllers
//! receive these as boxed trait objects at construction and keep them
//! private, which is what enforces the at-most-one-active invariant for the
//! two cryostat control stages.

use anyhow::Result;
use async_trait::async_trait;

/// Operation mode passed to the ADR stage when a ramp is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdrMode {
    /// Continuous ADR: regenerates stages in the background, no hold-time
    /// limit. This is the mode used for routine temperature ramps.
    Continuous,
    /// Single-shot on the last ADR stage only.
    SingleShot,
}

impl AdrMode {
    /// Wire label understood by the cryostat control server.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdrMode::Continuous => "cadr",
            AdrMode::SingleShot => "single",
        }
    }
}

/// Heater-based temperature control stage (usable above bath temperature).
#[async_trait]
pub trait HeaterControl: Send + Sync {
    /// Begin ramping toward `setpoint` (K) at `rate` (K/min).
    async fn start(&self, setpoint: f64, rate: f64) -> Result<()>;
    /// Stop any ongoing control. Stopping an idle stage is a no-op.
    async fn stop(&self) -> Result<()>;
    /// Whether this stage currently owns temperature control.
    async fn is_active(&self) -> Result<bool>;
    /// Whether the controlled temperature has settled at the setpoint.
    async fn stable(&self) -> Result<bool>;
    /// Whether a ramp is in progress.
    async fn ramping(&self) -> Result<bool>;
    /// The setpoint of the last accepted ramp (K).
    async fn setpoint(&self) -> Result<f64>;
}

/// Adiabatic-demagnetization control stage (low-temperature regime).
#[async_trait]
pub trait AdrControl: Send + Sync {
    /// Begin an ADR ramp toward `setpoint` (K) at `rate` (K/min) in `mode`.
    async fn start(&self, setpoint: f64, rate: f64, mode: AdrMode) -> Result<()>;
    /// Stop any ongoing control. Stopping an idle stage is a no-op.
    async fn stop(&self) -> Result<()>;
    /// Whether this stage currently owns temperature control.
    async fn is_active(&self) -> Result<bool>;
    /// Whether the controlled temperature has settled at the setpoint.
    async fn stable(&self) -> Result<bool>;
    /// Whether a ramp is in progress.
    async fn ramping(&self) -> Result<bool>;
    /// The setpoint of the last accepted ramp (K).
    async fn setpoint(&self) -> Result<f64>;
}

/// Sample magnet control.
#[async_trait]
pub trait MagnetControl: Send + Sync {
    /// Begin ramping toward `field` (T) at `rate` (T/min).
    async fn start(&self, field: f64, rate: f64) -> Result<()>;
    /// Stop any ongoing ramp.
    async fn stop(&self) -> Result<()>;
    /// Whether the field has settled at the setpoint.
    async fn stable(&self) -> Result<bool>;
    /// The setpoint of the last accepted ramp (T).
    async fn setpoint(&self) -> Result<f64>;
    /// Live field reading (T).
    async fn field(&self) -> Result<f64>;
}

/// Read-only live temperature sensor.
#[async_trait]
pub trait Thermometer: Send + Sync {
    /// Current sensor reading in kelvin.
    async fn kelvin(&self) -> Result<f64>;
}

/// Programmable current source used as the swept parameter in IV curves.
#[async_trait]
pub trait CurrentSource: Send + Sync {
    /// Drive the source output to `amps`.
    async fn set_current(&self, amps: f64) -> Result<()>;
}

/// Voltage readback used as the measured parameter in IV curves.
#[async_trait]
pub trait Voltmeter: Send + Sync {
    /// Take a single voltage reading (V).
    async fn read_voltage(&self) -> Result<f64>;
}
