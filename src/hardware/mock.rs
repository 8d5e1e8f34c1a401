//! Mock Hardware Implementations
//!
//! Provides simulated cryostat and rack devices for testing without physical
//! hardware. All mocks use async-safe operations (`tokio::time::sleep`, not
//! `std::thread::sleep`) and share their state behind `Arc` so a test can
//! keep a clone for inspection after handing the mock to a controller.
//!
//! # Available Mocks
//!
//! - `MockHeaterStage` / `MockAdrStage` - temperature control stages with a
//!   configurable settle time and an optional stuck-stop failure mode
//! - `MockMagnet` - sample magnet with settle-time based stability
//! - `MockThermometer` - fixed reading with optional noise
//! - `MockCurrentSource` / `MockVoltmeter` - IV sweep endpoints

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::hardware::capabilities::{
    AdrControl, AdrMode, CurrentSource, HeaterControl, MagnetControl, Thermometer, Voltmeter,
};

// =============================================================================
// Shared ramp-stage state
// =============================================================================

#[derive(Debug)]
struct StageState {
    active: bool,
    setpoint: f64,
    rate: f64,
    started_at: Option<Instant>,
    start_count: u32,
    stop_count: u32,
    last_mode: Option<AdrMode>,
}

impl StageState {
    fn idle() -> Self {
        Self {
            active: false,
            setpoint: 0.0,
            rate: 0.0,
            started_at: None,
            start_count: 0,
            stop_count: 0,
            last_mode: None,
        }
    }
}

#[derive(Clone)]
struct StageCore {
    state: Arc<RwLock<StageState>>,
    settle_after: Duration,
    /// When set, `stop()` is acknowledged but the stage stays active. Used to
    /// exercise the bounded stop-confirmation path.
    stuck: bool,
}

impl StageCore {
    fn new(settle_after: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(StageState::idle())),
            settle_after,
            stuck: false,
        }
    }

    async fn start(&self, setpoint: f64, rate: f64, mode: Option<AdrMode>) {
        let mut state = self.state.write().await;
        state.active = true;
        state.setpoint = setpoint;
        state.rate = rate;
        state.started_at = Some(Instant::now());
        state.start_count += 1;
        state.last_mode = mode;
    }

    async fn stop(&self) {
        let mut state = self.state.write().await;
        state.stop_count += 1;
        if !self.stuck {
            state.active = false;
            state.started_at = None;
        }
    }

    async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    async fn stable(&self) -> bool {
        let state = self.state.read().await;
        match state.started_at {
            Some(t) if state.active => t.elapsed() >= self.settle_after,
            _ => false,
        }
    }

    async fn ramping(&self) -> bool {
        let state = self.state.read().await;
        match state.started_at {
            Some(t) if state.active => t.elapsed() < self.settle_after,
            _ => false,
        }
    }

    async fn setpoint(&self) -> f64 {
        self.state.read().await.setpoint
    }
}

// =============================================================================
// MockHeaterStage - high-temperature control stage
// =============================================================================

/// Mock heater-based temperature control stage.
///
/// Reports `ramping` until the configured settle time has elapsed since the
/// last `start`, then `stable`. Cloning shares state, so tests can observe a
/// stage after moving another clone into a controller.
#[derive(Clone)]
pub struct MockHeaterStage {
    core: StageCore,
}

impl MockHeaterStage {
    /// Create an idle stage that settles 30 ms after a ramp starts.
    pub fn new() -> Self {
        Self::with_settle_time(Duration::from_millis(30))
    }

    /// Create an idle stage with a custom settle time.
    ///
    /// Pass `Duration::MAX` for a stage that never stabilizes.
    pub fn with_settle_time(settle_after: Duration) -> Self {
        Self {
            core: StageCore::new(settle_after),
        }
    }

    /// Refuse to actually stop: `stop()` is counted but the stage stays
    /// active.
    pub fn stuck(mut self) -> Self {
        self.core.stuck = true;
        self
    }

    /// Force the stage active, as if a previous process left it running.
    pub async fn force_active(&self, setpoint: f64) {
        self.core.start(setpoint, 0.0, None).await;
    }

    /// Number of `start` calls received.
    pub async fn start_count(&self) -> u32 {
        self.core.state.read().await.start_count
    }

    /// Number of `stop` calls received.
    pub async fn stop_count(&self) -> u32 {
        self.core.state.read().await.stop_count
    }
}

impl Default for MockHeaterStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeaterControl for MockHeaterStage {
    async fn start(&self, setpoint: f64, rate: f64) -> Result<()> {
        self.core.start(setpoint, rate, None).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.core.stop().await;
        Ok(())
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self.core.is_active().await)
    }

    async fn stable(&self) -> Result<bool> {
        Ok(self.core.stable().await)
    }

    async fn ramping(&self) -> Result<bool> {
        Ok(self.core.ramping().await)
    }

    async fn setpoint(&self) -> Result<f64> {
        Ok(self.core.setpoint().await)
    }
}

// =============================================================================
// MockAdrStage - low-temperature ADR control stage
// =============================================================================

/// Mock adiabatic-demagnetization control stage.
#[derive(Clone)]
pub struct MockAdrStage {
    core: StageCore,
}

impl MockAdrStage {
    /// Create an idle stage that settles 30 ms after a ramp starts.
    pub fn new() -> Self {
        Self::with_settle_time(Duration::from_millis(30))
    }

    /// Create an idle stage with a custom settle time.
    pub fn with_settle_time(settle_after: Duration) -> Self {
        Self {
            core: StageCore::new(settle_after),
        }
    }

    /// Refuse to actually stop: `stop()` is counted but the stage stays
    /// active.
    pub fn stuck(mut self) -> Self {
        self.core.stuck = true;
        self
    }

    /// Force the stage active, as if a previous process left it running.
    pub async fn force_active(&self, setpoint: f64) {
        self.core.start(setpoint, 0.0, Some(AdrMode::Continuous)).await;
    }

    /// Number of `start` calls received.
    pub async fn start_count(&self) -> u32 {
        self.core.state.read().await.start_count
    }

    /// Number of `stop` calls received.
    pub async fn stop_count(&self) -> u32 {
        self.core.state.read().await.stop_count
    }

    /// Operation mode of the last `start` call, if any.
    pub async fn last_mode(&self) -> Option<AdrMode> {
        self.core.state.read().await.last_mode
    }
}

impl Default for MockAdrStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdrControl for MockAdrStage {
    async fn start(&self, setpoint: f64, rate: f64, mode: AdrMode) -> Result<()> {
        self.core.start(setpoint, rate, Some(mode)).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.core.stop().await;
        Ok(())
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self.core.is_active().await)
    }

    async fn stable(&self) -> Result<bool> {
        Ok(self.core.stable().await)
    }

    async fn ramping(&self) -> Result<bool> {
        Ok(self.core.ramping().await)
    }

    async fn setpoint(&self) -> Result<f64> {
        Ok(self.core.setpoint().await)
    }
}

// =============================================================================
// MockMagnet - sample magnet
// =============================================================================

/// Mock sample magnet.
///
/// The field snaps to the setpoint once the settle time has elapsed.
#[derive(Clone)]
pub struct MockMagnet {
    core: StageCore,
}

impl MockMagnet {
    /// Create an idle magnet that settles 30 ms after a ramp starts.
    pub fn new() -> Self {
        Self {
            core: StageCore::new(Duration::from_millis(30)),
        }
    }

    /// Create an idle magnet with a custom settle time.
    pub fn with_settle_time(settle_after: Duration) -> Self {
        Self {
            core: StageCore::new(settle_after),
        }
    }

    /// Number of `start` calls received.
    pub async fn start_count(&self) -> u32 {
        self.core.state.read().await.start_count
    }
}

impl Default for MockMagnet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MagnetControl for MockMagnet {
    async fn start(&self, field: f64, rate: f64) -> Result<()> {
        self.core.start(field, rate, None).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.core.stop().await;
        Ok(())
    }

    async fn stable(&self) -> Result<bool> {
        Ok(self.core.stable().await)
    }

    async fn setpoint(&self) -> Result<f64> {
        Ok(self.core.setpoint().await)
    }

    async fn field(&self) -> Result<f64> {
        // Field tracks the setpoint once settled, 0 T before.
        if self.core.stable().await {
            Ok(self.core.setpoint().await)
        } else {
            Ok(0.0)
        }
    }
}

// =============================================================================
// MockThermometer - live sensor
// =============================================================================

/// Mock sample thermometer with optional uniform noise.
#[derive(Clone)]
pub struct MockThermometer {
    kelvin: Arc<RwLock<f64>>,
    jitter: f64,
}

impl MockThermometer {
    /// Create a thermometer with a fixed reading.
    pub fn new(kelvin: f64) -> Self {
        Self {
            kelvin: Arc::new(RwLock::new(kelvin)),
            jitter: 0.0,
        }
    }

    /// Add uniform noise of up to `jitter` kelvin to each reading.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Change the reading, simulating sample temperature drift.
    pub async fn set_kelvin(&self, kelvin: f64) {
        *self.kelvin.write().await = kelvin;
    }
}

#[async_trait]
impl Thermometer for MockThermometer {
    async fn kelvin(&self) -> Result<f64> {
        let base = *self.kelvin.read().await;
        if self.jitter == 0.0 {
            return Ok(base);
        }
        let noise = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Ok(base + noise)
    }
}

// =============================================================================
// MockCurrentSource / MockVoltmeter - IV sweep endpoints
// =============================================================================

/// Mock current source that records every setpoint it receives.
#[derive(Clone, Default)]
pub struct MockCurrentSource {
    history: Arc<RwLock<Vec<f64>>>,
}

impl MockCurrentSource {
    /// Create a source with an empty setpoint history.
    pub fn new() -> Self {
        Self::default()
    }

    /// All setpoints received so far, in order.
    pub async fn history(&self) -> Vec<f64> {
        self.history.read().await.clone()
    }
}

#[async_trait]
impl CurrentSource for MockCurrentSource {
    async fn set_current(&self, amps: f64) -> Result<()> {
        if !amps.is_finite() {
            bail!("MockCurrentSource: non-finite setpoint {amps}");
        }
        self.history.write().await.push(amps);
        Ok(())
    }
}

/// Mock voltmeter reporting an ohmic response to the paired source.
#[derive(Clone)]
pub struct MockVoltmeter {
    source: MockCurrentSource,
    resistance_ohm: f64,
}

impl MockVoltmeter {
    /// Report `resistance_ohm * I` for the last current set on `source`.
    pub fn ohmic(source: MockCurrentSource, resistance_ohm: f64) -> Self {
        Self {
            source,
            resistance_ohm,
        }
    }
}

#[async_trait]
impl Voltmeter for MockVoltmeter {
    async fn read_voltage(&self) -> Result<f64> {
        let last = self.source.history().await.last().copied().unwrap_or(0.0);
        Ok(last * self.resistance_ohm)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
