//! Dual-regime temperature ramp controller.
//!
//! Rapid-cycle ADR cryostats reach their full temperature span with two
//! mutually exclusive control stages: a heater loop for everything above a
//! few kelvin and an adiabatic-demagnetization loop below. The cryostat
//! refuses to run both at once, so whoever commands a ramp must first make
//! sure the other stage has relinquished control.
//!
//! [`RampController`] owns that decision. It picks the regime from the
//! target temperature, enforces the regime-specific rate ceiling, serializes
//! the stop-then-confirm-then-start handover and keeps the only record of
//! which stage is authoritative. Both stage handles are moved into the
//! controller at construction; nothing else can reach their start/stop.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};

use crate::error::{TransmeasError, TransmeasResult};
use crate::hardware::capabilities::{AdrControl, AdrMode, HeaterControl};

/// Temperature limits and rate ceilings of the two control regimes.
///
/// Fixed per instrument instance; defaults match the L-type rapid cryostat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeBoundaries {
    /// Highest reachable temperature (K).
    pub upper_limit: f64,
    /// Lowest reachable temperature (K).
    pub lower_limit: f64,
    /// Regime boundary (K): targets at or above use the heater loop, below
    /// use ADR. Raising this past what the ADR stage can absorb strands
    /// low-temperature ramps.
    pub middle_point: f64,
    /// Max ramp rate (K/min) in the heater regime.
    pub high_rate_limit: f64,
    /// Max ramp rate (K/min) in the ADR regime.
    pub low_rate_limit: f64,
}

impl Default for RegimeBoundaries {
    fn default() -> Self {
        Self {
            upper_limit: 305.0,
            lower_limit: 0.09,
            middle_point: 3.3,
            high_rate_limit: 5.0,
            low_rate_limit: 0.3,
        }
    }
}

impl RegimeBoundaries {
    /// Check internal consistency of configured boundaries.
    pub fn validate(&self) -> TransmeasResult<()> {
        if !(self.lower_limit < self.middle_point && self.middle_point < self.upper_limit) {
            return Err(TransmeasError::Configuration(format!(
                "regime boundaries must satisfy lower < middle < upper, got {} / {} / {}",
                self.lower_limit, self.middle_point, self.upper_limit
            )));
        }
        if self.high_rate_limit <= 0.0 || self.low_rate_limit <= 0.0 {
            return Err(TransmeasError::Configuration(
                "rate limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry budget for confirming that a control stage has stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopPolicy {
    /// Delay between stop polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Maximum number of stop polls before giving up.
    pub max_polls: u32,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_polls: 50,
        }
    }
}

/// Which control stage is currently authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveRegime {
    /// Neither stage is active.
    None,
    /// Heater loop owns control (targets at or above the middle point).
    HighTemp,
    /// ADR loop owns control (targets below the middle point).
    LowTempAdr,
}

#[derive(Debug, Clone, Copy)]
struct ControllerState {
    active: ActiveRegime,
    target_setpoint: Option<f64>,
    target_rate: Option<f64>,
}

/// Policy object mediating temperature ramps between the two control stages.
pub struct RampController {
    heater: Box<dyn HeaterControl>,
    adr: Box<dyn AdrControl>,
    boundaries: RegimeBoundaries,
    stop_policy: StopPolicy,
    state: RwLock<ControllerState>,
}

impl std::fmt::Debug for RampController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RampController")
            .field("boundaries", &self.boundaries)
            .field("stop_policy", &self.stop_policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RampController {
    /// Build a controller around the two stage handles, reconciling the
    /// initial regime from whatever the hardware reports as active.
    ///
    /// There is no persisted record across restarts; the stages themselves
    /// are the source of truth. If both claim to be active (which the
    /// cryostat should never allow) the heater loop is taken as
    /// authoritative, matching the hardware's own precedence.
    pub async fn new(
        heater: Box<dyn HeaterControl>,
        adr: Box<dyn AdrControl>,
        boundaries: RegimeBoundaries,
        stop_policy: StopPolicy,
    ) -> TransmeasResult<Self> {
        boundaries.validate()?;

        let heater_active = heater.is_active().await?;
        let adr_active = adr.is_active().await?;
        let active = match (heater_active, adr_active) {
            (true, true) => {
                warn!("both temperature stages report active; assuming heater control");
                ActiveRegime::HighTemp
            }
            (true, false) => ActiveRegime::HighTemp,
            (false, true) => ActiveRegime::LowTempAdr,
            (false, false) => ActiveRegime::None,
        };
        info!("temperature controller connected, active regime: {active:?}");

        Ok(Self {
            heater,
            adr,
            boundaries,
            stop_policy,
            state: RwLock::new(ControllerState {
                active,
                target_setpoint: None,
                target_rate: None,
            }),
        })
    }

    /// The configured regime boundaries.
    pub fn boundaries(&self) -> &RegimeBoundaries {
        &self.boundaries
    }

    /// The currently authoritative regime.
    pub async fn active_regime(&self) -> ActiveRegime {
        self.state.read().await.active
    }

    /// The last accepted ramp request, as `(setpoint, rate)`.
    pub async fn target(&self) -> Option<(f64, f64)> {
        let state = self.state.read().await;
        state.target_setpoint.zip(state.target_rate)
    }

    /// Command a temperature ramp to `target` (K) at `rate` (K/min).
    ///
    /// Validation happens before any hardware side effect: an `OutOfRange` or
    /// `RateLimit` error means no ramp was issued and the controller state is
    /// unchanged. If the target lies in the other regime, the currently
    /// active stage is stopped and polled (bounded by the [`StopPolicy`])
    /// until it confirms inactive before the new stage is started; exhausting
    /// that budget yields [`TransmeasError::BackendStopTimeout`] and leaves
    /// the physical state ambiguous.
    pub async fn set_target_temperature(&self, target: f64, rate: f64) -> TransmeasResult<()> {
        let b = &self.boundaries;
        if !(b.lower_limit..=b.upper_limit).contains(&target) {
            return Err(TransmeasError::OutOfRange {
                quantity: "target temperature",
                value: target,
                min: b.lower_limit,
                max: b.upper_limit,
            });
        }

        let high = target >= b.middle_point;
        let candidate = if high {
            ActiveRegime::HighTemp
        } else {
            ActiveRegime::LowTempAdr
        };
        let (limit, regime_name) = if high {
            (b.high_rate_limit, "heater control")
        } else {
            (b.low_rate_limit, "adr control")
        };
        if rate <= 0.0 || rate > limit {
            return Err(TransmeasError::RateLimit {
                rate,
                limit,
                regime: regime_name,
            });
        }

        // Holding the write lock across the handover serializes regime
        // switches and keeps abort() from interleaving with them.
        let mut state = self.state.write().await;

        if state.active != candidate {
            if high {
                self.confirm_adr_stopped().await?;
            } else {
                self.confirm_heater_stopped().await?;
            }
            // The previous stage is confirmed inactive; nothing drives the
            // hardware until the new start below succeeds.
            state.active = ActiveRegime::None;
        }

        if high {
            info!("heater ramp to {target} K at {rate} K/min");
            self.heater.start(target, rate).await?;
        } else {
            let mode = AdrMode::Continuous;
            info!("adr ramp to {target} K at {rate} K/min ({})", mode.as_str());
            self.adr.start(target, rate, mode).await?;
        }

        state.active = candidate;
        state.target_setpoint = Some(target);
        state.target_rate = Some(rate);
        Ok(())
    }

    async fn confirm_adr_stopped(&self) -> TransmeasResult<()> {
        if !self.adr.is_active().await? {
            return Ok(());
        }
        for _ in 0..self.stop_policy.max_polls {
            self.adr.stop().await?;
            sleep(self.stop_policy.poll_interval).await;
            if !self.adr.is_active().await? {
                return Ok(());
            }
        }
        Err(TransmeasError::BackendStopTimeout {
            backend: "adr_control",
            attempts: self.stop_policy.max_polls,
        })
    }

    async fn confirm_heater_stopped(&self) -> TransmeasResult<()> {
        if !self.heater.is_active().await? {
            return Ok(());
        }
        for _ in 0..self.stop_policy.max_polls {
            self.heater.stop().await?;
            sleep(self.stop_policy.poll_interval).await;
            if !self.heater.is_active().await? {
                return Ok(());
            }
        }
        Err(TransmeasError::BackendStopTimeout {
            backend: "temperature_control",
            attempts: self.stop_policy.max_polls,
        })
    }

    /// Whether the active stage reports a ramp in progress.
    pub async fn is_ramping(&self) -> TransmeasResult<bool> {
        match self.state.read().await.active {
            ActiveRegime::HighTemp => Ok(self.heater.ramping().await?),
            ActiveRegime::LowTempAdr => Ok(self.adr.ramping().await?),
            ActiveRegime::None => Err(TransmeasError::ControllerNotInitialized),
        }
    }

    /// Whether the active stage reports the temperature settled.
    pub async fn is_stable(&self) -> TransmeasResult<bool> {
        match self.state.read().await.active {
            ActiveRegime::HighTemp => Ok(self.heater.stable().await?),
            ActiveRegime::LowTempAdr => Ok(self.adr.stable().await?),
            ActiveRegime::None => Err(TransmeasError::ControllerNotInitialized),
        }
    }

    /// Setpoint reported by the active stage (K).
    pub async fn setpoint(&self) -> TransmeasResult<f64> {
        match self.state.read().await.active {
            ActiveRegime::HighTemp => Ok(self.heater.setpoint().await?),
            ActiveRegime::LowTempAdr => Ok(self.adr.setpoint().await?),
            ActiveRegime::None => Err(TransmeasError::ControllerNotInitialized),
        }
    }

    /// Poll [`Self::is_stable`] every `poll_interval` until it reports true
    /// or `timeout` elapses.
    ///
    /// Returns [`TransmeasError::StabilizationTimeout`] on expiry. An
    /// [`Self::abort`] issued from another task clears the active regime,
    /// which this loop observes as `ControllerNotInitialized` and unblocks
    /// immediately instead of burning the rest of the timeout.
    pub async fn wait_until_stable(
        &self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> TransmeasResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_stable().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransmeasError::StabilizationTimeout { timeout });
            }
            sleep(poll_interval).await;
        }
    }

    /// Stop both stages unconditionally and clear the active regime.
    ///
    /// Idempotent and infallible: stopping an already-stopped stage is a
    /// no-op, and stop failures are logged rather than raised so that an
    /// abort always leaves the controller in a known state.
    pub async fn abort(&self) {
        let mut state = self.state.write().await;
        if let Err(err) = self.heater.stop().await {
            warn!("abort: heater stop failed: {err:#}");
        }
        if let Err(err) = self.adr.stop().await {
            warn!("abort: adr stop failed: {err:#}");
        }
        state.active = ActiveRegime::None;
        state.target_setpoint = None;
        state.target_rate = None;
        info!("temperature ramp aborted, both stages commanded to stop");
    }
}
