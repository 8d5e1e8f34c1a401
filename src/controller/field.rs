//! Sample magnet ramp controller.
//!
//! Single-backend analogue of the temperature controller: no regime switch,
//! but every ramp request re-reads the sample thermometer first. Magnetizing
//! a warm sample risks both the magnet and the sample, so the interlock is a
//! live reading on each call, never a cached value.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};

use crate::error::{TransmeasError, TransmeasResult};
use crate::hardware::capabilities::{MagnetControl, Thermometer};

/// Field limits and rate ceiling for one magnet hardware variant.
///
/// Keyed by coil current rating in the configuration; the default matches
/// the 10 A sample magnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRegime {
    /// Highest reachable field (T).
    pub upper_field: f64,
    /// Lowest reachable field (T).
    pub lower_field: f64,
    /// Max ramp rate (T/min).
    pub upper_ramp_rate: f64,
}

impl Default for FieldRegime {
    fn default() -> Self {
        Self {
            upper_field: 5.0,
            lower_field: -5.0,
            upper_ramp_rate: 0.5,
        }
    }
}

impl FieldRegime {
    /// Check internal consistency of the configured limits.
    pub fn validate(&self) -> TransmeasResult<()> {
        if self.lower_field >= self.upper_field {
            return Err(TransmeasError::Configuration(format!(
                "field limits must satisfy lower < upper, got {} / {}",
                self.lower_field, self.upper_field
            )));
        }
        if self.upper_ramp_rate <= 0.0 {
            return Err(TransmeasError::Configuration(
                "field ramp rate limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Policy object mediating field ramps on the sample magnet.
pub struct FieldController {
    magnet: Box<dyn MagnetControl>,
    thermometer: Box<dyn Thermometer>,
    regime: FieldRegime,
    /// Sample temperatures at or above this (K) refuse field ramps.
    max_safe_sample_temperature: f64,
    target: RwLock<Option<(f64, f64)>>,
}

impl FieldController {
    /// Build a controller around the magnet handle and the sample
    /// thermometer used for the interlock.
    pub fn new(
        magnet: Box<dyn MagnetControl>,
        thermometer: Box<dyn Thermometer>,
        regime: FieldRegime,
        max_safe_sample_temperature: f64,
    ) -> TransmeasResult<Self> {
        regime.validate()?;
        if max_safe_sample_temperature <= 0.0 {
            return Err(TransmeasError::Configuration(
                "safe sample temperature ceiling must be positive".to_string(),
            ));
        }
        Ok(Self {
            magnet,
            thermometer,
            regime,
            max_safe_sample_temperature,
            target: RwLock::new(None),
        })
    }

    /// The configured field limits.
    pub fn regime(&self) -> &FieldRegime {
        &self.regime
    }

    /// The last accepted ramp request, as `(field, rate)`.
    pub async fn target(&self) -> Option<(f64, f64)> {
        *self.target.read().await
    }

    /// Command a field ramp to `target` (T) at `rate` (T/min).
    ///
    /// The sample thermometer is read on every call; a reading at or above
    /// the safety ceiling refuses the ramp with
    /// [`TransmeasError::UnsafeTemperature`] before anything reaches the
    /// magnet. Range and rate validation follow, so any error means the
    /// magnet was not commanded.
    pub async fn set_target_field(&self, target: f64, rate: f64) -> TransmeasResult<()> {
        let kelvin = self.thermometer.kelvin().await?;
        if kelvin >= self.max_safe_sample_temperature {
            return Err(TransmeasError::UnsafeTemperature {
                kelvin,
                ceiling: self.max_safe_sample_temperature,
            });
        }

        let r = &self.regime;
        if !(r.lower_field..=r.upper_field).contains(&target) {
            return Err(TransmeasError::OutOfRange {
                quantity: "target field",
                value: target,
                min: r.lower_field,
                max: r.upper_field,
            });
        }
        if rate <= 0.0 || rate > r.upper_ramp_rate {
            return Err(TransmeasError::RateLimit {
                rate,
                limit: r.upper_ramp_rate,
                regime: "sample magnet",
            });
        }

        let mut state = self.target.write().await;
        info!("field ramp to {target} T at {rate} T/min (sample at {kelvin} K)");
        self.magnet.start(target, rate).await?;
        *state = Some((target, rate));
        Ok(())
    }

    /// Live field reading (T).
    pub async fn field(&self) -> TransmeasResult<f64> {
        Ok(self.magnet.field().await?)
    }

    /// Setpoint reported by the magnet (T).
    pub async fn setpoint(&self) -> TransmeasResult<f64> {
        Ok(self.magnet.setpoint().await?)
    }

    /// Whether the magnet reports the field settled.
    pub async fn is_stable(&self) -> TransmeasResult<bool> {
        Ok(self.magnet.stable().await?)
    }

    /// Poll [`Self::is_stable`] every `poll_interval` until it reports true
    /// or `timeout` elapses.
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

    /// Stop the magnet and clear the recorded target.
    ///
    /// Idempotent and infallible; stop failures are logged, not raised.
    pub async fn abort(&self) {
        let mut state = self.target.write().await;
        if let Err(err) = self.magnet.stop().await {
            warn!("abort: magnet stop failed: {err:#}");
        }
        *state = None;
        info!("field ramp aborted");
    }
}
