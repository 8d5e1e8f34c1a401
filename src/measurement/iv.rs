//! IV curve sweep.
//!
//! Linear current sweep with per-point settle delay and voltage readback.
//! The source and meter are injected capabilities, so the same sweep runs
//! against a rack DAC, a mock, or anything else implementing the traits.

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{TransmeasError, TransmeasResult};
use crate::hardware::capabilities::{CurrentSource, Voltmeter};
use crate::measurement::DataPoint;

/// Sweep grid: `points` evenly spaced currents from `start` to `stop`, both
/// endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    /// First bias current (A).
    pub start: f64,
    /// Last bias current (A), included in the grid.
    pub stop: f64,
    /// Number of points (at least 2).
    pub points: usize,
    /// Settle delay between setting the source and reading the meter.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: 1e-6,
            points: 51,
            settle: Duration::from_millis(50),
        }
    }
}

impl SweepPlan {
    /// Validate the grid parameters.
    pub fn validate(&self) -> TransmeasResult<()> {
        if self.points < 2 {
            return Err(TransmeasError::Configuration(format!(
                "sweep needs at least 2 points, got {}",
                self.points
            )));
        }
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(TransmeasError::Configuration(
                "sweep endpoints must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// The setpoint grid.
    pub fn setpoints(&self) -> Vec<f64> {
        linspace(self.start, self.stop, self.points)
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n as f64 - 1.0);
    (0..n).map(|i| start + step * i as f64).collect()
}

/// IV measurement: sweep a current source, read a voltmeter.
pub struct IvSweep {
    experiment_name: String,
    sample_name: String,
    source: Arc<dyn CurrentSource>,
    meter: Arc<dyn Voltmeter>,
    meter_id: String,
}

impl IvSweep {
    /// Create a sweep bound to a source and a meter.
    pub fn new(
        experiment_name: impl Into<String>,
        sample_name: impl Into<String>,
        source: Arc<dyn CurrentSource>,
        meter: Arc<dyn Voltmeter>,
        meter_id: impl Into<String>,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            sample_name: sample_name.into(),
            source,
            meter,
            meter_id: meter_id.into(),
        }
    }

    /// Run the sweep, returning one voltage data point per grid point.
    ///
    /// On error the source is left at the last commanded setpoint; callers
    /// that need a defined end state should drive the source to zero
    /// afterwards.
    pub async fn run(&self, plan: &SweepPlan) -> TransmeasResult<Vec<DataPoint>> {
        plan.validate()?;
        let setpoints = plan.setpoints();
        info!(
            "IV sweep '{}' on '{}': {} points, {:?} settle",
            self.experiment_name,
            self.sample_name,
            setpoints.len(),
            plan.settle
        );

        let mut data = Vec::with_capacity(setpoints.len());
        for bias in setpoints {
            self.source.set_current(bias).await?;
            sleep(plan.settle).await;
            let voltage = self.meter.read_voltage().await?;
            data.push(DataPoint {
                timestamp: Utc::now(),
                instrument_id: self.meter_id.clone(),
                channel: "voltage".to_string(),
                value: voltage,
                unit: "V".to_string(),
                metadata: Some(json!({
                    "experiment": self.experiment_name,
                    "sample": self.sample_name,
                    "bias_current": bias,
                })),
            });
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockCurrentSource, MockVoltmeter};

    #[test]
    fn test_linspace_endpoints_and_spacing() {
        let grid = linspace(-1e-6, 1e-6, 5);
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[0], -1e-6);
        assert_eq!(grid[4], 1e-6);
        assert!((grid[2]).abs() < 1e-18);
    }

    #[test]
    fn test_plan_validation() {
        let plan = SweepPlan {
            start: 0.0,
            stop: 1e-6,
            points: 1,
            settle: Duration::from_millis(1),
        };
        assert!(plan.validate().is_err());
    }

    #[tokio::test]
    async fn test_sweep_visits_grid_and_reads_back() {
        let source = MockCurrentSource::new();
        let meter = MockVoltmeter::ohmic(source.clone(), 1000.0);
        let sweep = IvSweep::new(
            "iv",
            "sample_a",
            Arc::new(source.clone()),
            Arc::new(meter),
            "mock_meter",
        );

        let plan = SweepPlan {
            start: 0.0,
            stop: 4e-6,
            points: 5,
            settle: Duration::from_millis(1),
        };
        let data = sweep.run(&plan).await.unwrap();

        assert_eq!(source.history().await, plan.setpoints());
        assert_eq!(data.len(), 5);
        // Ohmic mock: V = 1000 * I.
        assert!((data[4].value - 4e-3).abs() < 1e-12);
        assert_eq!(data[0].unit, "V");
        let meta = data[0].metadata.as_ref().unwrap();
        assert_eq!(meta["sample"], "sample_a");
    }
}
