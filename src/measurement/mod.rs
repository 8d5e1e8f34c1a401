//! Measurement orchestration.
//!
//! Sweeps here only set parameters, wait, and read back; dataset storage,
//! plotting and analysis belong to the measurement framework driving this
//! crate and stay behind the returned data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod iv;

pub use iv::{IvSweep, SweepPlan};

/// A single data point captured during a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// UTC timestamp when the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Instrument identifier (e.g. "k2182a").
    pub instrument_id: String,
    /// Channel identifier (e.g. "voltage").
    pub channel: String,
    /// Measured value, normalized to f64.
    pub value: f64,
    /// Physical unit (SI notation).
    pub unit: String,
    /// Optional sweep-specific metadata (JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
