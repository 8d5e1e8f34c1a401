//! Custom error types for the library.
//!
//! This module defines the primary error type, `TransmeasError`, for the whole
//! crate. Using the `thiserror` crate, it gives callers typed, matchable
//! failures for every policy decision the controllers make (range checks,
//! rate limits, interlocks, timeouts) instead of log lines they would have to
//! parse.
//!
//! ## Error Hierarchy
//!
//! - **Validation failures** (`OutOfRange`, `RateLimit`, `UnsafeTemperature`,
//!   `UnknownMode`): the request was refused before any hardware side effect;
//!   controller state is unchanged.
//! - **Timeouts** (`BackendStopTimeout`, `StabilizationTimeout`): a bounded
//!   wait expired. `BackendStopTimeout` is special: the previously active
//!   control stage may still be driving hardware, so it must be surfaced to
//!   an operator rather than retried blindly.
//! - **`ControllerNotInitialized`**: a query that needs an active control
//!   stage was made while none is active.
//! - **Wrapping variants** (`Config`, `Io`, `Instrument`, `Backend`): faults
//!   from configuration loading, transports and injected hardware handles.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type TransmeasResult<T> = std::result::Result<T, TransmeasError>;

/// Errors raised by controllers, instrument drivers and configuration.
#[derive(Error, Debug)]
pub enum TransmeasError {
    /// A requested value lies outside the configured physical bounds.
    #[error("{quantity} {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        /// Which quantity was validated (e.g. "target temperature").
        quantity: &'static str,
        /// The offending value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },

    /// A requested ramp rate exceeds the ceiling of the selected regime.
    #[error("ramp rate {rate} exceeds limit {limit} for {regime}")]
    RateLimit {
        /// The requested rate.
        rate: f64,
        /// The regime-specific ceiling.
        limit: f64,
        /// Which regime the ceiling belongs to.
        regime: &'static str,
    },

    /// The previously active control stage did not relinquish control.
    #[error(
        "'{backend}' still active after {attempts} stop polls; \
         physical state ambiguous, operator intervention required"
    )]
    BackendStopTimeout {
        /// Name of the stage that refused to stop.
        backend: &'static str,
        /// How many bounded stop polls were attempted.
        attempts: u32,
    },

    /// Stability was not reached within the caller-specified timeout.
    #[error("stability not reached within {timeout:?}")]
    StabilizationTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A field ramp was refused because of a live temperature reading.
    #[error("sample at {kelvin} K, above the {ceiling} K ceiling for field ramps")]
    UnsafeTemperature {
        /// The live thermometer reading.
        kelvin: f64,
        /// The configured safety ceiling.
        ceiling: f64,
    },

    /// An unrecognized source-mode label.
    #[error("unknown source mode '{0}' (expected one of: I, V, V+R)")]
    UnknownMode(String),

    /// An operation requiring an active control stage found none.
    #[error("no control stage is active; issue a ramp first")]
    ControllerNotInitialized,

    /// Configuration loading or extraction failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An instrument replied with something unusable.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Fault propagated from an injected hardware handle.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
