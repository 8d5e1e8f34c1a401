//! Minimal SCPI transport seam and response helpers.
//!
//! Drivers that speak SCPI depend on this trait instead of a concrete serial
//! or GPIB session, so their command grammar is testable against a scripted
//! transport. A production implementation wraps whatever bus session the
//! instrument hangs off; it owns framing (terminators) and timeouts.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::{TransmeasError, TransmeasResult};

/// Request/response transport for SCPI instruments.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command that produces no reply.
    async fn write(&self, command: &str) -> Result<()>;
    /// Send a query and return the instrument's reply, terminator stripped.
    async fn query(&self, command: &str) -> Result<String>;
}

/// Parse a numeric instrument reply.
///
/// Handles scientific notation and surrounding whitespace; explicit error
/// replies are surfaced rather than parsed.
pub fn parse_f64(instrument: &str, response: &str) -> TransmeasResult<f64> {
    let trimmed = response.trim();
    if trimmed.contains("ERR") || trimmed.contains("OVER") || trimmed.contains("UNDER") {
        return Err(TransmeasError::Instrument(format!(
            "{instrument}: error response: {trimmed}"
        )));
    }
    trimmed.parse::<f64>().map_err(|_| {
        TransmeasError::Instrument(format!(
            "{instrument}: failed to parse numeric response: '{trimmed}'"
        ))
    })
}

/// Format a boolean for SCPI on/off parameters.
pub fn format_on_off(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

/// Parse an SCPI on/off reply ("0"/"1", "ON"/"OFF").
pub fn parse_on_off(instrument: &str, response: &str) -> TransmeasResult<bool> {
    match response.trim() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        other => Err(TransmeasError::Instrument(format!(
            "{instrument}: expected on/off response, got '{other}'"
        ))),
    }
}
