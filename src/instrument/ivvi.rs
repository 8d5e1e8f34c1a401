//! IVVI rack modules (QuTech battery-powered measurement rack).
//!
//! The rack is controlled through isolated analog inputs, so the "driver" is
//! mostly policy: which unit a module's output carries in each mode and how
//! a requested physical output maps onto the raw command value fed into the
//! module, scaled by the configured range.
//!
//! Module docs: <https://qtwork.tudelft.nl/~schouten/ivvi/index-ivvi.htm>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TransmeasError, TransmeasResult};

/// Source mode of the S4c current/voltage source module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMode {
    /// Current output; range acts as a transconductance (A per volt of
    /// command input).
    Current,
    /// Voltage output with a current limit of 3x range.
    Voltage,
    /// Voltage output with a series output resistance of 1/range ohms.
    VoltageWithResistance,
}

impl SourceMode {
    /// Unit of the module output in this mode.
    pub fn unit(&self) -> &'static str {
        match self {
            SourceMode::Current => "A",
            SourceMode::Voltage | SourceMode::VoltageWithResistance => "V",
        }
    }

    /// Front-panel label for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Current => "I",
            SourceMode::Voltage => "V",
            SourceMode::VoltageWithResistance => "V+R",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = TransmeasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(SourceMode::Current),
            "V" => Ok(SourceMode::Voltage),
            "V+R" => Ok(SourceMode::VoltageWithResistance),
            other => Err(TransmeasError::UnknownMode(other.to_string())),
        }
    }
}

/// Range settings accepted by the S4c hardware switch.
pub const S4C_RANGES: [f64; 8] = [1e-9, 1e-8, 1e-7, 1e-6, 1e-5, 1e-4, 1e-3, 2e-3];

/// Map a requested physical output onto the raw command value for the
/// module, given the configured range.
///
/// The request magnitude may not exceed the range: the command input is
/// bounded to one volt, and in current mode the range is exactly the full
/// scale per command volt. Current mode divides by the range; both voltage
/// modes pass the request through unchanged.
pub fn transform_output(
    mode: SourceMode,
    requested: f64,
    range_scale: f64,
) -> TransmeasResult<f64> {
    if requested.abs() > range_scale {
        return Err(TransmeasError::OutOfRange {
            quantity: "source output",
            value: requested,
            min: -range_scale,
            max: range_scale,
        });
    }
    match mode {
        SourceMode::Current => Ok(requested / range_scale),
        SourceMode::Voltage | SourceMode::VoltageWithResistance => Ok(requested),
    }
}

/// Output polarity configuration of the S4c module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// Pin 2 at ground.
    Single,
    /// Pin 2 at -V.
    Symmetric,
}

/// One channel of the S0 galvanic isolation module.
///
/// Accepts a command voltage within +-1 V and forwards it to the connected
/// module scaled by a fixed per-channel factor.
#[derive(Debug, Clone)]
pub struct S0Channel {
    scaling_factor: f64,
    bandwidth_hz: f64,
}

impl S0Channel {
    const BANDWIDTH_RANGE: (f64, f64) = (1000.0, 10000.0);

    /// Create a channel with the given fixed scaling factor.
    pub fn new(scaling_factor: f64) -> Self {
        Self {
            scaling_factor,
            bandwidth_hz: 1000.0,
        }
    }

    /// Configured isolation bandwidth (Hz).
    pub fn bandwidth_hz(&self) -> f64 {
        self.bandwidth_hz
    }

    /// Set the isolation bandwidth (1 to 10 kHz).
    pub fn set_bandwidth_hz(&mut self, hz: f64) -> TransmeasResult<()> {
        let (min, max) = Self::BANDWIDTH_RANGE;
        if !(min..=max).contains(&hz) {
            return Err(TransmeasError::OutOfRange {
                quantity: "isolation bandwidth",
                value: hz,
                min,
                max,
            });
        }
        self.bandwidth_hz = hz;
        Ok(())
    }

    /// Voltage appearing at the module side for a command `input` (V).
    pub fn output(&self, input: f64) -> TransmeasResult<f64> {
        if !(-1.0..=1.0).contains(&input) {
            return Err(TransmeasError::OutOfRange {
                quantity: "isolation input",
                value: input,
                min: -1.0,
                max: 1.0,
            });
        }
        Ok(input * self.scaling_factor)
    }

    /// Computer-side input that makes `output` appear at the module side.
    ///
    /// Inverts the fixed scaling; the resulting input must still be a legal
    /// command voltage, so an attenuating channel can only reach a fraction
    /// of the downstream module's full scale.
    pub fn input_for(&self, output: f64) -> TransmeasResult<f64> {
        let input = output / self.scaling_factor;
        if !(-1.0..=1.0).contains(&input) {
            return Err(TransmeasError::OutOfRange {
                quantity: "isolation input",
                value: input,
                min: -1.0,
                max: 1.0,
            });
        }
        Ok(input)
    }
}

/// S4c current/voltage source module.
///
/// Carries the mode, range and polarity switches of the physical module and
/// resolves requested outputs into raw command values.
#[derive(Debug, Clone)]
pub struct S4cChannel {
    slot: u8,
    polarity: Polarity,
    range: f64,
    mode: SourceMode,
}

impl S4cChannel {
    /// Create a module in the given rack slot (2 or 3).
    ///
    /// Slot 2 takes its command input from S0 channel 1; slot 3 from S0
    /// channel 2.
    pub fn new(slot: u8) -> TransmeasResult<Self> {
        if !(2..=3).contains(&slot) {
            return Err(TransmeasError::OutOfRange {
                quantity: "S4c slot",
                value: f64::from(slot),
                min: 2.0,
                max: 3.0,
            });
        }
        Ok(Self {
            slot,
            polarity: Polarity::Symmetric,
            range: 1e-6,
            mode: SourceMode::Current,
        })
    }

    /// Rack slot of this module.
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Configured output polarity.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Set the output polarity switch.
    pub fn set_polarity(&mut self, polarity: Polarity) {
        self.polarity = polarity;
    }

    /// Configured range.
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Set the range switch. Only the discrete hardware positions in
    /// [`S4C_RANGES`] are accepted.
    pub fn set_range(&mut self, range: f64) -> TransmeasResult<()> {
        if !S4C_RANGES.contains(&range) {
            return Err(TransmeasError::Instrument(format!(
                "range {range} not a valid S4c switch position ({S4C_RANGES:?})"
            )));
        }
        self.range = range;
        Ok(())
    }

    /// Configured source mode.
    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Set the source mode switch.
    pub fn set_mode(&mut self, mode: SourceMode) {
        self.mode = mode;
    }

    /// Unit of the module output in the configured mode.
    pub fn unit(&self) -> &'static str {
        self.mode.unit()
    }

    /// Raw command value that produces the `requested` physical output in
    /// the configured mode and range.
    pub fn command_value(&self, requested: f64) -> TransmeasResult<f64> {
        transform_output(self.mode, requested, self.range)
    }
}

/// The assembled rack: two isolation channels and the source module.
#[derive(Debug, Clone)]
pub struct IvviRack {
    /// S0 channel 1 (unity scaling), feeding slot 2.
    pub s0_channel1: S0Channel,
    /// S0 channel 2 (1:100 attenuation), feeding slot 3.
    pub s0_channel2: S0Channel,
    /// The S4c source module.
    pub s4c: S4cChannel,
}

impl IvviRack {
    /// Build a rack with the factory scaling factors and the S4c in the
    /// given slot.
    pub fn new(s4c_slot: u8) -> TransmeasResult<Self> {
        Ok(Self {
            s0_channel1: S0Channel::new(1.0),
            s0_channel2: S0Channel::new(0.01),
            s4c: S4cChannel::new(s4c_slot)?,
        })
    }

    /// The isolation channel wired to the S4c's configured slot.
    pub fn isolation_for_s4c(&self) -> &S0Channel {
        match self.s4c.slot() {
            2 => &self.s0_channel1,
            _ => &self.s0_channel2,
        }
    }

    /// Computer-side drive value that makes the S4c produce `requested` in
    /// its configured mode and range.
    ///
    /// Resolves the raw module command, then inverts the scaling of the
    /// isolation channel feeding that slot. Through an attenuating channel
    /// only a fraction of the module's full scale is reachable.
    pub fn set_output(&self, requested: f64) -> TransmeasResult<f64> {
        let command = self.s4c.command_value(requested)?;
        self.isolation_for_s4c().input_for(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_units() {
        assert_eq!(SourceMode::Current.unit(), "A");
        assert_eq!(SourceMode::Voltage.unit(), "V");
        assert_eq!(SourceMode::VoltageWithResistance.unit(), "V");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("I".parse::<SourceMode>().unwrap(), SourceMode::Current);
        assert_eq!("V".parse::<SourceMode>().unwrap(), SourceMode::Voltage);
        assert_eq!(
            "V+R".parse::<SourceMode>().unwrap(),
            SourceMode::VoltageWithResistance
        );
        let err = "X".parse::<SourceMode>().unwrap_err();
        assert!(matches!(err, TransmeasError::UnknownMode(s) if s == "X"));
    }

    #[test]
    fn test_current_mode_scaling() {
        // 0.5 uA on the 1 uA range: half-scale command.
        assert_eq!(
            transform_output(SourceMode::Current, 5e-7, 1e-6).unwrap(),
            0.5
        );
        // Voltage modes pass through.
        assert_eq!(
            transform_output(SourceMode::Voltage, 5e-7, 1e-6).unwrap(),
            5e-7
        );
        assert_eq!(
            transform_output(SourceMode::VoltageWithResistance, 1e-7, 1e-6).unwrap(),
            1e-7
        );
    }

    #[test]
    fn test_request_bounded_by_range() {
        let err = transform_output(SourceMode::Current, 2e-6, 1e-6).unwrap_err();
        assert!(matches!(err, TransmeasError::OutOfRange { .. }));
        let err = transform_output(SourceMode::Voltage, -2e-6, 1e-6).unwrap_err();
        assert!(matches!(err, TransmeasError::OutOfRange { .. }));
        // Exactly full scale is allowed.
        assert_eq!(
            transform_output(SourceMode::Current, 1e-6, 1e-6).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_s4c_switch_validation() {
        assert!(S4cChannel::new(1).is_err());
        let mut s4c = S4cChannel::new(2).unwrap();
        assert_eq!(s4c.unit(), "A");

        s4c.set_range(1e-3).unwrap();
        assert_eq!(s4c.range(), 1e-3);
        assert!(s4c.set_range(3e-3).is_err());

        s4c.set_mode(SourceMode::Voltage);
        assert_eq!(s4c.unit(), "V");
    }

    #[test]
    fn test_s0_channel_scaling_and_bounds() {
        let rack = IvviRack::new(3).unwrap();
        assert_eq!(rack.s0_channel1.output(0.5).unwrap(), 0.5);
        assert_eq!(rack.s0_channel2.output(0.5).unwrap(), 0.005);
        assert!(rack.s0_channel1.output(1.5).is_err());

        let mut ch = rack.s0_channel1.clone();
        ch.set_bandwidth_hz(5000.0).unwrap();
        assert_eq!(ch.bandwidth_hz(), 5000.0);
        assert!(ch.set_bandwidth_hz(100.0).is_err());
    }

    #[test]
    fn test_command_value_through_module() {
        let mut s4c = S4cChannel::new(2).unwrap();
        s4c.set_range(1e-6).unwrap();
        assert_eq!(s4c.command_value(5e-7).unwrap(), 0.5);
        assert!(s4c.command_value(2e-6).is_err());
    }

    #[test]
    fn test_set_output_routes_through_isolation() {
        // Slot 2 is fed by the unity channel: drive value equals command.
        let rack = IvviRack::new(2).unwrap();
        assert_eq!(rack.set_output(5e-7).unwrap(), 0.5);

        // Slot 3 sits behind the 1:100 attenuator; small requests invert the
        // scaling, full-scale requests would need an illegal drive value.
        let rack = IvviRack::new(3).unwrap();
        assert!((rack.set_output(5e-9).unwrap() - 0.5).abs() < 1e-12);
        assert!(rack.set_output(5e-7).is_err());
    }
}
