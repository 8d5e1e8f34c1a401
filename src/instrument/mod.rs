//! Instrument drivers.
//!
//! Drivers translate typed parameter accesses into instrument commands. They
//! are written against narrow transport or capability seams so the command
//! grammar can be tested without hardware on the bench.

pub mod ivvi;
pub mod keithley_2182a;
pub mod scpi;

pub use ivvi::{IvviRack, S0Channel, S4cChannel, SourceMode};
pub use keithley_2182a::Keithley2182a;
pub use scpi::ScpiTransport;
