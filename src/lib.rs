//! Instrument drivers and measurement orchestration for laboratory
//! transport measurements.
//!
//! The crate provides typed drivers for the instruments on the bench (a
//! rapid-cycle ADR cryostat, a sample magnet, an IVVI measurement rack, a
//! Keithley 2182A nanovoltmeter) and thin sweep orchestration on top of
//! them. Hardware access goes through the capability traits in
//! [`hardware::capabilities`]; controllers and sweeps are pure policy over
//! injected handles, so everything is testable against the mocks in
//! [`hardware::mock`].
//!
//! Data acquisition beyond the returned [`measurement::DataPoint`]s, as well
//! as plotting and dataset storage, belong to the measurement framework
//! driving this crate.

pub mod config;
pub mod controller;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod measurement;

pub use config::Settings;
pub use error::{TransmeasError, TransmeasResult};
