//! Hardware access layer.
//!
//! Controllers in this crate never talk to physical devices directly; they
//! are handed capability objects ([`capabilities`]) at construction and own
//! them exclusively. [`mock`] provides simulated implementations so the
//! policy layer can be exercised without a cryostat in the room.

pub mod capabilities;
pub mod mock;

pub use capabilities::{
    AdrControl, AdrMode, CurrentSource, HeaterControl, MagnetControl, Thermometer, Voltmeter,
};
