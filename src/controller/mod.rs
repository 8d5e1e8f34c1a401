//! Ramp controllers for the cryostat.
//!
//! [`temperature`] holds the dual-regime temperature ramp policy;
//! [`field`] the single-backend magnet analogue with its temperature
//! interlock. Both are pure decision layers over injected
//! [`crate::hardware::capabilities`] handles.

pub mod field;
pub mod temperature;

pub use field::{FieldController, FieldRegime};
pub use temperature::{ActiveRegime, RampController, RegimeBoundaries, StopPolicy};
