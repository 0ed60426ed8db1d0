//! Conductivity probe driver.
//!
//! Adds multi-channel readings (EC, TDS, salinity, specific gravity),
//! probe constant handling and four-point calibration on top of the shared
//! command set in [`ezo_core::SensorCore`].

pub mod conductivity;
pub mod output;

pub use conductivity::{ConductivityCalibrationPoint, ConductivityProbe};
pub use output::{MeasurementSet, OutputParameter, OutputParameterSet};
