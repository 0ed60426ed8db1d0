//! pH probe driver for ezo-daq.
//!
//! Adds single-value pH readings, the calibration slope query and three-point
//! (high / mid / low) calibration on top of the shared command set in
//! `ezo-core`.
//!
//! ```rust,ignore
//! use ezo_core::Sensor;
//! use ezo_driver_ph::PhProbe;
//!
//! let probe = PhProbe::new(bus.device(99));
//! let ph = probe.value().await?;
//! ```

pub mod ph;

pub use ph::{CalibrationSlope, PhCalibrationPoint, PhProbe};
