//! Core protocol engine and shared capabilities for Atlas Scientific EZO probes.
//!
//! This crate contains everything the probe drivers share:
//!
//! - **`transport`**: the addressable bus read/write contract and [`Bus`], which
//!   serializes every probe on one transport behind a single guard.
//! - **`protocol`**: the request/reply engine. A [`Transaction`] writes a
//!   [`Command`], waits its settle time, reads a 64-byte frame, decodes the
//!   status byte (retrying once on "pending") and strips the framing.
//! - **`response`**: the fixed reply grammar used to extract named fields.
//! - **`sensor`**: [`SensorCore`], the base command set, and the [`Sensor`]
//!   capability trait implemented by every probe driver.
//! - **`error`**: the [`EzoError`] taxonomy.
//! - **`mock`**: a scripted in-memory transport for tests.

pub mod error;
pub mod mock;
pub mod protocol;
pub mod response;
pub mod sensor;
pub mod transport;

pub use error::{EzoError, Result};
pub use protocol::{Command, Device, ReplyFrame, ReplyStatus, Transaction, FRAME_LEN};
pub use response::{FieldKind, ParsedFields, ReplyPattern};
pub use sensor::{DeviceInfo, Sensor, SensorCore, Status};
pub use transport::{Bus, BusGuard, DynTransport, Transport};
