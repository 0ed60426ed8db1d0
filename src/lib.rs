//! # EZO DAQ
//!
//! Application layer for Atlas Scientific EZO probes sharing one addressable
//! bus. The protocol engine and drivers live in the workspace crates:
//!
//! - **`ezo-core`**: transport contract, request/reply engine, reply grammar,
//!   shared sensor capabilities and a scripted mock transport.
//! - **`ezo-driver-ph`**: the pH probe.
//! - **`ezo-driver-conductivity`**: the conductivity / TDS / salinity probe.
//!
//! This crate wires them together:
//!
//! - **`config`**: TOML + environment configuration via figment.
//! - **`logging`**: `tracing-subscriber` setup driven by the configuration.
//! - **`registry`**: builds probe drivers from configuration and runs their
//!   initialization.

pub mod config;
pub mod logging;
pub mod registry;

pub use config::{ConfigError, EzoConfig, ProbeDefinition, ProbeKind};
pub use logging::{LoggingConfig, OutputFormat};
pub use registry::ProbeRegistry;
