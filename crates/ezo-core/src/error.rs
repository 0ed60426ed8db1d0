//! Error types for probe communication.
//!
//! `EzoError` is the single error type surfaced by the protocol engine, the
//! reply grammar and every sensor operation built on them. Nothing in this
//! crate recovers locally from an error: the only built-in recovery is the
//! single retry on a "pending" status byte inside the protocol engine.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`**: the bus read or write itself failed.
//! - **`Device`** / **`NoData`** / **`PendingTimeout`**: the probe answered
//!   with a non-success status byte (2, 255, or 254 twice in a row).
//! - **`Parse`**: the reply payload did not match the grammar declared for
//!   the command, or a numeric field did not parse.
//! - **`Validation`**: a caller-supplied argument was outside its documented
//!   domain, or a structural invariant of a reply was violated.
//! - **`NotImplemented`**: an abstract capability was invoked on a type that
//!   does not provide it.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the probe error type.
pub type Result<T> = std::result::Result<T, EzoError>;

/// Primary error type for probe communication.
#[derive(Error, Debug)]
pub enum EzoError {
    /// Underlying bus I/O failed. Never retried by this layer.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Status byte 2: the probe rejected or failed the command.
    #[error("Device reported an error for command '{command}'")]
    Device {
        /// Command text that was rejected.
        command: String,
    },

    /// Status byte 255: the probe had no data to return.
    #[error("Device has no data for command '{command}'")]
    NoData {
        /// Command text that produced no data.
        command: String,
    },

    /// Status byte 254 persisted after the single retry.
    #[error("Device still pending for command '{command}' after retry (wait {wait:?})")]
    PendingTimeout {
        /// Command text that stayed pending.
        command: String,
        /// Wait applied before each of the two reads.
        wait: Duration,
    },

    /// Reply payload did not match the expected grammar.
    #[error("Failed to parse reply to '{command}': {reason} (payload: {payload:?})")]
    Parse {
        /// Command whose reply failed to parse.
        command: String,
        /// Payload as received, framing removed.
        payload: String,
        /// What did not match.
        reason: String,
    },

    /// Argument outside its domain, or a reply violated a structural invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Abstract capability invoked on a type that does not implement it.
    #[error("Operation '{0}' is not implemented for this sensor")]
    NotImplemented(&'static str),
}

impl EzoError {
    /// Build a [`EzoError::Parse`].
    pub fn parse(
        command: impl Into<String>,
        payload: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EzoError::Parse {
            command: command.into(),
            payload: payload.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`EzoError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        EzoError::Validation(message.into())
    }

    /// True for caller-side argument or invariant failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, EzoError::Validation(_))
    }

    /// Status byte that produced this error, if it came from a reply frame.
    pub fn status_code(&self) -> Option<u8> {
        match self {
            EzoError::Device { .. } => Some(2),
            EzoError::PendingTimeout { .. } => Some(254),
            EzoError::NoData { .. } => Some(255),
            _ => None,
        }
    }
}
