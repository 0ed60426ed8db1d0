//! Request/Reply Protocol Engine
//!
//! Protocol Overview:
//! - Commands: plain ASCII text written to the probe's bus address (no terminator)
//! - Settle time: the probe needs a command-specific delay before its reply is valid
//! - Reply: fixed 64-byte frame; byte 0 is a status code, the rest is NUL-padded ASCII
//!
//! Status codes:
//! - `1` success
//! - `2` device error (fail immediately)
//! - `254` still processing (wait the settle time again and re-read exactly once)
//! - `255` no data (fail immediately)
//! - anything else passes through as success
//!
//! # Concurrency
//!
//! The probe has no transaction IDs, so a reply belongs to whichever command
//! was written last. A [`Transaction`] holds the device's guard from the
//! moment it is created until it is dropped, and it is the only way to talk
//! to the transport. Multi-step operations therefore run inside one
//! `Transaction` and nothing can be interleaved between their write and read.
//!
//! # Example
//!
//! ```rust,ignore
//! use ezo_core::protocol::{Command, Device};
//!
//! let device = Device::new(transport, 99);
//! let payload = device.query(&Command::new("R", Duration::from_millis(1000))).await?;
//! ```

use crate::error::{EzoError, Result};
use crate::response::{ParsedFields, ReplyPattern};
use crate::transport::{new_guard, BusGuard, DynTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::MutexGuard;

/// Size of every reply frame read from the bus.
pub const FRAME_LEN: usize = 64;

/// Settle time for ordinary queries and settings.
pub const SHORT_SETTLE: Duration = Duration::from_millis(300);

/// Settle time for a reading (`R`).
pub const READING_SETTLE: Duration = Duration::from_millis(1000);

/// An ASCII command plus the settle time the probe needs to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    settle: Duration,
}

impl Command {
    /// Command with an explicit settle time.
    pub fn new(text: impl Into<String>, settle: Duration) -> Self {
        Self {
            text: text.into(),
            settle,
        }
    }

    /// Command answered after [`SHORT_SETTLE`].
    pub fn short(text: impl Into<String>) -> Self {
        Self::new(text, SHORT_SETTLE)
    }

    /// ASCII text written to the bus.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Delay between the write and the first read.
    pub fn settle(&self) -> Duration {
        self.settle
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Interpretation of a reply frame's status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Code `1`.
    Success,
    /// Code `2`.
    DeviceError,
    /// Code `254`: still processing.
    Pending,
    /// Code `255`.
    NoData,
    /// Undocumented code; treated as success.
    Unrecognized(u8),
}

impl ReplyStatus {
    /// Classify a raw status byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ReplyStatus::Success,
            2 => ReplyStatus::DeviceError,
            254 => ReplyStatus::Pending,
            255 => ReplyStatus::NoData,
            other => ReplyStatus::Unrecognized(other),
        }
    }

    /// The status byte this variant was decoded from.
    pub fn code(self) -> u8 {
        match self {
            ReplyStatus::Success => 1,
            ReplyStatus::DeviceError => 2,
            ReplyStatus::Pending => 254,
            ReplyStatus::NoData => 255,
            ReplyStatus::Unrecognized(code) => code,
        }
    }
}

/// One raw reply frame as returned by the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct ReplyFrame([u8; FRAME_LEN]);

impl ReplyFrame {
    /// Wrap a frame exactly as read from the transport.
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a frame from a status code and ASCII payload, NUL-padded.
    ///
    /// Payloads longer than the frame are truncated.
    pub fn encode(status: u8, payload: &str) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = status;
        let body = payload.as_bytes();
        let n = body.len().min(FRAME_LEN - 1);
        bytes[1..=n].copy_from_slice(&body[..n]);
        Self(bytes)
    }

    /// Decoded status byte.
    pub fn status(&self) -> ReplyStatus {
        ReplyStatus::from_code(self.0[0])
    }

    /// Payload bytes after the status byte with trailing NUL padding removed.
    pub fn payload_bytes(&self) -> &[u8] {
        let body = &self.0[1..];
        let end = body
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &body[..end]
    }

    /// Payload as text, or `None` if it contains a non-ASCII byte.
    pub fn payload(&self) -> Option<&str> {
        let bytes = self.payload_bytes();
        if bytes.is_ascii() {
            std::str::from_utf8(bytes).ok()
        } else {
            None
        }
    }

    /// The whole frame, status byte included.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ReplyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyFrame")
            .field("status", &self.status())
            .field("payload", &String::from_utf8_lossy(self.payload_bytes()))
            .finish()
    }
}

/// Handle to one probe at a fixed bus address.
///
/// The transport is shared, the address is fixed at construction and the
/// guard serializes transactions. Handles are cheap to clone; clones share
/// the same guard.
#[derive(Clone)]
pub struct Device {
    transport: DynTransport,
    address: u8,
    guard: BusGuard,
}

impl Device {
    /// Handle with its own private guard.
    pub fn new(transport: DynTransport, address: u8) -> Self {
        Self::with_guard(transport, address, new_guard())
    }

    /// Handle sharing `guard` with other handles (see [`crate::transport::Bus`]).
    pub fn with_guard(transport: DynTransport, address: u8, guard: BusGuard) -> Self {
        Self {
            transport,
            address,
            guard,
        }
    }

    /// Bus address this handle talks to.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// True when both handles serialize on the same guard.
    pub fn shares_guard_with(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.guard, &other.guard)
    }

    /// Acquire the guard and open a transaction.
    pub async fn begin(&self) -> Transaction<'_> {
        let guard = self.guard.lock().await;
        Transaction {
            device: self,
            _guard: guard,
        }
    }

    /// Write `command` and return its reply payload, as one transaction.
    pub async fn query(&self, command: &Command) -> Result<String> {
        self.begin().await.query(command).await
    }

    /// Write `command` and expect a successful reply; the payload is discarded.
    pub async fn execute(&self, command: &Command) -> Result<()> {
        self.begin().await.execute(command).await
    }

    /// Write `command` and match the reply against `pattern`, as one transaction.
    pub async fn write_read_parse(
        &self,
        command: &Command,
        pattern: &ReplyPattern,
    ) -> Result<ParsedFields> {
        self.begin().await.write_read_parse(command, pattern).await
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of a device for one logical operation.
///
/// The guard is released when the transaction is dropped, on every exit
/// path including `?` early returns.
pub struct Transaction<'a> {
    device: &'a Device,
    _guard: MutexGuard<'a, ()>,
}

impl Transaction<'_> {
    /// Bus address of the device under this transaction.
    pub fn address(&self) -> u8 {
        self.device.address
    }

    /// Write the command's ASCII text to the device.
    pub async fn write(&mut self, command: &Command) -> Result<()> {
        tracing::debug!(address = self.address(), command = %command, "Writing command");
        self.device
            .transport
            .write(self.device.address, command.text().as_bytes())
            .await?;
        Ok(())
    }

    /// Wait `wait`, read one frame and decode its status.
    ///
    /// A pending status is retried exactly once after waiting `wait` again.
    /// `command` only labels errors and log entries.
    pub async fn perform_read(&mut self, command: &Command, wait: Duration) -> Result<String> {
        tokio::time::sleep(wait).await;
        let mut frame = self.read_frame().await?;

        if frame.status() == ReplyStatus::Pending {
            tracing::warn!(
                address = self.address(),
                command = %command,
                wait_ms = wait.as_millis() as u64,
                "Device pending, attempting re-read after additional wait time"
            );
            tokio::time::sleep(wait).await;
            frame = self.read_frame().await?;
        }

        match frame.status() {
            ReplyStatus::Success => decode_payload(&frame, command),
            ReplyStatus::Unrecognized(code) => {
                tracing::debug!(
                    address = self.address(),
                    command = %command,
                    code,
                    "Unrecognized status code passed through as success"
                );
                decode_payload(&frame, command)
            }
            ReplyStatus::DeviceError => Err(EzoError::Device {
                command: command.to_string(),
            }),
            ReplyStatus::NoData => Err(EzoError::NoData {
                command: command.to_string(),
            }),
            ReplyStatus::Pending => Err(EzoError::PendingTimeout {
                command: command.to_string(),
                wait,
            }),
        }
    }

    /// Write `command`, wait its settle time and return the reply payload.
    pub async fn query(&mut self, command: &Command) -> Result<String> {
        self.write(command).await?;
        self.perform_read(command, command.settle()).await
    }

    /// Like [`Transaction::query`] for commands whose reply carries no data.
    pub async fn execute(&mut self, command: &Command) -> Result<()> {
        let payload = self.query(command).await?;
        if !payload.is_empty() {
            tracing::debug!(
                address = self.address(),
                command = %command,
                payload = %payload,
                "Ignoring payload on settings reply"
            );
        }
        Ok(())
    }

    /// Write, wait, read and match the payload against `pattern`.
    pub async fn write_read_parse(
        &mut self,
        command: &Command,
        pattern: &ReplyPattern,
    ) -> Result<ParsedFields> {
        let payload = self.query(command).await?;
        pattern.parse(command.text(), &payload)
    }

    async fn read_frame(&mut self) -> Result<ReplyFrame> {
        let mut bytes = [0u8; FRAME_LEN];
        self.device
            .transport
            .read(self.device.address, &mut bytes)
            .await?;
        let frame = ReplyFrame::from_bytes(bytes);
        tracing::trace!(address = self.address(), frame = ?frame, "Raw frame read from device");
        Ok(frame)
    }
}

fn decode_payload(frame: &ReplyFrame, command: &Command) -> Result<String> {
    frame.payload().map(str::to_string).ok_or_else(|| {
        EzoError::parse(
            command.text(),
            String::from_utf8_lossy(frame.payload_bytes()),
            "payload is not ASCII",
        )
    })
}
