//! Shared Sensor Capabilities
//!
//! Every probe family speaks the same base command set (status, device
//! info, temperature compensation, indicator LED, calibration count/clear).
//! [`SensorCore`] implements that set on top of a [`Device`]; probe drivers
//! own a `SensorCore` by composition and add their own operations.
//!
//! The [`Sensor`] trait is the polymorphic view used by generic code (the
//! registry, utilities that only need status or a reading). Its methods
//! default to the probe's `SensorCore`; `value` has no default and fails
//! with [`EzoError::NotImplemented`] unless a driver overrides it.
//!
//! | Operation | Command | Settle | Reply |
//! |---|---|---|---|
//! | raw value | `R` | 1000 ms | raw payload |
//! | status | `STATUS` | 300 ms | `?STATUS,<restart>,<vcc>` |
//! | device info | `I` | 300 ms | `?I,<type>,<firmware>` |
//! | temperature compensation | `T,?` / `T,<v>` | 300 ms | `?T,<v>` / none |
//! | LED | `L,?` / `L,<0\|1>` | 300 ms | `?L,<0\|1>` / none |
//! | clear calibration | `CAL,clear` | per driver | none |
//! | calibration count | `CAL,?` | 300 ms | `?CAL,<n>` |

use crate::error::{EzoError, Result};
use crate::protocol::{Command, Device, READING_SETTLE, SHORT_SETTLE};
use crate::response::{FieldKind, ReplyPattern};
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

const STATUS_REPLY: ReplyPattern = ReplyPattern::new(
    "STATUS",
    &[
        ("restart_code", FieldKind::NonDigit),
        ("vcc", FieldKind::Decimal),
    ],
);

const DEVICE_INFO_REPLY: ReplyPattern = ReplyPattern::new(
    "I",
    &[
        ("device_type", FieldKind::Word),
        ("firmware_version", FieldKind::Decimal),
    ],
);

const TEMP_COMPENSATION_REPLY: ReplyPattern =
    ReplyPattern::new("T", &[("temperature", FieldKind::Decimal)]);

const LED_REPLY: ReplyPattern = ReplyPattern::new("L", &[("led", FieldKind::Bit)]);

const CALIBRATION_COUNT_REPLY: ReplyPattern =
    ReplyPattern::new("CAL", &[("count", FieldKind::Digit)]);

/// Default settle time for `CAL,clear`.
pub const CLEAR_CALIBRATION_SETTLE: Duration = SHORT_SETTLE;

/// Reply to `STATUS`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Single-letter reason for the last restart (e.g. `P` for power-on).
    pub restart_code: String,
    /// Supply voltage seen by the probe.
    pub vcc_voltage: f32,
}

/// Reply to `I`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Probe family as reported by the firmware (e.g. `pH`, `EC`).
    pub device_type: String,
    /// Firmware version, e.g. `1.98`.
    pub firmware_version: f32,
}

/// Base command set shared by every probe family.
#[derive(Debug, Clone)]
pub struct SensorCore {
    device: Device,
    clear_calibration_settle: Duration,
}

impl SensorCore {
    /// Base command set on `device`, clearing calibration after [`CLEAR_CALIBRATION_SETTLE`].
    pub fn new(device: Device) -> Self {
        Self {
            device,
            clear_calibration_settle: CLEAR_CALIBRATION_SETTLE,
        }
    }

    /// Override the settle time used by `CAL,clear`.
    pub fn with_clear_calibration_settle(mut self, settle: Duration) -> Self {
        self.clear_calibration_settle = settle;
        self
    }

    /// Handle every command goes through.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Bus address of the probe.
    pub fn address(&self) -> u8 {
        self.device.address()
    }

    /// Settle time used by `CAL,clear`.
    pub fn clear_calibration_settle(&self) -> Duration {
        self.clear_calibration_settle
    }

    /// Take a reading and return the payload untouched.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn raw_value(&self) -> Result<String> {
        self.device.query(&Command::new("R", READING_SETTLE)).await
    }

    /// Restart reason and supply voltage.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn status(&self) -> Result<Status> {
        let fields = self
            .device
            .write_read_parse(&Command::short("STATUS"), &STATUS_REPLY)
            .await?;
        Ok(Status {
            restart_code: fields.get("restart_code")?.to_string(),
            vcc_voltage: fields.get_f32("vcc")?,
        })
    }

    /// Probe family and firmware version.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        let fields = self
            .device
            .write_read_parse(&Command::short("I"), &DEVICE_INFO_REPLY)
            .await?;
        Ok(DeviceInfo {
            device_type: fields.get("device_type")?.to_string(),
            firmware_version: fields.get_f32("firmware_version")?,
        })
    }

    /// Temperature (°C) the probe compensates readings for.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn temp_compensation(&self) -> Result<f32> {
        self.device
            .write_read_parse(&Command::short("T,?"), &TEMP_COMPENSATION_REPLY)
            .await?
            .get_f32("temperature")
    }

    /// Set the compensation temperature. The value is sent as given,
    /// without rounding.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn set_temp_compensation(&self, celsius: f32) -> Result<()> {
        if !celsius.is_finite() {
            return Err(EzoError::validation(format!(
                "Temperature compensation must be finite, got {celsius}"
            )));
        }
        self.device
            .execute(&Command::short(format!("T,{celsius}")))
            .await
    }

    /// Whether the indicator LED is on.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn led(&self) -> Result<bool> {
        self.device
            .write_read_parse(&Command::short("L,?"), &LED_REPLY)
            .await?
            .get_bool("led")
    }

    /// Switch the indicator LED.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn set_led(&self, on: bool) -> Result<()> {
        let cmd = if on { "L,1" } else { "L,0" };
        self.device.execute(&Command::short(cmd)).await
    }

    /// Erase all calibration data on the probe.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn clear_calibration(&self) -> Result<()> {
        self.device
            .execute(&Command::new("CAL,clear", self.clear_calibration_settle))
            .await
    }

    /// Number of stored calibration points.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn calibration_count(&self) -> Result<u32> {
        self.device
            .write_read_parse(&Command::short("CAL,?"), &CALIBRATION_COUNT_REPLY)
            .await?
            .get_u32("count")
    }
}

/// Capability: a probe speaking the shared command set.
///
/// # Contract
/// - Every method is one or more complete transactions on the probe's device handle
/// - Errors are surfaced unchanged; nothing is retried or defaulted
/// - `value` returns the probe's primary reading and must be provided by the driver
#[async_trait]
pub trait Sensor: Send + Sync {
    /// Shared command set backing the default methods.
    fn core(&self) -> &SensorCore;

    /// Probe family name, for logs and registries.
    fn kind(&self) -> &'static str;

    /// Bring the probe into the state the driver expects. No-op by default.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Primary reading of this probe.
    async fn value(&self) -> Result<f32> {
        Err(EzoError::NotImplemented("value"))
    }

    /// See [`SensorCore::raw_value`].
    async fn raw_value(&self) -> Result<String> {
        self.core().raw_value().await
    }

    /// See [`SensorCore::status`].
    async fn status(&self) -> Result<Status> {
        self.core().status().await
    }

    /// See [`SensorCore::device_info`].
    async fn device_info(&self) -> Result<DeviceInfo> {
        self.core().device_info().await
    }

    /// See [`SensorCore::temp_compensation`].
    async fn temp_compensation(&self) -> Result<f32> {
        self.core().temp_compensation().await
    }

    /// See [`SensorCore::set_temp_compensation`].
    async fn set_temp_compensation(&self, celsius: f32) -> Result<()> {
        self.core().set_temp_compensation(celsius).await
    }

    /// See [`SensorCore::led`].
    async fn led(&self) -> Result<bool> {
        self.core().led().await
    }

    /// See [`SensorCore::set_led`].
    async fn set_led(&self, on: bool) -> Result<()> {
        self.core().set_led(on).await
    }

    /// See [`SensorCore::clear_calibration`].
    async fn clear_calibration(&self) -> Result<()> {
        self.core().clear_calibration().await
    }

    /// See [`SensorCore::calibration_count`].
    async fn calibration_count(&self) -> Result<u32> {
        self.core().calibration_count().await
    }
}

#[async_trait]
impl Sensor for SensorCore {
    fn core(&self) -> &SensorCore {
        self
    }

    fn kind(&self) -> &'static str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn core_with(replies: &[MockReply]) -> (Arc<MockTransport>, SensorCore) {
        let mock = Arc::new(MockTransport::new());
        for reply in replies {
            mock.push_reply(99, reply.clone());
        }
        let core = SensorCore::new(Device::new(mock.clone(), 99));
        (mock, core)
    }

    #[tokio::test(start_paused = true)]
    async fn status_reply_is_decoded() {
        let (mock, core) = core_with(&[MockReply::success("?STATUS,P,5.038")]);
        let status = core.status().await.unwrap();
        assert_eq!(status.restart_code, "P");
        assert!((status.vcc_voltage - 5.038).abs() < 1e-6);
        assert_eq!(mock.commands_for(99), vec!["STATUS"]);
    }

    #[tokio::test(start_paused = true)]
    async fn device_info_reply_is_decoded() {
        let (_, core) = core_with(&[MockReply::success("?I,pH,1.98")]);
        let info = core.device_info().await.unwrap();
        assert_eq!(info.device_type, "pH");
        assert!((info.firmware_version - 1.98).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_compensation_get_and_set() {
        let (mock, core) = core_with(&[MockReply::success("?T,19.5"), MockReply::ok()]);
        assert!((core.temp_compensation().await.unwrap() - 19.5).abs() < f32::EPSILON);
        core.set_temp_compensation(25.0).await.unwrap();
        assert_eq!(mock.commands_for(99), vec!["T,?", "T,25"]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_temperature_is_rejected_without_write() {
        let (mock, core) = core_with(&[]);
        let err = core.set_temp_compensation(f32::NAN).await.unwrap_err();
        assert!(err.is_validation());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn led_get_and_set() {
        let (mock, core) = core_with(&[
            MockReply::success("?L,1"),
            MockReply::ok(),
            MockReply::ok(),
        ]);
        assert!(core.led().await.unwrap());
        core.set_led(false).await.unwrap();
        core.set_led(true).await.unwrap();
        assert_eq!(mock.commands_for(99), vec!["L,?", "L,0", "L,1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_count_and_clear() {
        let (mock, core) = core_with(&[MockReply::success("?CAL,2"), MockReply::ok()]);
        assert_eq!(core.calibration_count().await.unwrap(), 2);

        let start = Instant::now();
        core.clear_calibration().await.unwrap();
        assert!(start.elapsed() >= CLEAR_CALIBRATION_SETTLE);
        assert_eq!(mock.commands_for(99), vec!["CAL,?", "CAL,clear"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_calibration_settle_is_configurable() {
        let (_, core) = core_with(&[MockReply::ok()]);
        let core = core.with_clear_calibration_settle(Duration::from_millis(1300));

        let start = Instant::now();
        core.clear_calibration().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn base_value_is_not_implemented() {
        let (mock, core) = core_with(&[]);
        let err = Sensor::value(&core).await.unwrap_err();
        assert!(matches!(err, EzoError::NotImplemented("value")));
        assert!(mock.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_count_is_parse_error() {
        let (_, core) = core_with(&[MockReply::success("?CAL,x")]);
        assert!(matches!(
            core.calibration_count().await.unwrap_err(),
            EzoError::Parse { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn trait_defaults_delegate_to_core() {
        let (_, core) = core_with(&[MockReply::success("12.5,1")]);
        let sensor: &dyn Sensor = &core;
        assert_eq!(sensor.raw_value().await.unwrap(), "12.5,1");
        assert_eq!(sensor.kind(), "generic");
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_is_sent_without_rounding() {
        let (mock, core) = core_with(&[MockReply::ok(), MockReply::ok()]);
        core.set_temp_compensation(19.125).await.unwrap();
        core.set_temp_compensation(-3.5).await.unwrap();
        assert_eq!(mock.commands_for(99), vec!["T,19.125", "T,-3.5"]);
    }
}
