//! pH Probe Driver
//!
//! Protocol Overview:
//! - Reading: `R` returns the pH value itself as the payload (e.g. `7.00`)
//! - Slope: `SLOPE` returns `?SLOPE,<acid %>,<base %>` relative to an ideal probe
//! - Calibration: `CAL,<high|mid|low>,<pH>` with a 1600 ms settle time
//! - Clear calibration: `CAL,clear` with the base 300 ms settle time
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use ezo_driver_ph::{PhCalibrationPoint, PhProbe};
//!
//! let probe = PhProbe::new(bus.device(99));
//! probe.calibrate(PhCalibrationPoint::Mid, 7.00).await?;
//! let ph = probe.value().await?;
//! ```

use async_trait::async_trait;
use ezo_core::response::parse_f32;
use ezo_core::{Command, Device, EzoError, FieldKind, ReplyPattern, Result, Sensor, SensorCore};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// Settle time for a calibration point.
pub const CALIBRATION_SETTLE: Duration = Duration::from_millis(1600);

const SLOPE_REPLY: ReplyPattern = ReplyPattern::new(
    "SLOPE",
    &[
        ("acid_slope", FieldKind::Decimal),
        ("base_slope", FieldKind::Decimal),
    ],
);

/// Reply to `SLOPE`: how closely the probe matches an ideal one, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSlope {
    /// Acid-side slope, percent.
    pub acid_slope: f32,
    /// Base-side slope, percent.
    pub base_slope: f32,
}

/// Reference solution used for a calibration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhCalibrationPoint {
    /// Typically pH 10.
    High,
    /// Typically pH 7. Storing it clears the other points on the probe.
    Mid,
    /// Typically pH 4.
    Low,
}

impl PhCalibrationPoint {
    /// Every point, in the order the probe expects them to be stored.
    pub const ALL: [PhCalibrationPoint; 3] = [
        PhCalibrationPoint::High,
        PhCalibrationPoint::Mid,
        PhCalibrationPoint::Low,
    ];

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            PhCalibrationPoint::High => "high",
            PhCalibrationPoint::Mid => "mid",
            PhCalibrationPoint::Low => "low",
        }
    }
}

impl std::fmt::Display for PhCalibrationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhCalibrationPoint {
    type Err = EzoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                EzoError::validation(format!(
                    "Invalid pH calibration point '{s}'. Valid values: high, mid, low"
                ))
            })
    }
}

/// Driver for the pH probe.
#[derive(Debug, Clone)]
pub struct PhProbe {
    core: SensorCore,
}

impl PhProbe {
    /// Driver for the probe behind `device`.
    pub fn new(device: Device) -> Self {
        Self {
            core: SensorCore::new(device),
        }
    }

    /// Bus address of the probe.
    pub fn address(&self) -> u8 {
        self.core.address()
    }

    /// Acid and base slopes of the current calibration.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn calibration_slope(&self) -> Result<CalibrationSlope> {
        let fields = self
            .core
            .device()
            .write_read_parse(&Command::short("SLOPE"), &SLOPE_REPLY)
            .await?;
        Ok(CalibrationSlope {
            acid_slope: fields.get_f32("acid_slope")?,
            base_slope: fields.get_f32("base_slope")?,
        })
    }

    /// Calibrate `point` against a reference solution of pH `value`.
    ///
    /// `value` is sent as given, without rounding.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn calibrate(&self, point: PhCalibrationPoint, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(EzoError::validation(format!(
                "pH calibration value must be finite, got {value}"
            )));
        }
        let cmd = Command::new(format!("CAL,{point},{value}"), CALIBRATION_SETTLE);
        self.core.device().execute(&cmd).await?;
        tracing::info!(address = self.address(), %point, value, "pH calibration point stored");
        Ok(())
    }

    /// [`PhProbe::calibrate`] with the point given by name.
    pub async fn calibrate_named(&self, point: &str, value: f32) -> Result<()> {
        let point = point.parse::<PhCalibrationPoint>()?;
        self.calibrate(point, value).await
    }
}

#[async_trait]
impl Sensor for PhProbe {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "ph"
    }

    /// The raw reading payload is the pH value.
    async fn value(&self) -> Result<f32> {
        let raw = self.core.raw_value().await?;
        parse_f32("R", &raw)
    }
}
