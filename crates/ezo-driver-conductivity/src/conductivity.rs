//! Conductivity Probe Driver
//!
//! Protocol Overview:
//! - Reading: `R` returns one comma-separated value per enabled output parameter,
//!   in the order reported by `O,?` (e.g. `?O,EC,TDS` -> `1413,707`)
//! - Output parameters: `O,?` / `O,<EC|TDS|S|SG>,<0|1>`, toggled one channel at a time
//! - Probe constant: `K,?` / `K,<k>` with 0.1 <= k <= 10
//! - Calibration: `CAL,dry` (2000 ms) or `CAL,<one|low|high>,<µS>` (1500 ms)
//! - Clear calibration: `CAL,clear` (1300 ms)
//!
//! # Channel order
//!
//! The reading is positional, so the driver always fetches the channel order
//! and takes the reading inside the same transaction. Changing the enabled
//! channels also runs as one transaction covering every per-channel toggle.

use crate::output::{MeasurementSet, OutputParameter, OutputParameterSet};
use async_trait::async_trait;
use ezo_core::protocol::READING_SETTLE;
use ezo_core::{
    Command, Device, EzoError, FieldKind, ReplyPattern, Result, Sensor, SensorCore, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// Settle time for the dry calibration point.
pub const DRY_CALIBRATION_SETTLE: Duration = Duration::from_millis(2000);

/// Settle time for the wet calibration points.
pub const CALIBRATION_SETTLE: Duration = Duration::from_millis(1500);

/// Settle time for `CAL,clear` on this probe.
pub const CLEAR_CALIBRATION_SETTLE: Duration = Duration::from_millis(1300);

/// Valid range of the probe constant.
pub const PROBE_TYPE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

const OUTPUT_PARAMETERS_REPLY: ReplyPattern =
    ReplyPattern::new("O", &[("params", FieldKind::Rest)]);

const PROBE_TYPE_REPLY: ReplyPattern = ReplyPattern::new("K", &[("k", FieldKind::Decimal)]);

/// Reference condition used for a calibration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConductivityCalibrationPoint {
    /// Probe in air; no reference value.
    Dry,
    /// Single-point calibration.
    One,
    /// Low end of a two-point calibration.
    Low,
    /// High end of a two-point calibration.
    High,
}

impl ConductivityCalibrationPoint {
    /// Every point.
    pub const ALL: [ConductivityCalibrationPoint; 4] = [
        ConductivityCalibrationPoint::Dry,
        ConductivityCalibrationPoint::One,
        ConductivityCalibrationPoint::Low,
        ConductivityCalibrationPoint::High,
    ];

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ConductivityCalibrationPoint::Dry => "dry",
            ConductivityCalibrationPoint::One => "one",
            ConductivityCalibrationPoint::Low => "low",
            ConductivityCalibrationPoint::High => "high",
        }
    }

    fn command(self, value: f32) -> Command {
        match self {
            ConductivityCalibrationPoint::Dry => Command::new("CAL,dry", DRY_CALIBRATION_SETTLE),
            point => Command::new(
                format!("CAL,{},{}", point.as_str(), value.trunc() as i64),
                CALIBRATION_SETTLE,
            ),
        }
    }
}

impl std::fmt::Display for ConductivityCalibrationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConductivityCalibrationPoint {
    type Err = EzoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                EzoError::validation(format!(
                    "Invalid conductivity calibration point '{s}'. Valid values: dry, one, low, high"
                ))
            })
    }
}

/// Driver for the conductivity / TDS / salinity probe.
#[derive(Debug, Clone)]
pub struct ConductivityProbe {
    core: SensorCore,
    default_measurement: OutputParameter,
}

impl ConductivityProbe {
    /// `default_measurement` is the channel returned by [`Sensor::value`].
    pub fn new(device: Device, default_measurement: OutputParameter) -> Self {
        Self {
            core: SensorCore::new(device).with_clear_calibration_settle(CLEAR_CALIBRATION_SETTLE),
            default_measurement,
        }
    }

    /// Bus address of the probe.
    pub fn address(&self) -> u8 {
        self.core.address()
    }

    /// Channel returned by [`Sensor::value`].
    pub fn default_measurement(&self) -> OutputParameter {
        self.default_measurement
    }

    /// Channels currently enabled, in the probe's reporting order.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn output_parameters(&self) -> Result<OutputParameterSet> {
        let mut tx = self.core.device().begin().await;
        Self::fetch_output_parameters(&mut tx).await
    }

    /// Enable or disable channels, one `O,<token>,<0|1>` round trip each.
    ///
    /// The first failing channel aborts the operation; toggles already
    /// applied stay applied on the probe.
    #[instrument(skip(self, changes), fields(address = self.address()), err)]
    pub async fn set_output_parameters<I>(&self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (OutputParameter, bool)> + Send,
        I::IntoIter: Send,
    {
        let mut tx = self.core.device().begin().await;
        for (param, enabled) in changes {
            let cmd = Command::short(format!("O,{},{}", param.token(), u8::from(enabled)));
            tx.execute(&cmd).await?;
            tracing::debug!(address = tx.address(), %param, enabled, "Output parameter toggled");
        }
        Ok(())
    }

    /// Take a reading and decode it against the current channel order.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn all_values(&self) -> Result<MeasurementSet> {
        let mut tx = self.core.device().begin().await;
        let order = Self::fetch_output_parameters(&mut tx).await?;
        let raw = tx.query(&Command::new("R", READING_SETTLE)).await?;
        order.decode_reading(&raw)
    }

    /// Probe constant (K value).
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn probe_type(&self) -> Result<f32> {
        self.core
            .device()
            .write_read_parse(&Command::short("K,?"), &PROBE_TYPE_REPLY)
            .await?
            .get_f32("k")
    }

    /// Set the probe constant. Values outside [`PROBE_TYPE_RANGE`] are
    /// rejected before anything is written; valid values are sent unrounded.
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn set_probe_type(&self, k: f32) -> Result<()> {
        if !PROBE_TYPE_RANGE.contains(&k) {
            return Err(EzoError::validation(format!(
                "Invalid probe type '{k}'. Must be between 0.1 and 10."
            )));
        }
        self.core
            .device()
            .execute(&Command::short(format!("K,{k}")))
            .await
    }

    /// Calibrate `point`. `value` is the reference conductivity in µS/cm,
    /// truncated to an integer; it is ignored for [`ConductivityCalibrationPoint::Dry`].
    #[instrument(skip(self), fields(address = self.address()), err)]
    pub async fn calibrate(&self, point: ConductivityCalibrationPoint, value: f32) -> Result<()> {
        if point != ConductivityCalibrationPoint::Dry && !value.is_finite() {
            return Err(EzoError::validation(format!(
                "Conductivity calibration value must be finite, got {value}"
            )));
        }
        self.core.device().execute(&point.command(value)).await?;
        tracing::info!(address = self.address(), %point, value, "Conductivity calibration point stored");
        Ok(())
    }

    /// [`ConductivityProbe::calibrate`] with the point given by name.
    pub async fn calibrate_named(&self, point: &str, value: f32) -> Result<()> {
        let point = point.parse::<ConductivityCalibrationPoint>()?;
        self.calibrate(point, value).await
    }

    async fn fetch_output_parameters(tx: &mut Transaction<'_>) -> Result<OutputParameterSet> {
        let fields = tx
            .write_read_parse(&Command::short("O,?"), &OUTPUT_PARAMETERS_REPLY)
            .await?;
        OutputParameterSet::from_csv(fields.get("params")?)
    }
}

#[async_trait]
impl Sensor for ConductivityProbe {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "conductivity"
    }

    /// Enable every output parameter.
    async fn init(&self) -> Result<()> {
        self.set_output_parameters(OutputParameter::ALL.map(|p| (p, true)))
            .await
    }

    /// Value of the default measurement channel.
    async fn value(&self) -> Result<f32> {
        let values = self.all_values().await?;
        values.get(self.default_measurement).ok_or_else(|| {
            EzoError::validation(format!(
                "Default measurement {} is not enabled on the probe",
                self.default_measurement
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezo_core::mock::{MockReply, MockTransport};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Minimal stateful simulation of the probe's output-parameter handling.
    mod sim {
        use super::*;
        use std::sync::Mutex;

        pub struct SimulatedProbe {
            pub enabled: Arc<Mutex<Vec<OutputParameter>>>,
            pub reading: Arc<Mutex<Vec<(OutputParameter, String)>>>,
        }

        impl SimulatedProbe {
            pub fn transport(&self) -> MockTransport {
                let enabled = self.enabled.clone();
                let reading = self.reading.clone();
                MockTransport::with_responder(move |_, cmd| {
                    let mut enabled = enabled.lock().unwrap();
                    match cmd {
                        "O,?" => {
                            let tokens: Vec<_> = enabled.iter().map(|p| p.token()).collect();
                            vec![MockReply::success(format!("?O,{}", tokens.join(",")))]
                        }
                        "R" => {
                            let reading = reading.lock().unwrap();
                            let values: Vec<_> = enabled
                                .iter()
                                .filter_map(|p| {
                                    reading.iter().find(|(q, _)| q == p).map(|(_, v)| v.clone())
                                })
                                .collect();
                            vec![MockReply::success(values.join(","))]
                        }
                        other => {
                            let parts: Vec<_> = other.split(',').collect();
                            match parts.as_slice() {
                                ["O", token, flag] => {
                                    let Some(param) = OutputParameter::from_token(token) else {
                                        return vec![MockReply::DeviceError];
                                    };
                                    enabled.retain(|p| *p != param);
                                    if *flag == "1" {
                                        enabled.push(param);
                                        // Probe reports in its own fixed order.
                                        enabled.sort();
                                    }
                                    vec![MockReply::ok()]
                                }
                                _ => vec![MockReply::ok()],
                            }
                        }
                    }
                })
            }
        }

        pub fn standard() -> SimulatedProbe {
            SimulatedProbe {
                enabled: Arc::new(Mutex::new(OutputParameter::ALL.to_vec())),
                reading: Arc::new(Mutex::new(vec![
                    (OutputParameter::Ec, "1413".to_string()),
                    (OutputParameter::Tds, "707".to_string()),
                    (OutputParameter::Salinity, "0.70".to_string()),
                    (OutputParameter::SpecificGravity, "1.000".to_string()),
                ])),
            }
        }
    }

    fn scripted(replies: &[MockReply]) -> (Arc<MockTransport>, ConductivityProbe) {
        let mock = Arc::new(MockTransport::new());
        for reply in replies {
            mock.push_reply(100, reply.clone());
        }
        let probe = ConductivityProbe::new(Device::new(mock.clone(), 100), OutputParameter::Ec);
        (mock, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn output_parameters_follow_device_order() {
        let (mock, probe) = scripted(&[MockReply::success("?O,EC,TDS,S,SG")]);
        let set = probe.output_parameters().await.unwrap();
        assert_eq!(set.as_slice(), &OutputParameter::ALL);
        assert_eq!(mock.commands_for(100), vec!["O,?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_output_token_fails() {
        let (_, probe) = scripted(&[MockReply::success("?O,EC,PH")]);
        assert!(probe.output_parameters().await.unwrap_err().is_validation());
    }

    #[tokio::test(start_paused = true)]
    async fn all_values_zips_reading_with_order() {
        let (mock, probe) = scripted(&[
            MockReply::success("?O,EC,TDS"),
            MockReply::success("1413,707"),
        ]);
        let values = probe.all_values().await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(OutputParameter::Ec), Some(1413.0));
        assert_eq!(values.get(OutputParameter::Tds), Some(707.0));
        assert_eq!(mock.commands_for(100), vec!["O,?", "R"]);
    }

    #[tokio::test(start_paused = true)]
    async fn all_values_rejects_count_mismatch() {
        let (_, probe) = scripted(&[MockReply::success("?O,EC,TDS"), MockReply::success("1413")]);
        assert!(probe.all_values().await.unwrap_err().is_validation());
    }

    #[tokio::test(start_paused = true)]
    async fn value_returns_default_measurement() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(100, MockReply::success("?O,EC,TDS"));
        mock.push_reply(100, MockReply::success("1413,707"));
        let probe = ConductivityProbe::new(Device::new(mock.clone(), 100), OutputParameter::Tds);

        assert_eq!(probe.value().await.unwrap(), 707.0);
    }

    #[tokio::test(start_paused = true)]
    async fn value_fails_when_default_channel_disabled() {
        let (_, probe) = scripted(&[MockReply::success("?O,TDS"), MockReply::success("707")]);
        assert!(probe.value().await.unwrap_err().is_validation());
    }

    #[tokio::test(start_paused = true)]
    async fn set_output_parameters_toggles_each_channel() {
        let (mock, probe) = scripted(&[MockReply::ok(), MockReply::ok()]);

        let start = Instant::now();
        probe
            .set_output_parameters([(OutputParameter::Ec, true), (OutputParameter::Salinity, false)])
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(600));
        assert_eq!(mock.commands_for(100), vec!["O,EC,1", "O,S,0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn set_output_parameters_aborts_on_first_failure() {
        let (mock, probe) = scripted(&[MockReply::ok(), MockReply::DeviceError, MockReply::ok()]);

        let err = probe
            .set_output_parameters([
                (OutputParameter::Ec, true),
                (OutputParameter::Tds, true),
                (OutputParameter::Salinity, true),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, EzoError::Device { .. }));
        assert_eq!(mock.commands_for(100), vec!["O,EC,1", "O,TDS,1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn output_round_trip_reports_enabled_members() {
        let sim = sim::standard();
        let mock = Arc::new(sim.transport());
        let probe = ConductivityProbe::new(Device::new(mock.clone(), 100), OutputParameter::Ec);

        probe
            .set_output_parameters([
                (OutputParameter::Ec, true),
                (OutputParameter::Tds, false),
                (OutputParameter::Salinity, true),
                (OutputParameter::SpecificGravity, false),
            ])
            .await
            .unwrap();

        let set = probe.output_parameters().await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(OutputParameter::Ec));
        assert!(set.contains(OutputParameter::Salinity));

        let values = probe.all_values().await.unwrap();
        assert_eq!(values.get(OutputParameter::Ec), Some(1413.0));
        assert_eq!(values.get(OutputParameter::Salinity), Some(0.70));
        assert_eq!(values.get(OutputParameter::Tds), None);
    }

    #[tokio::test(start_paused = true)]
    async fn init_enables_every_channel() {
        let sim = sim::standard();
        sim.enabled.lock().unwrap().clear();
        let mock = Arc::new(sim.transport());
        let probe = ConductivityProbe::new(Device::new(mock.clone(), 100), OutputParameter::Ec);

        probe.init().await.unwrap();

        assert_eq!(
            mock.commands_for(100),
            vec!["O,EC,1", "O,TDS,1", "O,S,1", "O,SG,1"]
        );
        assert_eq!(probe.output_parameters().await.unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_type_get_and_set() {
        let (mock, probe) = scripted(&[MockReply::success("?K,0.66"), MockReply::ok()]);
        assert!((probe.probe_type().await.unwrap() - 0.66).abs() < 1e-6);
        probe.set_probe_type(1.0).await.unwrap();
        assert_eq!(mock.commands_for(100), vec!["K,?", "K,1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_type_is_sent_unrounded() {
        let (mock, probe) = scripted(&[MockReply::ok()]);
        probe.set_probe_type(0.666).await.unwrap();
        assert_eq!(mock.commands_for(100), vec!["K,0.666"]);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_type_bounds_are_inclusive() {
        let (mock, probe) = scripted(&[MockReply::ok(), MockReply::ok(), MockReply::ok()]);
        for k in [0.1, 5.0, 10.0] {
            probe.set_probe_type(k).await.unwrap();
        }
        assert_eq!(mock.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_type_out_of_range_issues_no_write() {
        let (mock, probe) = scripted(&[]);
        for k in [0.0, 0.09, 10.01, -1.0, f32::NAN, f32::INFINITY] {
            let err = probe.set_probe_type(k).await.unwrap_err();
            assert!(err.is_validation(), "k = {k} should be rejected");
        }
        assert!(mock.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dry_calibration_has_no_value_and_long_settle() {
        let (mock, probe) = scripted(&[MockReply::ok()]);
        let start = Instant::now();
        probe
            .calibrate(ConductivityCalibrationPoint::Dry, 12880.0)
            .await
            .unwrap();
        assert!(start.elapsed() >= DRY_CALIBRATION_SETTLE);
        assert_eq!(mock.commands_for(100), vec!["CAL,dry"]);
    }

    #[tokio::test(start_paused = true)]
    async fn wet_calibration_truncates_value() {
        let (mock, probe) = scripted(&[MockReply::ok(), MockReply::ok(), MockReply::ok()]);
        let start = Instant::now();
        probe
            .calibrate(ConductivityCalibrationPoint::Low, 12880.9)
            .await
            .unwrap();
        assert!(start.elapsed() >= CALIBRATION_SETTLE);
        probe.calibrate_named("high", 80000.0).await.unwrap();
        probe.calibrate_named("one", 1413.2).await.unwrap();
        assert_eq!(
            mock.commands_for(100),
            vec!["CAL,low,12880", "CAL,high,80000", "CAL,one,1413"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn named_calibration_rejects_unknown_points() {
        let (mock, probe) = scripted(&[]);
        for bad in ["mid", "DRY", "two", ""] {
            assert!(probe.calibrate_named(bad, 1.0).await.unwrap_err().is_validation());
        }
        assert!(mock.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_calibration_uses_longer_settle() {
        let (mock, probe) = scripted(&[MockReply::ok()]);
        let start = Instant::now();
        probe.clear_calibration().await.unwrap();
        assert!(start.elapsed() >= CLEAR_CALIBRATION_SETTLE);
        assert_eq!(mock.commands_for(100), vec!["CAL,clear"]);
    }
}
