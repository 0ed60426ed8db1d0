//! Output parameters (measurement channels) of the conductivity probe.
//!
//! The probe can report up to four values per reading. Which ones, and in
//! what order, is decided by the probe: the host learns the order from
//! `O,?` and must decode the comma-separated reading positionally against it.

use ezo_core::{EzoError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One measurement channel the probe can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputParameter {
    /// Electrical conductivity (µS/cm).
    #[serde(rename = "EC")]
    Ec,
    /// Total dissolved solids (ppm).
    #[serde(rename = "TDS")]
    Tds,
    /// Salinity (PSU).
    #[serde(rename = "S")]
    Salinity,
    /// Specific gravity of sea water.
    #[serde(rename = "SG")]
    SpecificGravity,
}

impl OutputParameter {
    /// Every channel, in the order `init` enables them.
    pub const ALL: [OutputParameter; 4] = [
        OutputParameter::Ec,
        OutputParameter::Tds,
        OutputParameter::Salinity,
        OutputParameter::SpecificGravity,
    ];

    /// Protocol token, as used in `O,<token>,<0|1>` and `?O,...` replies.
    pub fn token(self) -> &'static str {
        match self {
            OutputParameter::Ec => "EC",
            OutputParameter::Tds => "TDS",
            OutputParameter::Salinity => "S",
            OutputParameter::SpecificGravity => "SG",
        }
    }

    /// Inverse of [`OutputParameter::token`]. Case sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "EC" => Some(OutputParameter::Ec),
            "TDS" => Some(OutputParameter::Tds),
            "S" => Some(OutputParameter::Salinity),
            "SG" => Some(OutputParameter::SpecificGravity),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for OutputParameter {
    type Err = EzoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_token(s).ok_or_else(|| {
            EzoError::validation(format!(
                "Unrecognized output parameter '{s}'. Valid values: EC, TDS, S, SG"
            ))
        })
    }
}

/// Channels the probe currently reports, in the probe's reporting order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputParameterSet(Vec<OutputParameter>);

impl OutputParameterSet {
    /// Set in the given order.
    pub fn new(params: Vec<OutputParameter>) -> Self {
        Self(params)
    }

    /// Parse the CSV token list from an `?O,...` reply.
    pub fn from_csv(csv: &str) -> Result<Self> {
        csv.split(',')
            .enumerate()
            .map(|(index, token)| {
                OutputParameter::from_token(token).ok_or_else(|| {
                    EzoError::validation(format!(
                        "Unable to parse output param '{token}' at index {index}. Raw string: {csv}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Number of enabled channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no channel is enabled.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `param` is enabled.
    pub fn contains(&self, param: OutputParameter) -> bool {
        self.0.contains(&param)
    }

    /// Channels in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = OutputParameter> + '_ {
        self.0.iter().copied()
    }

    /// Channels in reporting order, as a slice.
    pub fn as_slice(&self) -> &[OutputParameter] {
        &self.0
    }

    /// Decode a raw multi-value reading positionally against this order.
    ///
    /// The number of comma-separated values must equal the number of
    /// enabled channels; anything else means host and probe disagree on
    /// the channel order and the reading is rejected.
    pub fn decode_reading(&self, raw: &str) -> Result<MeasurementSet> {
        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != self.len() {
            return Err(EzoError::validation(format!(
                "Output param count mis-match. Output params: {:?}, data values: {:?}, raw string: {raw}",
                self.0, fields
            )));
        }

        let values = self
            .iter()
            .zip(fields)
            .map(|(param, text)| {
                text.trim()
                    .parse::<f32>()
                    .map(|v| (param, v))
                    .map_err(|e| EzoError::parse("R", raw, format!("{param} value {text:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MeasurementSet(values))
    }
}

impl From<Vec<OutputParameter>> for OutputParameterSet {
    fn from(params: Vec<OutputParameter>) -> Self {
        Self(params)
    }
}

/// Values of one reading, keyed by channel, in the probe's reporting order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSet(Vec<(OutputParameter, f32)>);

impl MeasurementSet {
    /// Value of `param`, if it was part of the reading.
    pub fn get(&self, param: OutputParameter) -> Option<f32> {
        self.0.iter().find(|(p, _)| *p == param).map(|(_, v)| *v)
    }

    /// Number of values in the reading.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a reading with no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Channels of the reading in reporting order.
    pub fn parameters(&self) -> impl Iterator<Item = OutputParameter> + '_ {
        self.0.iter().map(|(p, _)| *p)
    }
}
