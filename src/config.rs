//! Configuration System using Figment
//!
//! Strongly-typed configuration for the probe registry. Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with `EZO_DAQ_`, nested keys split on `__`)
//!
//! # Example
//! ```no_run
//! use ezo_daq::config::EzoConfig;
//!
//! let config = EzoConfig::load_from("config/ezo.toml")?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), ezo_daq::config::ConfigError>(())
//! ```

use ezo_driver_conductivity::OutputParameter;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "EZO_DAQ_";

/// Log levels accepted in `application.log_level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Valid 7-bit bus addresses.
pub const ADDRESS_RANGE: std::ops::RangeInclusive<u8> = 1..=127;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or environment could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration loaded but is not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EzoConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Shared bus settings
    #[serde(default)]
    pub bus: BusConfig,
    /// Probe definitions
    #[serde(default)]
    pub probes: Vec<ProbeDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Serialize every probe's transactions behind one bus-wide guard.
    ///
    /// When disabled each probe only serializes its own transactions.
    #[serde(default = "default_true")]
    pub serialize_transactions: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            serialize_transactions: true,
        }
    }
}

/// Probe family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// pH probe
    Ph,
    /// Conductivity / TDS / salinity probe
    Conductivity,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Ph => f.write_str("ph"),
            ProbeKind::Conductivity => f.write_str("conductivity"),
        }
    }
}

/// Probe definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeDefinition {
    /// Unique probe identifier
    pub id: String,
    /// Probe family
    pub kind: ProbeKind,
    /// Bus address of the probe
    pub address: u8,
    /// Whether this probe is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether `Sensor::init` runs when the registry is initialized
    #[serde(default = "default_true")]
    pub initialize: bool,
    /// Channel returned by `value()` (conductivity probes only, defaults to EC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_measurement: Option<OutputParameter>,
}

impl ProbeDefinition {
    /// Default measurement channel, falling back to EC.
    pub fn default_measurement(&self) -> OutputParameter {
        self.default_measurement.unwrap_or(OutputParameter::Ec)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl EzoConfig {
    /// Load configuration from a specific file path
    ///
    /// Environment variables can override configuration with prefix `EZO_DAQ_`.
    /// Example: `EZO_DAQ_APPLICATION__LOG_LEVEL=debug`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load and validate in one step.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from(path)?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let mut ids = HashSet::new();
        let mut addresses = HashSet::new();
        for probe in &self.probes {
            if !ids.insert(probe.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate probe ID: {}",
                    probe.id
                )));
            }

            if !ADDRESS_RANGE.contains(&probe.address) {
                return Err(ConfigError::Invalid(format!(
                    "Probe '{}' has invalid address {}. Must be 1-127",
                    probe.id, probe.address
                )));
            }

            if probe.enabled && !addresses.insert(probe.address) {
                return Err(ConfigError::Invalid(format!(
                    "Probe '{}' reuses address {} of another enabled probe",
                    probe.id, probe.address
                )));
            }

            if probe.default_measurement.is_some() && probe.kind != ProbeKind::Conductivity {
                return Err(ConfigError::Invalid(format!(
                    "Probe '{}' sets default_measurement but is a {} probe",
                    probe.id, probe.kind
                )));
            }
        }

        Ok(())
    }

    /// Get all enabled probes, in configuration order
    pub fn enabled_probes(&self) -> impl Iterator<Item = &ProbeDefinition> {
        self.probes.iter().filter(|probe| probe.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(id: &str, kind: ProbeKind, address: u8) -> ProbeDefinition {
        ProbeDefinition {
            id: id.to_string(),
            kind,
            address,
            enabled: true,
            initialize: true,
            default_measurement: None,
        }
    }

    fn config(probes: Vec<ProbeDefinition>) -> EzoConfig {
        EzoConfig {
            application: ApplicationConfig {
                name: "Test".to_string(),
                log_level: "info".to_string(),
            },
            bus: BusConfig::default(),
            probes,
        }
    }

    #[test]
    fn test_config_validation() {
        let config = config(vec![
            probe("tank_ph", ProbeKind::Ph, 99),
            probe("tank_ec", ProbeKind::Conductivity, 100),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = config(vec![]);
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_probe_ids() {
        let config = config(vec![
            probe("tank", ProbeKind::Ph, 99),
            probe("tank", ProbeKind::Conductivity, 100),
        ]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate probe ID: tank"));
    }

    #[test]
    fn test_duplicate_addresses_only_among_enabled() {
        let mut spare = probe("spare_ph", ProbeKind::Ph, 99);
        let config_a = config(vec![probe("tank_ph", ProbeKind::Ph, 99), spare.clone()]);
        assert!(config_a.validate().is_err());

        spare.enabled = false;
        let config_b = config(vec![probe("tank_ph", ProbeKind::Ph, 99), spare]);
        assert!(config_b.validate().is_ok());
    }

    #[test]
    fn test_address_range() {
        for address in [0, 128, 255] {
            assert!(config(vec![probe("p", ProbeKind::Ph, address)])
                .validate()
                .is_err());
        }
        for address in [1, 127] {
            assert!(config(vec![probe("p", ProbeKind::Ph, address)])
                .validate()
                .is_ok());
        }
    }

    #[test]
    fn test_default_measurement_only_for_conductivity() {
        let mut ph = probe("tank_ph", ProbeKind::Ph, 99);
        ph.default_measurement = Some(OutputParameter::Tds);
        assert!(config(vec![ph]).validate().is_err());

        let mut ec = probe("tank_ec", ProbeKind::Conductivity, 100);
        ec.default_measurement = Some(OutputParameter::Tds);
        assert_eq!(ec.default_measurement(), OutputParameter::Tds);
        assert!(config(vec![ec]).validate().is_ok());
    }

    #[test]
    fn test_default_measurement_falls_back_to_ec() {
        assert_eq!(
            probe("tank_ec", ProbeKind::Conductivity, 100).default_measurement(),
            OutputParameter::Ec
        );
    }

    #[test]
    fn test_enabled_probes_keep_order() {
        let mut disabled = probe("b", ProbeKind::Ph, 98);
        disabled.enabled = false;
        let config = config(vec![
            probe("c", ProbeKind::Conductivity, 100),
            disabled,
            probe("a", ProbeKind::Ph, 99),
        ]);
        let ids: Vec<_> = config.enabled_probes().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_toml_defaults() {
        let text = r#"
            [application]
            name = "ezo"

            [[probes]]
            id = "tank_ec"
            kind = "conductivity"
            address = 100
            default_measurement = "S"
        "#;
        let config: EzoConfig = toml::from_str(text).unwrap();
        assert_eq!(config.application.log_level, "info");
        assert!(config.bus.serialize_transactions);
        let probe = &config.probes[0];
        assert!(probe.enabled);
        assert!(probe.initialize);
        assert_eq!(probe.default_measurement(), OutputParameter::Salinity);
    }

    #[test]
    fn test_unknown_probe_kind_fails_to_deserialize() {
        let text = r#"
            [application]
            name = "ezo"

            [[probes]]
            id = "tank_orp"
            kind = "orp"
            address = 98
        "#;
        assert!(toml::from_str::<EzoConfig>(text).is_err());
    }
}
