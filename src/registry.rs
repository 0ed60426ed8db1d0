//! Probe registry.
//!
//! Builds probe drivers from [`EzoConfig`] on one shared transport and keeps
//! them by id. Generic code gets probes as `Arc<dyn Sensor>`; code that needs
//! family-specific operations (calibration, output channels) uses the typed
//! accessors.

use crate::config::{EzoConfig, ProbeDefinition, ProbeKind};
use anyhow::{anyhow, Context, Result};
use ezo_core::{Bus, Device, DynTransport, Sensor};
use ezo_driver_conductivity::ConductivityProbe;
use ezo_driver_ph::PhProbe;
use std::collections::HashMap;
use std::sync::Arc;

/// Driver instance held by the registry.
#[derive(Clone)]
enum ProbeDriver {
    Ph(Arc<PhProbe>),
    Conductivity(Arc<ConductivityProbe>),
}

impl ProbeDriver {
    fn sensor(&self) -> Arc<dyn Sensor> {
        match self {
            ProbeDriver::Ph(probe) => probe.clone() as Arc<dyn Sensor>,
            ProbeDriver::Conductivity(probe) => probe.clone() as Arc<dyn Sensor>,
        }
    }
}

struct RegisteredProbe {
    definition: ProbeDefinition,
    driver: ProbeDriver,
}

/// Registry of configured probes.
pub struct ProbeRegistry {
    probes: HashMap<String, RegisteredProbe>,
    /// Probe ids in configuration order
    order: Vec<String>,
}

impl ProbeRegistry {
    /// Validate `config` and build a driver for every enabled probe.
    ///
    /// With `bus.serialize_transactions` set, every probe shares the bus
    /// guard; otherwise each probe only serializes its own transactions.
    pub fn from_config(config: &EzoConfig, transport: DynTransport) -> Result<Self> {
        config
            .validate()
            .context("Probe configuration validation failed")?;

        let bus = Bus::new(transport);
        let mut probes = HashMap::new();
        let mut order = Vec::new();

        for definition in config.enabled_probes() {
            let device = if config.bus.serialize_transactions {
                bus.device(definition.address)
            } else {
                Device::new(bus.transport().clone(), definition.address)
            };

            let driver = match definition.kind {
                ProbeKind::Ph => ProbeDriver::Ph(Arc::new(PhProbe::new(device))),
                ProbeKind::Conductivity => ProbeDriver::Conductivity(Arc::new(
                    ConductivityProbe::new(device, definition.default_measurement()),
                )),
            };

            tracing::debug!(
                probe = %definition.id,
                kind = %definition.kind,
                address = definition.address,
                "Registered probe"
            );
            order.push(definition.id.clone());
            probes.insert(
                definition.id.clone(),
                RegisteredProbe {
                    definition: definition.clone(),
                    driver,
                },
            );
        }

        tracing::info!(count = order.len(), "Probe registry created");
        Ok(Self { probes, order })
    }

    /// Run `Sensor::init` on every probe configured with `initialize = true`,
    /// in configuration order. Stops at the first failure.
    pub async fn initialize_all(&self) -> Result<()> {
        for id in &self.order {
            let Some(probe) = self.probes.get(id) else {
                continue;
            };
            if !probe.definition.initialize {
                tracing::debug!(probe = %id, "Skipping initialization");
                continue;
            }
            probe
                .driver
                .sensor()
                .init()
                .await
                .with_context(|| format!("Failed to initialize probe '{id}'"))?;
            tracing::info!(probe = %id, kind = %probe.definition.kind, "Probe initialized");
        }
        Ok(())
    }

    /// Probe ids in configuration order.
    pub fn ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Get a probe through the shared capability set.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Sensor>> {
        self.probes.get(id).map(|p| p.driver.sensor())
    }

    /// Get a probe, failing with a descriptive error if it is not registered.
    pub fn require(&self, id: &str) -> Result<Arc<dyn Sensor>> {
        self.get(id)
            .ok_or_else(|| anyhow!("Probe '{id}' is not registered"))
    }

    /// Get a pH probe by id.
    pub fn ph(&self, id: &str) -> Option<Arc<PhProbe>> {
        match &self.probes.get(id)?.driver {
            ProbeDriver::Ph(probe) => Some(probe.clone()),
            ProbeDriver::Conductivity(_) => None,
        }
    }

    /// Get a conductivity probe by id.
    pub fn conductivity(&self, id: &str) -> Option<Arc<ConductivityProbe>> {
        match &self.probes.get(id)?.driver {
            ProbeDriver::Conductivity(probe) => Some(probe.clone()),
            ProbeDriver::Ph(_) => None,
        }
    }

    /// Check if a probe is registered
    pub fn contains(&self, id: &str) -> bool {
        self.probes.contains_key(id)
    }

    /// Number of registered probes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("probes", &self.order)
            .finish()
    }
}
