//! Bus Transport Abstractions
//!
//! The physical bus is an external collaborator. This module only defines
//! the addressable read/write contract the protocol engine needs, plus the
//! [`Bus`] helper that lets several probes on one transport share a single
//! exclusive-access guard.
//!
//! # Types
//!
//! - [`Transport`]: addressable byte write/read primitive
//! - [`DynTransport`]: type-erased shared transport
//! - [`BusGuard`]: exclusive-access guard shared by one or more device handles
//! - [`Bus`]: a transport plus one guard, handing out serialized device handles
//!
//! # Example
//!
//! ```rust,ignore
//! use ezo_core::transport::Bus;
//!
//! let bus = Bus::new(transport);
//! let ph = bus.device(99);
//! let ec = bus.device(100);
//! // Transactions on `ph` and `ec` can no longer interleave on the wire.
//! ```

use crate::protocol::Device;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Addressable byte read/write over the physical bus.
///
/// Implementations must be safe to call from several tasks. They are not
/// required to provide any ordering across calls: request/response ordering
/// is the responsibility of the guard held by [`Device`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `bytes` to the device at `address`.
    async fn write(&self, address: u8, bytes: &[u8]) -> std::io::Result<()>;

    /// Fill `buffer` with a reply from the device at `address`.
    async fn read(&self, address: u8, buffer: &mut [u8]) -> std::io::Result<()>;
}

/// Type-erased shared transport.
pub type DynTransport = Arc<dyn Transport>;

/// Exclusive-access guard held for the full duration of a transaction.
pub type BusGuard = Arc<Mutex<()>>;

/// Create a fresh, unshared guard.
pub fn new_guard() -> BusGuard {
    Arc::new(Mutex::new(()))
}

/// A transport together with one guard shared by every device on it.
///
/// Handles built through [`Bus::device`] serialize their transactions
/// against each other, not just against themselves.
#[derive(Clone)]
pub struct Bus {
    transport: DynTransport,
    guard: BusGuard,
}

impl Bus {
    /// Bus over `transport` with a fresh guard.
    pub fn new(transport: DynTransport) -> Self {
        Self {
            transport,
            guard: new_guard(),
        }
    }

    /// Build a device handle at `address` sharing this bus's guard.
    pub fn device(&self, address: u8) -> Device {
        Device::with_guard(self.transport.clone(), address, self.guard.clone())
    }

    /// The underlying transport.
    pub fn transport(&self) -> &DynTransport {
        &self.transport
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").finish_non_exhaustive()
    }
}
