//! Location capability gate
//!
//! Capabilities can be revoked at runtime, so every check goes back to the
//! host. Nothing here caches a previous answer.

use std::sync::atomic::{AtomicBool, Ordering};

/// Location access levels the host can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    PreciseLocation,
    ApproximateLocation,
}

/// Host permission lookup
pub trait CapabilityGate: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// True iff precise or approximate access is currently granted
pub fn has_location_capability(gate: &dyn CapabilityGate) -> bool {
    gate.is_granted(Capability::PreciseLocation) || gate.is_granted(Capability::ApproximateLocation)
}

/// Switchable grant set, used by the mock and simulated platforms
pub struct StaticCapabilities {
    precise: AtomicBool,
    approximate: AtomicBool,
}

impl StaticCapabilities {
    pub fn granted() -> Self {
        Self { precise: AtomicBool::new(true), approximate: AtomicBool::new(true) }
    }

    pub fn denied() -> Self {
        Self { precise: AtomicBool::new(false), approximate: AtomicBool::new(false) }
    }

    pub fn set(&self, capability: Capability, granted: bool) {
        match capability {
            Capability::PreciseLocation => self.precise.store(granted, Ordering::SeqCst),
            Capability::ApproximateLocation => self.approximate.store(granted, Ordering::SeqCst),
        }
    }

    pub fn revoke_all(&self) {
        self.set(Capability::PreciseLocation, false);
        self.set(Capability::ApproximateLocation, false);
    }
}

impl CapabilityGate for StaticCapabilities {
    fn is_granted(&self, capability: Capability) -> bool {
        match capability {
            Capability::PreciseLocation => self.precise.load(Ordering::SeqCst),
            Capability::ApproximateLocation => self.approximate.load(Ordering::SeqCst),
        }
    }
}
