//! At most one live coordinator per process.
//!
//! The composition root creates one [`InstanceSlot`] and hands it to
//! whatever builds the coordinator. Claiming an occupied slot fails fast
//! with [`MembershipError::AlreadyActive`] instead of letting two
//! coordinators compete for the same connection signals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::MembershipError;

/// A single-occupancy slot. Clones share the same occupancy flag.
#[derive(Debug, Clone, Default)]
pub struct InstanceSlot {
    live: Arc<AtomicBool>,
}

impl InstanceSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot. The slot is freed when the returned guard (or the
    /// coordinator that owns it) is dropped.
    pub fn claim(&self) -> Result<InstanceGuard, MembershipError> {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MembershipError::AlreadyActive)?;
        Ok(InstanceGuard {
            live: Arc::clone(&self.live),
        })
    }

    /// Returns `true` while a guard for this slot is alive.
    pub fn is_claimed(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns its slot. Required to build a coordinator.
#[derive(Debug)]
pub struct InstanceGuard {
    live: Arc<AtomicBool>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
    }
}
