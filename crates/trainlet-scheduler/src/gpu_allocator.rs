//! GPU reservation and release

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use trainlet_core::TrainletResult;
use trainlet_store::ResourceStore;

/// Reserves and releases GPU indices against an agent's pool.
///
/// Reservation is all-or-nothing and happens once, at run creation; release
/// is idempotent and happens at run finalization. Both are store-level
/// atomic operations — this type is the seam callers go through, with the
/// allocation logging.
pub struct GpuAllocator {
    store: Arc<dyn ResourceStore>,
}

impl GpuAllocator {
    /// Create an allocator over a resource store
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Reserve `indices` for `agent_id`.
    ///
    /// Fails without reserving anything if any index is already held or is
    /// not part of the agent's pool.
    pub fn reserve(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()> {
        if indices.is_empty() {
            return Ok(());
        }

        self.store.reserve_gpus(agent_id, indices)?;
        info!(agent_id = %agent_id, gpus = ?indices, "Allocated GPUs");
        Ok(())
    }

    /// Release `indices` for `agent_id`.
    ///
    /// Safe to call with indices that are already free or were never
    /// reserved; called unconditionally on every terminal transition.
    pub fn release(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()> {
        if indices.is_empty() {
            return Ok(());
        }

        self.store.release_gpus(agent_id, indices)?;
        debug!(agent_id = %agent_id, gpus = ?indices, "Released GPUs");
        Ok(())
    }
}
