//! Dequeue logic

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use trainlet_core::{RunClaim, TrainletResult};
use trainlet_store::ResourceStore;

/// Selects and claims the next eligible run for an agent.
///
/// Selection order and the atomicity of the queued→running transition are
/// the store's contract; this type adds the dequeue logging and gives the
/// agent runtime a single seam for claiming work.
pub struct Scheduler {
    store: Arc<dyn ResourceStore>,
}

impl Scheduler {
    /// Create a scheduler over a resource store
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Claim the next queued run for `agent_id`.
    ///
    /// Returns `Ok(None)` when no eligible run exists; the caller uses this
    /// to drive its idle backoff.
    pub fn claim_next(&self, agent_id: Uuid) -> TrainletResult<Option<RunClaim>> {
        let claim = self.store.claim_next_queued_run(agent_id)?;

        if let Some(claim) = &claim {
            info!(
                run_id = %claim.run_id,
                name = %claim.run_name,
                gpus = ?claim.gpu_indices,
                "Dequeued run"
            );
        }

        Ok(claim)
    }
}
