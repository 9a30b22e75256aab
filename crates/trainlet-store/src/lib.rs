//! trainlet-store: Resource store for trainlet
//!
//! The store is the single source of truth for cross-process coordination:
//! run claims, GPU reservations, and heartbeats all go through it. Every
//! operation on the [`ResourceStore`] trait is atomic — implementations must
//! never expose a half-applied claim or reservation to a concurrent caller.

pub mod memory;

pub use memory::MemoryStore;

use std::path::PathBuf;
use uuid::Uuid;

use trainlet_core::{AgentRecord, GpuRecord, Job, Run, RunClaim, RunState, TrainletResult};

/// Transactional record store for runs, jobs, agents, and GPUs.
///
/// Implementations are called from both async handlers and the blocking
/// training thread, so the interface is synchronous; operations are expected
/// to be short. Each method is a single atomic unit: in particular
/// [`claim_next_queued_run`](ResourceStore::claim_next_queued_run) has
/// single-winner semantics under concurrent callers, and
/// [`submit_run`](ResourceStore::submit_run) either reserves and inserts
/// everything or mutates nothing.
pub trait ResourceStore: Send + Sync {
    /// Reserve the run's GPU set and insert the Run+Job pair atomically.
    ///
    /// Fails with `AllocationConflict` (index already held) or `Gpu`
    /// (index not in the agent's pool) without mutating any record.
    fn submit_run(&self, run: Run, job: Job) -> TrainletResult<Uuid>;

    /// Select and claim the next eligible run for an agent.
    ///
    /// Eligible runs are queued and assigned to `agent_id`; selection is by
    /// priority descending, then enqueue time ascending. The queued→running
    /// transition, `started_at`, and the job's `dequeued_at` stamp are
    /// applied in the same atomic operation. Returns `Ok(None)` when the
    /// queue is empty for this agent — a benign miss, not an error.
    fn claim_next_queued_run(&self, agent_id: Uuid) -> TrainletResult<Option<RunClaim>>;

    /// Reserve GPU indices against an agent's pool, all-or-nothing.
    fn reserve_gpus(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()>;

    /// Release GPU indices. Idempotent: releasing a free or unknown index
    /// is a no-op, never an error.
    fn release_gpus(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()>;

    /// Transition a run's state, stamping `finished_at` on terminal
    /// transitions. A request against an already-terminal run is a no-op
    /// that returns the stored state unchanged.
    fn set_run_state(&self, run_id: Uuid, state: RunState) -> TrainletResult<RunState>;

    /// Persist the last completed epoch (1-based) on the run record.
    fn update_epoch(&self, run_id: Uuid, epoch: u32) -> TrainletResult<bool>;

    /// Persist an executor failure message on the run's job.
    fn set_job_error(&self, run_id: Uuid, message: &str) -> TrainletResult<bool>;

    /// Create or update an agent record, refreshing its heartbeat.
    fn register_agent(&self, agent: AgentRecord) -> TrainletResult<()>;

    /// Create or update a GPU record, preserving its allocation flag.
    fn upsert_gpu(&self, gpu: GpuRecord) -> TrainletResult<()>;

    /// Refresh an agent's last-heartbeat timestamp.
    fn update_agent_heartbeat(&self, agent_id: Uuid) -> TrainletResult<bool>;

    /// Refresh a GPU's last-seen timestamp.
    fn update_gpu_heartbeat(&self, agent_id: Uuid, index: u32) -> TrainletResult<bool>;

    /// Resolve a run id to its event log directory.
    fn run_log_dir(&self, run_id: Uuid) -> TrainletResult<Option<PathBuf>>;

    /// Fetch a run record.
    fn get_run(&self, run_id: Uuid) -> TrainletResult<Option<Run>>;

    /// Fetch the job wrapping a run.
    fn get_job(&self, run_id: Uuid) -> TrainletResult<Option<Job>>;

    /// Fetch an agent record.
    fn get_agent(&self, agent_id: Uuid) -> TrainletResult<Option<AgentRecord>>;

    /// Fetch a GPU record.
    fn get_gpu(&self, agent_id: Uuid, index: u32) -> TrainletResult<Option<GpuRecord>>;
}
