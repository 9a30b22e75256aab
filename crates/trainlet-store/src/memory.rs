//! In-memory reference implementation of the resource store

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use trainlet_core::{
    AgentRecord, GpuRecord, Job, Run, RunClaim, RunState, TrainletError, TrainletResult,
};

use crate::ResourceStore;

#[derive(Default)]
struct StoreState {
    runs: HashMap<Uuid, Run>,
    /// Jobs indexed by run id (1:1)
    jobs: HashMap<Uuid, Job>,
    agents: HashMap<Uuid, AgentRecord>,
    gpus: HashMap<(Uuid, u32), GpuRecord>,
}

impl StoreState {
    /// Check a reservation without applying it. Called under the write
    /// guard so the check and the set cannot be interleaved with another
    /// reserve.
    fn check_reservation(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()> {
        for idx in indices {
            match self.gpus.get(&(agent_id, *idx)) {
                None => {
                    return Err(TrainletError::Gpu(format!(
                        "GPU {} is not in agent {}'s pool",
                        idx, agent_id
                    )));
                }
                Some(gpu) if gpu.allocated => {
                    return Err(TrainletError::AllocationConflict(format!(
                        "GPU {} already allocated",
                        idx
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn apply_reservation(&mut self, agent_id: Uuid, indices: &[u32]) {
        for idx in indices {
            if let Some(gpu) = self.gpus.get_mut(&(agent_id, *idx)) {
                gpu.allocated = true;
            }
        }
    }
}

/// Store implementation backed by process memory.
///
/// All state lives behind one `RwLock`; every mutating operation takes the
/// write guard for its whole duration, which is what makes check-then-set
/// sequences (claims, reservations) atomic and single-winner.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceStore for MemoryStore {
    fn submit_run(&self, run: Run, job: Job) -> TrainletResult<Uuid> {
        if job.run_id != run.id {
            return Err(TrainletError::Store(format!(
                "Job {} does not reference run {}",
                job.id, run.id
            )));
        }

        let mut state = self.state.write();

        if let Some(agent_id) = run.agent_id {
            state.check_reservation(agent_id, &run.gpu_indices)?;
            state.apply_reservation(agent_id, &run.gpu_indices);
        }

        let run_id = run.id;
        info!(
            run_id = %run_id,
            name = %run.name,
            priority = job.priority,
            gpus = ?run.gpu_indices,
            "Run submitted"
        );

        state.jobs.insert(run_id, job);
        state.runs.insert(run_id, run);

        Ok(run_id)
    }

    fn claim_next_queued_run(&self, agent_id: Uuid) -> TrainletResult<Option<RunClaim>> {
        let mut state = self.state.write();

        // Highest priority first, FIFO within equal priority
        let winner = state
            .jobs
            .values()
            .filter(|job| {
                state
                    .runs
                    .get(&job.run_id)
                    .map(|run| run.state == RunState::Queued && run.agent_id == Some(agent_id))
                    .unwrap_or(false)
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
            })
            .map(|job| job.run_id);

        let Some(run_id) = winner else {
            return Ok(None);
        };

        let now = Utc::now();
        if let Some(job) = state.jobs.get_mut(&run_id) {
            if job.dequeued_at.is_none() {
                job.dequeued_at = Some(now);
            }
        }

        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| TrainletError::RunNotFound(run_id.to_string()))?;
        run.state = RunState::Running;
        run.started_at = Some(now);

        Ok(Some(RunClaim {
            run_id,
            run_name: run.name.clone(),
            config_id: run.config_id,
            gpu_indices: run.gpu_indices.clone(),
            log_dir: run.log_dir.clone(),
            ckpt_dir: run.ckpt_dir.clone(),
        }))
    }

    fn reserve_gpus(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()> {
        if indices.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write();
        state.check_reservation(agent_id, indices)?;
        state.apply_reservation(agent_id, indices);

        info!(agent_id = %agent_id, gpus = ?indices, "Reserved GPUs");
        Ok(())
    }

    fn release_gpus(&self, agent_id: Uuid, indices: &[u32]) -> TrainletResult<()> {
        let mut state = self.state.write();
        for idx in indices {
            if let Some(gpu) = state.gpus.get_mut(&(agent_id, *idx)) {
                if gpu.allocated {
                    gpu.allocated = false;
                    debug!(agent_id = %agent_id, gpu = idx, "Released GPU");
                }
            }
        }
        Ok(())
    }

    fn set_run_state(&self, run_id: Uuid, new_state: RunState) -> TrainletResult<RunState> {
        let mut state = self.state.write();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| TrainletError::RunNotFound(run_id.to_string()))?;

        // Terminal states are final
        if run.state.is_terminal() {
            return Ok(run.state);
        }

        run.state = new_state;
        if new_state.is_terminal() {
            run.finished_at = Some(Utc::now());
        }

        Ok(run.state)
    }

    fn update_epoch(&self, run_id: Uuid, epoch: u32) -> TrainletResult<bool> {
        let mut state = self.state.write();
        match state.runs.get_mut(&run_id) {
            Some(run) => {
                run.epoch = epoch;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_job_error(&self, run_id: Uuid, message: &str) -> TrainletResult<bool> {
        let mut state = self.state.write();
        match state.jobs.get_mut(&run_id) {
            Some(job) => {
                job.last_error = Some(message.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn register_agent(&self, mut agent: AgentRecord) -> TrainletResult<()> {
        let mut state = self.state.write();
        agent.last_heartbeat_at = Some(Utc::now());

        if let Some(existing) = state.agents.get_mut(&agent.id) {
            existing.host = agent.host;
            existing.labels.extend(agent.labels);
            existing.last_heartbeat_at = agent.last_heartbeat_at;
        } else {
            info!(agent_id = %agent.id, name = %agent.name, host = %agent.host, "Registered agent");
            state.agents.insert(agent.id, agent);
        }
        Ok(())
    }

    fn upsert_gpu(&self, gpu: GpuRecord) -> TrainletResult<()> {
        let mut state = self.state.write();
        let key = (gpu.agent_id, gpu.index);

        if let Some(existing) = state.gpus.get_mut(&key) {
            // Allocation flag is owned by the allocator; metadata refresh
            // must not touch it
            existing.uuid = gpu.uuid;
            existing.name = gpu.name;
            existing.total_mem_mb = gpu.total_mem_mb;
            existing.last_seen_at = Some(Utc::now());
        } else {
            let mut gpu = gpu;
            gpu.last_seen_at = Some(Utc::now());
            state.gpus.insert(key, gpu);
        }
        Ok(())
    }

    fn update_agent_heartbeat(&self, agent_id: Uuid) -> TrainletResult<bool> {
        let mut state = self.state.write();
        match state.agents.get_mut(&agent_id) {
            Some(agent) => {
                agent.last_heartbeat_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_gpu_heartbeat(&self, agent_id: Uuid, index: u32) -> TrainletResult<bool> {
        let mut state = self.state.write();
        match state.gpus.get_mut(&(agent_id, index)) {
            Some(gpu) => {
                gpu.last_seen_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn run_log_dir(&self, run_id: Uuid) -> TrainletResult<Option<PathBuf>> {
        let state = self.state.read();
        Ok(state.runs.get(&run_id).map(|run| run.log_dir.clone()))
    }

    fn get_run(&self, run_id: Uuid) -> TrainletResult<Option<Run>> {
        let state = self.state.read();
        Ok(state.runs.get(&run_id).cloned())
    }

    fn get_job(&self, run_id: Uuid) -> TrainletResult<Option<Job>> {
        let state = self.state.read();
        Ok(state.jobs.get(&run_id).cloned())
    }

    fn get_agent(&self, agent_id: Uuid) -> TrainletResult<Option<AgentRecord>> {
        let state = self.state.read();
        Ok(state.agents.get(&agent_id).cloned())
    }

    fn get_gpu(&self, agent_id: Uuid, index: u32) -> TrainletResult<Option<GpuRecord>> {
        let state = self.state.read();
        Ok(state.gpus.get(&(agent_id, index)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn agent_with_gpus(store: &MemoryStore, count: u32) -> Uuid {
        let agent_id = Uuid::new_v4();
        store
            .register_agent(AgentRecord::new(
                agent_id,
                "gpu:test".to_string(),
                "testhost".to_string(),
            ))
            .unwrap();
        for idx in 0..count {
            store
                .upsert_gpu(GpuRecord {
                    agent_id,
                    index: idx,
                    uuid: None,
                    name: None,
                    total_mem_mb: Some(16384),
                    allocated: false,
                    last_seen_at: None,
                })
                .unwrap();
        }
        agent_id
    }

    fn queued_run(agent_id: Uuid, name: &str, gpus: Vec<u32>) -> Run {
        Run::new(
            name.to_string(),
            PathBuf::from(format!("/logs/{}", name)),
            PathBuf::from(format!("/ckpt/{}", name)),
        )
        .assigned_to(agent_id, gpus)
    }

    #[test]
    fn test_submit_and_claim() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let run = queued_run(agent_id, "a", vec![0]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        let claim = store.claim_next_queued_run(agent_id).unwrap().unwrap();
        assert_eq!(claim.run_id, run_id);
        assert_eq!(claim.gpu_indices, vec![0]);

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.state, RunState::Running);
        assert!(run.started_at.is_some());

        let job = store.get_job(run_id).unwrap().unwrap();
        assert!(job.dequeued_at.is_some());
    }

    #[test]
    fn test_claim_miss_is_none() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        assert!(store.claim_next_queued_run(agent_id).unwrap().is_none());
    }

    #[test]
    fn test_dequeue_order() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let t0 = Utc::now();

        // (priority, enqueued_at): (5, t1), (1, t2), (5, t3) with t1 < t2 < t3
        for (offset, priority, name) in [(1, 5, "first"), (2, 1, "low"), (3, 5, "second")] {
            let run = queued_run(agent_id, name, vec![]);
            let mut job = Job::with_priority(run.id, priority);
            job.enqueued_at = t0 + Duration::seconds(offset);
            store.submit_run(run, job).unwrap();
        }

        let names: Vec<String> = (0..3)
            .map(|_| {
                store
                    .claim_next_queued_run(agent_id)
                    .unwrap()
                    .unwrap()
                    .run_name
            })
            .collect();
        assert_eq!(names, vec!["first", "second", "low"]);
    }

    #[test]
    fn test_claim_only_matching_agent() {
        let store = MemoryStore::new();
        let agent_a = agent_with_gpus(&store, 1);
        let agent_b = agent_with_gpus(&store, 1);

        let run = queued_run(agent_a, "a-only", vec![]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        assert!(store.claim_next_queued_run(agent_b).unwrap().is_none());
        assert!(store.claim_next_queued_run(agent_a).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let agent_id = agent_with_gpus(&store, 1);
        let run = queued_run(agent_id, "contested", vec![]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.claim_next_queued_run(agent_id).unwrap().is_some()
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_reserve_conflict_is_all_or_nothing() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 2);

        store.reserve_gpus(agent_id, &[1]).unwrap();

        // Index 0 is free, index 1 is held: nothing may be reserved
        let err = store.reserve_gpus(agent_id, &[0, 1]).unwrap_err();
        assert!(matches!(err, TrainletError::AllocationConflict(_)));

        // Index 0 must still be reservable on its own
        store.reserve_gpus(agent_id, &[0]).unwrap();
    }

    #[test]
    fn test_reserve_unknown_index() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let err = store.reserve_gpus(agent_id, &[7]).unwrap_err();
        assert!(matches!(err, TrainletError::Gpu(_)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);

        store.reserve_gpus(agent_id, &[0]).unwrap();
        store.release_gpus(agent_id, &[0]).unwrap();
        // Releasing again, and releasing an index that never existed, are no-ops
        store.release_gpus(agent_id, &[0]).unwrap();
        store.release_gpus(agent_id, &[42]).unwrap();

        store.reserve_gpus(agent_id, &[0]).unwrap();
    }

    #[test]
    fn test_submit_conflict_mutates_nothing() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);

        let first = queued_run(agent_id, "holder", vec![0]);
        let first_id = first.id;
        store.submit_run(first, Job::new(first_id)).unwrap();

        let second = queued_run(agent_id, "loser", vec![0]);
        let second_id = second.id;
        let err = store.submit_run(second, Job::new(second_id)).unwrap_err();
        assert!(matches!(err, TrainletError::AllocationConflict(_)));

        // No run or job row was written for the rejected submission
        assert!(store.get_run(second_id).unwrap().is_none());
        assert!(store.get_job(second_id).unwrap().is_none());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let run = queued_run(agent_id, "done", vec![]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        store.claim_next_queued_run(agent_id).unwrap();
        let state = store.set_run_state(run_id, RunState::Succeeded).unwrap();
        assert_eq!(state, RunState::Succeeded);
        let finished_at = store.get_run(run_id).unwrap().unwrap().finished_at;
        assert!(finished_at.is_some());

        // A cancel request against a succeeded run is a no-op
        let state = store.set_run_state(run_id, RunState::Canceled).unwrap();
        assert_eq!(state, RunState::Succeeded);
        assert_eq!(
            store.get_run(run_id).unwrap().unwrap().finished_at,
            finished_at
        );
    }

    #[test]
    fn test_update_epoch_and_job_error() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let run = queued_run(agent_id, "progress", vec![]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        assert!(store.update_epoch(run_id, 3).unwrap());
        assert_eq!(store.get_run(run_id).unwrap().unwrap().epoch, 3);

        assert!(store.set_job_error(run_id, "CUDA out of memory").unwrap());
        assert_eq!(
            store.get_job(run_id).unwrap().unwrap().last_error.as_deref(),
            Some("CUDA out of memory")
        );

        assert!(!store.update_epoch(Uuid::new_v4(), 1).unwrap());
    }

    #[test]
    fn test_heartbeats() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);

        assert!(store.update_agent_heartbeat(agent_id).unwrap());
        assert!(store.update_gpu_heartbeat(agent_id, 0).unwrap());
        assert!(!store.update_agent_heartbeat(Uuid::new_v4()).unwrap());
        assert!(!store.update_gpu_heartbeat(agent_id, 9).unwrap());
    }

    #[test]
    fn test_upsert_gpu_preserves_allocation() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        store.reserve_gpus(agent_id, &[0]).unwrap();

        // A metadata refresh from the agent must not clear the flag
        store
            .upsert_gpu(GpuRecord {
                agent_id,
                index: 0,
                uuid: Some("GPU-refreshed".to_string()),
                name: Some("A100".to_string()),
                total_mem_mb: Some(81920),
                allocated: false,
                last_seen_at: None,
            })
            .unwrap();

        let err = store.reserve_gpus(agent_id, &[0]).unwrap_err();
        assert!(matches!(err, TrainletError::AllocationConflict(_)));
    }

    #[test]
    fn test_run_log_dir_resolution() {
        let store = MemoryStore::new();
        let agent_id = agent_with_gpus(&store, 1);
        let run = queued_run(agent_id, "viz", vec![]);
        let run_id = run.id;
        store.submit_run(run, Job::new(run_id)).unwrap();

        assert_eq!(
            store.run_log_dir(run_id).unwrap(),
            Some(PathBuf::from("/logs/viz"))
        );
        assert!(store.run_log_dir(Uuid::new_v4()).unwrap().is_none());
    }
}
