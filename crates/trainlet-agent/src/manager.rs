//! Agent lifecycle management

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trainlet_core::{
    AgentConfig, AgentPhase, AgentStatusReport, RunClaim, RunState, TrainletError, TrainletResult,
};
use trainlet_scheduler::{GpuAllocator, Scheduler};
use trainlet_store::ResourceStore;

use crate::executor::{TrainingExecutor, TrainingProgress};
use crate::progress::ProgressTracker;

/// Shared view of the current run, updated by the progress callback and
/// read by the status endpoint
struct RunSnapshot {
    phase: AgentPhase,
    run_id: Option<Uuid>,
    run_name: Option<String>,
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    tracker: ProgressTracker,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            phase: AgentPhase::Idle,
            run_id: None,
            run_name: None,
            started_at: None,
            started_instant: None,
            tracker: ProgressTracker::new(),
        }
    }
}

/// Drives the poll→claim→execute→finalize loop for one agent.
///
/// The training call itself runs on a blocking task so the async loops
/// (heartbeat, HTTP) are never starved. Cancellation is cooperative: the
/// halt and finish flags are polled by the executor at epoch boundaries,
/// so a stop request takes effect only after the in-progress epoch ends.
pub struct AgentManager {
    agent_id: Uuid,
    config: AgentConfig,
    store: Arc<dyn ResourceStore>,
    scheduler: Scheduler,
    allocator: GpuAllocator,
    executor: Arc<dyn TrainingExecutor>,
    snapshot: Arc<Mutex<RunSnapshot>>,
    halt: Arc<AtomicBool>,
    finish: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    last_idle_log: Mutex<Option<Instant>>,
}

impl AgentManager {
    /// Create a manager for an agent
    pub fn new(
        agent_id: Uuid,
        config: AgentConfig,
        store: Arc<dyn ResourceStore>,
        executor: Arc<dyn TrainingExecutor>,
    ) -> Self {
        Self {
            agent_id,
            config,
            scheduler: Scheduler::new(Arc::clone(&store)),
            allocator: GpuAllocator::new(Arc::clone(&store)),
            store,
            executor,
            snapshot: Arc::new(Mutex::new(RunSnapshot::default())),
            halt: Arc::new(AtomicBool::new(false)),
            finish: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            last_idle_log: Mutex::new(None),
        }
    }

    /// Agent this manager claims runs for
    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Shared shutdown flag, also honored by the heartbeat loop
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Current status snapshot
    pub fn status(&self) -> AgentStatusReport {
        let snap = self.snapshot.lock();
        let Some(run_id) = snap.run_id else {
            return AgentStatusReport::idle();
        };

        AgentStatusReport {
            phase: snap.phase,
            run_id: Some(run_id),
            run_name: snap.run_name.clone(),
            epoch: snap.tracker.epoch().map(|e| e + 1),
            total_epochs: snap.tracker.total_epochs(),
            started_at: snap.started_at,
            elapsed_seconds: snap.started_instant.map(|t| t.elapsed().as_secs_f64()),
            eta_seconds: snap.tracker.eta_seconds(),
        }
    }

    /// Request cooperative cancellation of the current run
    pub fn request_halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
        info!(agent_id = %self.agent_id, "Halt requested for current training run");
    }

    /// Request an early finish: the run stops at the next epoch boundary
    /// and is recorded as succeeded
    pub fn request_finish(&self) {
        self.finish.store(true, Ordering::SeqCst);
        info!(agent_id = %self.agent_id, "Finish requested for current training run");
    }

    /// Stop the manager loop
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Main agent loop: polls for runs and executes them until stopped
    pub async fn run_forever(&self) {
        info!(
            agent_id = %self.agent_id,
            poll_interval_secs = self.config.poll_interval_secs,
            "Agent manager started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => {
                    self.log_idle();
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(e) => {
                    error!(agent_id = %self.agent_id, error = %e, "Queue poll failed");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }
    }

    /// Claim and execute at most one run. Returns whether work was done.
    pub async fn poll_once(&self) -> TrainletResult<bool> {
        self.snapshot.lock().phase = AgentPhase::Claiming;

        let claim = match self.scheduler.claim_next(self.agent_id) {
            Ok(claim) => claim,
            Err(e) => {
                self.snapshot.lock().phase = AgentPhase::Idle;
                return Err(e);
            }
        };

        match claim {
            Some(claim) => {
                self.execute_run(claim).await;
                Ok(true)
            }
            None => {
                self.snapshot.lock().phase = AgentPhase::Idle;
                Ok(false)
            }
        }
    }

    async fn execute_run(&self, claim: RunClaim) {
        self.halt.store(false, Ordering::SeqCst);
        self.finish.store(false, Ordering::SeqCst);

        {
            let mut snap = self.snapshot.lock();
            snap.phase = AgentPhase::Executing;
            snap.run_id = Some(claim.run_id);
            snap.run_name = Some(claim.run_name.clone());
            snap.started_at = Some(Utc::now());
            snap.started_instant = Some(Instant::now());
            snap.tracker.reset();
        }

        info!(run_id = %claim.run_id, name = %claim.run_name, "Starting training run");

        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let snapshot = Arc::clone(&self.snapshot);
        let halt = Arc::clone(&self.halt);
        let finish = Arc::clone(&self.finish);
        let shutdown = Arc::clone(&self.shutdown);
        let claim_for_task = claim.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let run_id = claim_for_task.run_id;

            let on_progress = |p: TrainingProgress| {
                {
                    let mut snap = snapshot.lock();
                    snap.tracker
                        .observe(p.epoch, p.total_epochs, p.epoch_duration_secs);
                }

                // Persisted before returning so observers see monotonic
                // progress even if the process dies mid-run; 1-based for
                // human-facing consumers
                if let Err(e) = store.update_epoch(run_id, p.epoch + 1) {
                    warn!(run_id = %run_id, error = %e, "Failed to persist epoch");
                }

                info!(
                    run_id = %run_id,
                    epoch = p.epoch + 1,
                    total_epochs = p.total_epochs,
                    duration_secs = p.epoch_duration_secs,
                    "Epoch completed"
                );
            };

            let should_stop = || {
                halt.load(Ordering::SeqCst)
                    || finish.load(Ordering::SeqCst)
                    || shutdown.load(Ordering::SeqCst)
            };

            executor.execute(&claim_for_task, &on_progress, &should_stop)
        })
        .await;

        let outcome = match joined {
            Ok(result) => result,
            Err(e) => Err(TrainletError::Executor(format!(
                "Training task panicked: {}",
                e
            ))),
        };

        self.finalize_run(&claim, outcome);
        self.clear_run_state();
    }

    fn finalize_run(&self, claim: &RunClaim, outcome: TrainletResult<bool>) {
        self.snapshot.lock().phase = AgentPhase::Finalizing;

        let halted = self.halt.load(Ordering::SeqCst);
        let finished = self.finish.load(Ordering::SeqCst);
        let state = resolve_terminal_state(halted, finished, &outcome);

        if state == RunState::Failed {
            if let Err(e) = &outcome {
                if let Err(store_err) = self.store.set_job_error(claim.run_id, &e.to_string()) {
                    warn!(run_id = %claim.run_id, error = %store_err, "Failed to persist run error");
                }
            }
        }

        match self.store.set_run_state(claim.run_id, state) {
            Ok(final_state) => {
                info!(
                    run_id = %claim.run_id,
                    name = %claim.run_name,
                    status = %final_state,
                    "Training run completed"
                );
            }
            Err(e) => {
                error!(run_id = %claim.run_id, error = %e, "Failed to persist terminal state");
            }
        }

        // Unconditional release on every terminal transition; idempotence
        // makes this safe even when nothing is held
        if let Err(e) = self.allocator.release(self.agent_id, &claim.gpu_indices) {
            warn!(run_id = %claim.run_id, error = %e, "Failed to release GPUs");
        }
    }

    fn clear_run_state(&self) {
        *self.snapshot.lock() = RunSnapshot::default();
        debug!(agent_id = %self.agent_id, "Cleared run state");
    }

    fn log_idle(&self) {
        let mut last = self.last_idle_log.lock();
        let due = last
            .map(|t| t.elapsed() >= self.config.idle_log_interval())
            .unwrap_or(true);
        if due {
            debug!(agent_id = %self.agent_id, "No queued runs available");
            *last = Some(Instant::now());
        }
    }
}

/// Map the loop flags and the executor outcome onto a terminal state.
///
/// Halt wins over finish, which wins over the executor's own result.
fn resolve_terminal_state(
    halted: bool,
    finished: bool,
    outcome: &TrainletResult<bool>,
) -> RunState {
    if halted {
        RunState::Canceled
    } else if finished {
        RunState::Succeeded
    } else {
        match outcome {
            Ok(true) => RunState::Succeeded,
            Ok(false) | Err(_) => RunState::Failed,
        }
    }
}
