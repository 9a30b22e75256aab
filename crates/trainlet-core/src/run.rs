//! Run, Job, and claim type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Waiting in the queue for an agent to claim it
    Queued,
    /// Claimed and executing on an agent
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Stopped by an explicit halt request
    Canceled,
}

impl RunState {
    /// Terminal states are final; no further transition is applied.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Canceled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Queued => write!(f, "queued"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
            RunState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Direction of the monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    Max,
}

impl Default for MonitorMode {
    fn default() -> Self {
        MonitorMode::Min
    }
}

/// One training execution attempt with its own state and resource assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for the run
    pub id: Uuid,
    /// Human-readable run name
    pub name: String,
    /// Current lifecycle state
    pub state: RunState,
    /// Metric watched for best-checkpoint selection
    pub monitor_metric: Option<String>,
    /// Whether the monitored metric should be minimized or maximized
    pub monitor_mode: MonitorMode,
    /// Agent this run is assigned to
    pub agent_id: Option<Uuid>,
    /// GPU indices reserved for this run on its agent
    pub gpu_indices: Vec<u32>,
    /// Training configuration reference
    pub config_id: Option<Uuid>,
    /// Last persisted epoch (1-based, human-facing)
    pub epoch: u32,
    /// Last persisted optimizer step
    pub step: u64,
    /// Directory holding event logs for visualization
    pub log_dir: PathBuf,
    /// Directory holding checkpoints
    pub ckpt_dir: PathBuf,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the run is claimed
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once, on the terminal transition
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a new queued run
    pub fn new(name: String, log_dir: PathBuf, ckpt_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            state: RunState::Queued,
            monitor_metric: None,
            monitor_mode: MonitorMode::default(),
            agent_id: None,
            gpu_indices: Vec::new(),
            config_id: None,
            epoch: 0,
            step: 0,
            log_dir,
            ckpt_dir,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Assign the run to an agent with a GPU index set
    pub fn assigned_to(mut self, agent_id: Uuid, gpu_indices: Vec<u32>) -> Self {
        self.agent_id = Some(agent_id);
        self.gpu_indices = gpu_indices;
        self
    }
}

/// Queue-side record wrapping a run with priority and ordering metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for the job
    pub id: Uuid,
    /// The run this job wraps (1:1)
    pub run_id: Uuid,
    /// Higher priority is claimed first
    pub priority: i32,
    /// Queue insertion timestamp; FIFO tiebreaker within equal priority
    pub enqueued_at: DateTime<Utc>,
    /// Stamped exactly once, by the claim operation
    pub dequeued_at: Option<DateTime<Utc>>,
    /// Number of retry attempts so far
    pub retries: u32,
    /// Message from the most recent executor failure
    pub last_error: Option<String>,
}

impl Job {
    /// Create a job for a run with default priority
    pub fn new(run_id: Uuid) -> Self {
        Self::with_priority(run_id, 0)
    }

    /// Create a job for a run with an explicit priority
    pub fn with_priority(run_id: Uuid, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            priority,
            enqueued_at: Utc::now(),
            dequeued_at: None,
            retries: 0,
            last_error: None,
        }
    }
}

/// Context handed to an agent when it wins a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunClaim {
    /// Claimed run id
    pub run_id: Uuid,
    /// Claimed run name
    pub run_name: String,
    /// Training configuration reference
    pub config_id: Option<Uuid>,
    /// GPU indices reserved for the run
    pub gpu_indices: Vec<u32>,
    /// Event log directory
    pub log_dir: PathBuf,
    /// Checkpoint directory
    pub ckpt_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_new_is_queued() {
        let run = Run::new(
            "resnet-baseline".to_string(),
            PathBuf::from("/data/logs/resnet"),
            PathBuf::from("/data/ckpt/resnet"),
        );
        assert_eq!(run.state, RunState::Queued);
        assert_eq!(run.epoch, 0);
        assert!(run.started_at.is_none());
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_run_assigned_to() {
        let agent_id = Uuid::new_v4();
        let run = Run::new(
            "test".to_string(),
            PathBuf::from("/logs"),
            PathBuf::from("/ckpt"),
        )
        .assigned_to(agent_id, vec![0, 1]);
        assert_eq!(run.agent_id, Some(agent_id));
        assert_eq!(run.gpu_indices, vec![0, 1]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Canceled.is_terminal());
    }

    #[test]
    fn test_job_with_priority() {
        let run_id = Uuid::new_v4();
        let job = Job::with_priority(run_id, 5);
        assert_eq!(job.run_id, run_id);
        assert_eq!(job.priority, 5);
        assert!(job.dequeued_at.is_none());
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Queued.to_string(), "queued");
        assert_eq!(RunState::Canceled.to_string(), "canceled");
    }
}
