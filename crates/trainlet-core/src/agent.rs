//! Agent and GPU record definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::gpu::GpuDevice;

/// A registered training agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique agent identifier
    pub id: Uuid,
    /// Human-readable name, usually derived from the GPU identity
    pub name: String,
    /// Hostname the agent runs on
    pub host: String,
    /// GPU metadata labels
    pub labels: HashMap<String, String>,
    /// Last heartbeat timestamp, owned by the agent's own process
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Create a new agent record
    pub fn new(id: Uuid, name: String, host: String) -> Self {
        Self {
            id,
            name,
            host,
            labels: HashMap::new(),
            last_heartbeat_at: None,
        }
    }

    /// Attach GPU metadata labels built from a discovered device
    pub fn with_gpu_labels(mut self, device: &GpuDevice) -> Self {
        self.labels = gpu_labels(device);
        self
    }
}

/// Build the label map describing a GPU device
pub fn gpu_labels(device: &GpuDevice) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("gpu_index".to_string(), device.index.to_string());
    if let Some(uuid) = &device.uuid {
        labels.insert("gpu_uuid".to_string(), uuid.clone());
    }
    if let Some(name) = &device.name {
        labels.insert("gpu_name".to_string(), name.clone());
    }
    if let Some(cc) = &device.compute_capability {
        labels.insert("compute_capability".to_string(), cc.clone());
    }
    labels
}

/// A GPU registered under an agent, keyed by (agent id, index)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuRecord {
    /// Owning agent
    pub agent_id: Uuid,
    /// Device index within the agent's pool
    pub index: u32,
    /// Vendor device UUID, when known
    pub uuid: Option<String>,
    /// Device name, when known
    pub name: Option<String>,
    /// Total memory in megabytes, when known
    pub total_mem_mb: Option<u64>,
    /// Allocation flag, owned exclusively by the allocator
    pub allocated: bool,
    /// Last-seen timestamp, updated by the agent heartbeat loop
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl GpuRecord {
    /// Create a record for a discovered device
    pub fn from_device(agent_id: Uuid, device: &GpuDevice) -> Self {
        Self {
            agent_id,
            index: device.index,
            uuid: device.uuid.clone(),
            name: device.name.clone(),
            total_mem_mb: device.total_mem_mb,
            allocated: false,
            last_seen_at: None,
        }
    }
}

/// Phase of the agent's execution loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    /// Waiting for work
    Idle,
    /// Attempting to claim the next queued run
    Claiming,
    /// Running the training executor
    Executing,
    /// Persisting the terminal state and releasing resources
    Finalizing,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPhase::Idle => write!(f, "idle"),
            AgentPhase::Claiming => write!(f, "claiming"),
            AgentPhase::Executing => write!(f, "executing"),
            AgentPhase::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Read-only snapshot of an agent's current work, served by `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    /// Current loop phase
    pub phase: AgentPhase,
    /// Run being executed, if any
    pub run_id: Option<Uuid>,
    /// Name of the run being executed
    pub run_name: Option<String>,
    /// Last completed epoch (1-based)
    pub epoch: Option<u32>,
    /// Total epochs reported by the trainer
    pub total_epochs: Option<u32>,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since the current run started
    pub elapsed_seconds: Option<f64>,
    /// Estimated seconds remaining, once at least one epoch has completed
    pub eta_seconds: Option<f64>,
}

impl AgentStatusReport {
    /// Snapshot for an agent with no current run
    pub fn idle() -> Self {
        Self {
            phase: AgentPhase::Idle,
            run_id: None,
            run_name: None,
            epoch: None,
            total_epochs: None,
            started_at: None,
            elapsed_seconds: None,
            eta_seconds: None,
        }
    }
}
