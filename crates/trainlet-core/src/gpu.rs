//! GPU discovery

use serde::{Deserialize, Serialize};

/// A GPU device discovered on the local host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDevice {
    /// Device index
    pub index: u32,
    /// Vendor device UUID
    pub uuid: Option<String>,
    /// Device name
    pub name: Option<String>,
    /// Total memory in megabytes
    pub total_mem_mb: Option<u64>,
    /// CUDA compute capability
    pub compute_capability: Option<String>,
}

impl GpuDevice {
    /// Placeholder device for hosts where detection yields nothing.
    ///
    /// An agent always registers at least one device so that runs pinned to
    /// index 0 remain schedulable on CPU-only development machines.
    pub fn fallback(index: u32) -> Self {
        Self {
            index,
            uuid: None,
            name: None,
            total_mem_mb: None,
            compute_capability: None,
        }
    }
}

/// Detect GPUs on the local host
///
/// On Linux/Windows this queries NVML for NVIDIA devices. On macOS a single
/// Apple Silicon device is assumed. Returns an empty list when nothing is
/// detected; callers decide whether to fall back to a placeholder device.
pub fn detect_gpus() -> Vec<GpuDevice> {
    #[cfg(target_os = "macos")]
    {
        detect_apple_gpus()
    }

    #[cfg(not(target_os = "macos"))]
    {
        detect_nvidia_gpus().unwrap_or_default()
    }
}

/// Detect Apple Silicon GPUs (macOS only)
#[cfg(target_os = "macos")]
fn detect_apple_gpus() -> Vec<GpuDevice> {
    // Unified memory; capacity would need a sysctl query
    vec![GpuDevice {
        index: 0,
        uuid: None,
        name: Some("Apple Silicon GPU".to_string()),
        total_mem_mb: None,
        compute_capability: None,
    }]
}

/// Detect NVIDIA GPUs using NVML
#[cfg(not(target_os = "macos"))]
fn detect_nvidia_gpus() -> Result<Vec<GpuDevice>, crate::TrainletError> {
    // NVML detection would go here; the library may be absent on
    // non-NVIDIA hosts, in which case agents register a fallback device.
    Ok(Vec::new())
}
