//! Training executor seam and the subprocess implementation

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use trainlet_core::{RunClaim, TrainletError, TrainletResult};

/// One completed epoch, as reported by the trainer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingProgress {
    /// 0-based index of the completed epoch
    pub epoch: u32,
    /// Total epochs the trainer will run
    pub total_epochs: u32,
    /// Wall-clock seconds the epoch took
    pub epoch_duration_secs: f64,
}

/// Executes the training computation for a claimed run.
///
/// `execute` blocks until the run finishes, so the agent invokes it on a
/// blocking task. The stop predicate is polled at epoch boundaries only:
/// cancellation is bounded-latency, not preemptive — an in-progress epoch
/// always runs to completion.
pub trait TrainingExecutor: Send + Sync {
    /// Run training to completion.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when the trainer stopped
    /// early or reported failure, `Err` on infrastructure errors.
    fn execute(
        &self,
        claim: &RunClaim,
        on_progress: &(dyn Fn(TrainingProgress) + Send + Sync),
        should_stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> TrainletResult<bool>;
}

/// Executor that runs a trainer command as a child process.
///
/// The trainer reports epochs on stdout as lines of the form
/// `progress <epoch> <total_epochs> <duration_secs>`; everything else on
/// stdout is ignored. When the stop predicate fires at an epoch boundary
/// the child is terminated.
pub struct CommandExecutor {
    program: PathBuf,
    base_args: Vec<String>,
}

impl CommandExecutor {
    /// Create an executor for a trainer command
    pub fn new(program: PathBuf, base_args: Vec<String>) -> Self {
        Self { program, base_args }
    }

    fn build_command(&self, claim: &RunClaim) -> Command {
        let mut cmd = Command::new(&self.program);

        cmd.arg("--run-name").arg(&claim.run_name);
        cmd.arg("--log-dir").arg(&claim.log_dir);
        cmd.arg("--ckpt-dir").arg(&claim.ckpt_dir);
        if let Some(config_id) = claim.config_id {
            cmd.arg("--config-id").arg(config_id.to_string());
        }

        // Pin the trainer to the run's reserved devices
        if !claim.gpu_indices.is_empty() {
            let gpu_ids: String = claim
                .gpu_indices
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            cmd.env("CUDA_VISIBLE_DEVICES", &gpu_ids);
        }

        for arg in &self.base_args {
            cmd.arg(arg);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        cmd
    }
}

impl TrainingExecutor for CommandExecutor {
    fn execute(
        &self,
        claim: &RunClaim,
        on_progress: &(dyn Fn(TrainingProgress) + Send + Sync),
        should_stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> TrainletResult<bool> {
        info!(
            run_id = %claim.run_id,
            program = %self.program.display(),
            gpus = ?claim.gpu_indices,
            "Spawning trainer"
        );

        let mut cmd = self.build_command(claim);
        let mut child = cmd
            .spawn()
            .map_err(|e| TrainletError::Executor(format!("Failed to spawn trainer: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainletError::Executor("Trainer stdout not captured".to_string()))?;

        let mut stopped = false;
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            let Some(progress) = parse_progress_line(&line) else {
                continue;
            };

            on_progress(progress);

            if should_stop() {
                debug!(run_id = %claim.run_id, epoch = progress.epoch, "Stop requested, terminating trainer");
                if let Err(e) = child.kill() {
                    warn!(run_id = %claim.run_id, error = %e, "Failed to terminate trainer");
                }
                stopped = true;
                break;
            }
        }

        let status = child
            .wait()
            .map_err(|e| TrainletError::Executor(format!("Failed to reap trainer: {}", e)))?;

        if stopped {
            return Ok(false);
        }

        Ok(status.success())
    }
}

/// Parse a trainer progress line: `progress <epoch> <total> <secs>`
fn parse_progress_line(line: &str) -> Option<TrainingProgress> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("progress") {
        return None;
    }

    let epoch = parts.next()?.parse().ok()?;
    let total_epochs = parts.next()?.parse().ok()?;
    let epoch_duration_secs = parts.next()?.parse().ok()?;

    Some(TrainingProgress {
        epoch,
        total_epochs,
        epoch_duration_secs,
    })
}
