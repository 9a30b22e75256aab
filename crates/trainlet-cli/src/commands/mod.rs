//! CLI commands implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Agent status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub phase: String,
    pub run_id: Option<Uuid>,
    pub run_name: Option<String>,
    pub epoch: Option<u32>,
    pub total_epochs: Option<u32>,
    pub started_at: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub eta_seconds: Option<f64>,
}

/// Heartbeat response from the board
#[derive(Debug, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub session_active: bool,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Embed response from the board
#[derive(Debug, Deserialize)]
pub struct EmbedResponse {
    pub url: String,
}

/// Check agent liveness
pub async fn health(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/health")).send().await?;

    if response.status().is_success() {
        println!("Agent is up");
    } else {
        eprintln!("Agent returned {}", response.status());
    }

    Ok(())
}

/// Show the agent's current run and ETA
pub async fn status(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/status")).send().await?;

    if !response.status().is_success() {
        eprintln!("Failed to fetch status: {}", response.status());
        return Ok(());
    }

    let status: StatusResponse = response.json().await?;

    println!("Phase: {}", status.phase);
    if let (Some(run_id), Some(name)) = (status.run_id, &status.run_name) {
        println!("Run: {} ({})", name, run_id);
    }
    match (status.epoch, status.total_epochs) {
        (Some(epoch), Some(total)) => println!("Epoch: {}/{}", epoch, total),
        (Some(epoch), None) => println!("Epoch: {}", epoch),
        _ => {}
    }
    if let Some(started_at) = &status.started_at {
        println!("Started: {}", started_at);
    }
    if let Some(elapsed) = status.elapsed_seconds {
        println!("Elapsed: {}", format_duration(elapsed));
    }
    if let Some(eta) = status.eta_seconds {
        println!("ETA: {}", format_duration(eta));
    }

    Ok(())
}

/// Request cancellation of the current run
pub async fn halt(client: &ApiClient) -> Result<()> {
    let response = client.client.post(client.url("/halt")).send().await?;

    if response.status().is_success() {
        println!("Halt requested; the run stops at the next epoch boundary");
    } else {
        eprintln!("Failed to request halt: {}", response.status());
    }

    Ok(())
}

/// Request an early finish of the current run
pub async fn finish(client: &ApiClient) -> Result<()> {
    let response = client.client.post(client.url("/finish")).send().await?;

    if response.status().is_success() {
        println!("Finish requested; the run stops at the next epoch boundary");
    } else {
        eprintln!("Failed to request finish: {}", response.status());
    }

    Ok(())
}

/// Send a visualization liveness heartbeat
pub async fn heartbeat(client: &ApiClient, job_id: Uuid) -> Result<()> {
    #[derive(Serialize)]
    struct HeartbeatRequest {
        job_id: Uuid,
    }

    let response = client
        .client
        .post(client.url("/heartbeat"))
        .json(&HeartbeatRequest { job_id })
        .send()
        .await?;

    if !response.status().is_success() {
        eprintln!("Failed to send heartbeat: {}", response.status());
        return Ok(());
    }

    let ack: HeartbeatResponse = response.json().await?;
    if ack.session_active {
        println!("Heartbeat recorded for {}", job_id);
    } else {
        println!("No live session for {}", job_id);
    }
    println!(
        "  Idle timeout: {}s (sweep every {}s)",
        ack.idle_timeout_secs, ack.sweep_interval_secs
    );

    Ok(())
}

/// Show the embeddable visualization URL for a run
pub async fn embed(client: &ApiClient, job_id: Uuid) -> Result<()> {
    let response = client
        .client
        .get(client.url(&format!("/embed/{}", job_id)))
        .send()
        .await?;

    if !response.status().is_success() {
        eprintln!("Unknown run: {}", job_id);
        return Ok(());
    }

    let embed: EmbedResponse = response.json().await?;
    println!("{}", embed.url);

    Ok(())
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_client_url() {
        let client = ApiClient::new("http://localhost:7070/");
        assert_eq!(client.url("/status"), "http://localhost:7070/status");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.4), "42s");
        assert_eq!(format_duration(125.0), "2m05s");
        assert_eq!(format_duration(3725.0), "1h02m05s");
    }
}
