//! Agent heartbeat loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use trainlet_store::ResourceStore;

/// Periodically refresh the agent's and its GPUs' last-seen timestamps.
///
/// Runs as its own task, never on the manager loop: heartbeats must keep
/// flowing while a training call blocks, so this loop cannot share the
/// blocking call's execution context.
pub async fn heartbeat_loop(
    store: Arc<dyn ResourceStore>,
    agent_id: Uuid,
    gpu_indices: Vec<u32>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The first tick completes immediately; skip it so registration
    // timestamps are not double-written at startup
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = store.update_agent_heartbeat(agent_id) {
            warn!(agent_id = %agent_id, error = %e, "Agent heartbeat failed");
        }
        for idx in &gpu_indices {
            if let Err(e) = store.update_gpu_heartbeat(agent_id, *idx) {
                warn!(agent_id = %agent_id, gpu = idx, error = %e, "GPU heartbeat failed");
            }
        }

        debug!(agent_id = %agent_id, "Heartbeat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainlet_core::{AgentRecord, GpuRecord};
    use trainlet_store::MemoryStore;

    #[tokio::test]
    async fn test_heartbeat_updates_timestamps() {
        let store = Arc::new(MemoryStore::new());
        let agent_id = Uuid::new_v4();
        store
            .register_agent(AgentRecord::new(
                agent_id,
                "gpu:test".to_string(),
                "host".to_string(),
            ))
            .unwrap();
        store
            .upsert_gpu(GpuRecord {
                agent_id,
                index: 0,
                uuid: None,
                name: None,
                total_mem_mb: None,
                allocated: false,
                last_seen_at: None,
            })
            .unwrap();

        let registered_at = store
            .get_agent(agent_id)
            .unwrap()
            .unwrap()
            .last_heartbeat_at
            .unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(heartbeat_loop(
            store.clone() as Arc<dyn ResourceStore>,
            agent_id,
            vec![0],
            Duration::from_millis(10),
            Arc::clone(&shutdown),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.store(true, Ordering::SeqCst);
        task.await.unwrap();

        let agent = store.get_agent(agent_id).unwrap().unwrap();
        assert!(agent.last_heartbeat_at.unwrap() >= registered_at);

        let gpu = store.get_gpu(agent_id, 0).unwrap().unwrap();
        assert!(gpu.last_seen_at.is_some());
    }
}
