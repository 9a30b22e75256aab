//! Per-job handler cache and idle eviction

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use trainlet_core::TrainletResult;

use crate::backend::{BackendFactory, BackendHandler};

/// An ephemeral visualization session: one cached backend handler plus its
/// liveness timestamp. Never persisted.
struct Session {
    logdir: PathBuf,
    handler: Arc<dyn BackendHandler>,
    last_heartbeat: Instant,
}

/// Cache of visualization sessions keyed by job id.
///
/// The map lock is held across handler construction, so concurrent first
/// accesses to the same job id build exactly one handler. Liveness comes
/// only from [`record_heartbeat`](HandlerCache::record_heartbeat): backend
/// request traffic includes the backends' own internal polling, which must
/// not keep a session alive.
pub struct HandlerCache {
    factory: Arc<dyn BackendFactory>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl HandlerCache {
    /// Create a cache with the given eviction parameters
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            sweep_interval,
        }
    }

    /// Seconds without a heartbeat before a session is evicted
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Sweeper wake interval
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Get the cached handler for `job_id`, building it if absent.
    ///
    /// A cached session whose logdir no longer matches the current
    /// resolution is shut down and rebuilt. On build failure no session is
    /// created and the next request retries.
    pub async fn get_or_build(
        &self,
        job_id: Uuid,
        logdir: &Path,
        mount_prefix: &str,
    ) -> TrainletResult<Arc<dyn BackendHandler>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(&job_id) {
            if session.logdir == logdir {
                return Ok(Arc::clone(&session.handler));
            }

            // The run's directory was reassigned; the old handler is stale
            info!(job_id = %job_id, "Logdir changed, rebuilding session");
            if let Some(stale) = sessions.remove(&job_id) {
                stale.handler.shutdown().await;
            }
        }

        let handler = self.factory.build(logdir, mount_prefix).await?;
        debug!(job_id = %job_id, logdir = %logdir.display(), "Built visualization session");

        sessions.insert(
            job_id,
            Session {
                logdir: logdir.to_path_buf(),
                handler: Arc::clone(&handler),
                // A fresh session starts with one implicit heartbeat so it
                // survives until the client's first explicit one
                last_heartbeat: Instant::now(),
            },
        );

        Ok(handler)
    }

    /// Record liveness for `job_id`. Returns whether a session existed.
    pub async fn record_heartbeat(&self, job_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&job_id) {
            Some(session) => {
                session.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Whether a session is currently cached
    pub async fn contains(&self, job_id: Uuid) -> bool {
        self.sessions.lock().await.contains_key(&job_id)
    }

    /// Evict sessions idle past the timeout. Returns how many were removed.
    ///
    /// Removal happens under the lock; the best-effort backend shutdown
    /// happens after it is released so eviction never blocks request
    /// serving on slow shutdowns.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<(Uuid, Arc<dyn BackendHandler>)> = {
            let mut sessions = self.sessions.lock().await;
            let expired_ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| s.last_heartbeat.elapsed() > self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s.handler)))
                .collect()
        };

        for (job_id, handler) in &expired {
            info!(job_id = %job_id, "Evicting idle visualization session");
            handler.shutdown().await;
        }

        expired.len()
    }

    /// Background sweeper loop
    pub async fn run_sweeper(self: Arc<Self>, shutdown: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let evicted = self.sweep().await;
            if evicted > 0 {
                debug!(evicted, "Sweep complete");
            }
        }
    }
}
