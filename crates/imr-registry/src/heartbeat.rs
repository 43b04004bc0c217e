//! Background heartbeat emitter.
//!
//! Keeps one instance's record fresh by refreshing its timestamp on a
//! fixed interval from a spawned task. The emitter exists so that a
//! registrant which stays alive never crosses the staleness threshold:
//! the default interval is half the stale timeout, leaving room for a
//! whole missed beat.
//!
//! # Failure Tolerance
//!
//! A failed or skipped refresh is logged and the loop keeps going. The
//! liveness policy needs two independent failures (stale timestamp and
//! dead process) before anyone reclaims the record, so transient disk
//! trouble here never kills a live registration.
//!
//! # Shutdown
//!
//! Stopping is cooperative: [`HeartbeatEmitter::stop`] cancels the task's
//! token and waits a bounded time for it to finish. A task that cannot be
//! joined in time is abandoned with a warning rather than blocking the
//! caller's shutdown. Dropping the emitter cancels the token too, so the
//! task dies at its next poll even if `stop` was never awaited.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use imr_core::record::InstanceId;

use crate::store::RegistryStore;

/// Floor for the refresh interval. `tokio::time::interval` panics on a
/// zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Heartbeat Emitter
// ============================================================================

/// Periodically refreshes one instance's heartbeat timestamp.
///
/// Timings come from the store's configuration at construction. The
/// emitter is restartable: after `stop`, a later `start` spawns a fresh
/// task with a fresh cancellation token.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    store: RegistryStore,
    instance_id: InstanceId,
    interval: Duration,
    stop_timeout: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatEmitter {
    /// Creates an emitter for the given instance, not yet running.
    ///
    /// A configured interval of zero is clamped to a 1 ms floor.
    pub fn new(store: RegistryStore, instance_id: InstanceId) -> Self {
        let interval = store.config().heartbeat_interval.max(MIN_INTERVAL);
        let stop_timeout = store.config().stop_timeout;
        Self {
            store,
            instance_id,
            interval,
            stop_timeout,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// The instance this emitter keeps fresh.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Whether the refresh task is currently alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawns the refresh task. No-op if one is already running.
    ///
    /// Must be called from within a Tokio runtime. The first refresh fires
    /// immediately rather than one interval from now, so a record that sat
    /// idle between registration and `start` is freshened right away.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!(instance_id = %self.instance_id, "heartbeat already running");
            return;
        }

        // Fresh token per spawn so a stopped emitter can start again.
        self.cancel = CancellationToken::new();
        self.task = Some(spawn_refresh_task(
            self.store.clone(),
            self.instance_id.clone(),
            self.interval,
            self.cancel.clone(),
        ));
        info!(
            instance_id = %self.instance_id,
            interval_ms = self.interval.as_millis() as u64,
            "heartbeat started"
        );
    }

    /// Cancels the refresh task and waits up to the configured stop
    /// timeout for it to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.stop_timeout, task).await {
            Ok(Ok(())) => {
                info!(instance_id = %self.instance_id, "heartbeat stopped");
            }
            Ok(Err(e)) => {
                warn!(instance_id = %self.instance_id, error = %e, "heartbeat task failed during shutdown");
            }
            Err(_) => {
                warn!(
                    instance_id = %self.instance_id,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "heartbeat task did not finish in time, abandoning it"
                );
            }
        }
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Refresh Task
// ============================================================================

/// Spawns the periodic refresh loop.
///
/// Cancellation is checked with priority over the tick so shutdown never
/// waits out a pending interval.
fn spawn_refresh_task(
    store: RegistryStore,
    instance_id: InstanceId,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(instance_id = %instance_id, "heartbeat task exiting");
                    break;
                }
                _ = tick.tick() => {
                    refresh_once(&store, &instance_id).await;
                }
            }
        }
    })
}

/// Runs one refresh on the blocking pool and logs the outcome.
async fn refresh_once(store: &RegistryStore, instance_id: &InstanceId) {
    let store = store.clone();
    let id = instance_id.clone();
    match tokio::task::spawn_blocking(move || store.refresh(&id)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            warn!(instance_id = %instance_id, "heartbeat target record is missing");
        }
        Ok(Err(e)) => {
            warn!(instance_id = %instance_id, error = %e, "heartbeat refresh failed");
        }
        Err(e) => {
            warn!(instance_id = %instance_id, error = %e, "heartbeat refresh task panicked");
        }
    }
}
