//! Instance advertisement lifecycle.
//!
//! Bundles the two halves of being discoverable, registration and
//! heartbeating, into one value whose lifetime mirrors the registrant's
//! availability: publish on startup, withdraw on clean shutdown.
//!
//! An [`Advertisement`] dropped without `withdraw` stops its heartbeat but
//! leaves the record file behind, the same trail a crash leaves: the
//! record goes stale, survives as long as the owning process survives, and
//! is reaped once both liveness signals fail.

use imr_core::error::RegistryResult;
use imr_core::record::InstanceRecord;

use crate::heartbeat::HeartbeatEmitter;
use crate::store::RegistryStore;

// ============================================================================
// Advertisement
// ============================================================================

/// A published instance record with its heartbeat running.
#[derive(Debug)]
pub struct Advertisement {
    record: InstanceRecord,
    emitter: HeartbeatEmitter,
    store: RegistryStore,
}

impl Advertisement {
    /// Registers the record and starts its heartbeat.
    ///
    /// Must be called from within a Tokio runtime. If registration fails
    /// nothing is spawned and no file is left behind.
    pub fn publish(store: RegistryStore, record: InstanceRecord) -> RegistryResult<Self> {
        store.register(&record)?;
        let mut emitter = HeartbeatEmitter::new(store.clone(), record.instance_id.clone());
        emitter.start();
        Ok(Self {
            record,
            emitter,
            store,
        })
    }

    /// The record as it was published.
    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    /// Whether the heartbeat task is currently alive.
    pub fn heartbeat_is_running(&self) -> bool {
        self.emitter.is_running()
    }

    /// Stops the heartbeat and removes the record from the registry.
    pub async fn withdraw(mut self) -> RegistryResult<()> {
        self.emitter.stop().await;
        self.store.delete(&self.record.instance_id)
    }
}
