//! Port allocation for new instances.
//!
//! Allocation is advisory, not transactional. The allocator takes a
//! snapshot of ports claimed by live records, then walks the configured
//! range probing each remaining candidate with a real OS bind. The probe
//! socket is closed immediately, so another process can still steal the
//! port between allocation and the caller's own bind; callers treat a
//! failed bind as "ask again", not as a registry defect.
//!
//! Listing with reaping enabled doubles as garbage collection here:
//! ports held by abandoned records return to the pool the moment the
//! allocator scans past their corpses.

use std::collections::HashSet;
use std::net::TcpListener;

use tracing::debug;

use imr_core::error::{RegistryError, RegistryResult};

use crate::store::RegistryStore;

// ============================================================================
// Port Allocator
// ============================================================================

/// Finds free ports for new instances within the configured range.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    store: RegistryStore,
}

impl PortAllocator {
    /// Creates an allocator drawing from the store's configured range.
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }

    /// Returns the first port in the range that no live record claims and
    /// the OS will currently bind on `host`.
    ///
    /// The registry snapshot runs with reaping enabled, so records whose
    /// owners are gone do not pin their ports. Any bind failure, whatever
    /// the errno, just disqualifies that candidate.
    pub fn find_available(&self, host: &str) -> RegistryResult<u16> {
        let claimed: HashSet<u16> = self
            .store
            .list(false)?
            .iter()
            .map(|record| record.port)
            .collect();

        let range = self.store.config().port_range.clone();
        for port in range.clone() {
            if claimed.contains(&port) {
                continue;
            }
            match TcpListener::bind((host, port)) {
                Ok(probe) => {
                    drop(probe);
                    debug!(port, host, "allocated port");
                    return Ok(port);
                }
                Err(e) => {
                    debug!(port, host, error = %e, "port not bindable");
                }
            }
        }

        Err(RegistryError::PortsExhausted {
            start: range.start,
            end: range.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imr_core::config::RegistryConfig;
    use imr_core::record::{now_epoch_secs, InstanceId, InstanceRecord};
    use std::ops::Range;
    use tempfile::TempDir;

    /// Pid that no real system will have allocated.
    const DEAD_PID: u32 = 999_999_999;

    // Each test draws from its own port range so parallel tests cannot
    // collide on probe sockets.
    fn test_allocator(range: Range<u16>) -> (TempDir, RegistryStore, PortAllocator) {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(RegistryConfig::new(dir.path()).with_port_range(range));
        let allocator = PortAllocator::new(store.clone());
        (dir, store, allocator)
    }

    fn record_on_port(id: &str, port: u16) -> InstanceRecord {
        InstanceRecord::new(
            InstanceId::new(id),
            "127.0.0.1",
            port,
            format!("{id}.exe"),
            "",
            std::process::id(),
        )
    }

    #[test]
    fn test_empty_registry_yields_range_start() {
        let (_dir, _store, allocator) = test_allocator(47211..47214);
        let port = allocator.find_available("127.0.0.1").unwrap();
        assert_eq!(port, 47211);
    }

    #[test]
    fn test_skips_port_claimed_by_live_record() {
        let (_dir, store, allocator) = test_allocator(47221..47224);
        store.register(&record_on_port("holder", 47221)).unwrap();

        let port = allocator.find_available("127.0.0.1").unwrap();
        assert_eq!(port, 47222);
    }

    #[test]
    fn test_skips_port_bound_by_os() {
        let (_dir, _store, allocator) = test_allocator(47231..47234);
        let _occupier = TcpListener::bind(("127.0.0.1", 47231)).unwrap();

        let port = allocator.find_available("127.0.0.1").unwrap();
        assert_eq!(port, 47232);
    }

    #[test]
    fn test_abandoned_record_frees_its_port() {
        let (dir, store, allocator) = test_allocator(47241..47244);
        let mut corpse = record_on_port("corpse", 47241);
        corpse.pid = DEAD_PID;
        corpse.last_heartbeat = now_epoch_secs() - 3_600.0;
        store.register(&corpse).unwrap();

        let port = allocator.find_available("127.0.0.1").unwrap();
        assert_eq!(port, 47241);
        assert!(!dir.path().join("corpse.json").exists());
    }

    #[test]
    fn test_exhausted_range_reports_bounds() {
        let (_dir, store, allocator) = test_allocator(47251..47253);
        store.register(&record_on_port("a", 47251)).unwrap();
        store.register(&record_on_port("b", 47252)).unwrap();

        let err = allocator.find_available("127.0.0.1").unwrap_err();
        match err {
            RegistryError::PortsExhausted { start, end } => {
                assert_eq!(start, 47251);
                assert_eq!(end, 47253);
            }
            other => panic!("expected PortsExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_range_is_immediately_exhausted() {
        let (_dir, _store, allocator) = test_allocator(47261..47261);
        let err = allocator.find_available("127.0.0.1").unwrap_err();
        assert!(matches!(err, RegistryError::PortsExhausted { .. }));
    }
}
