//! Liveness policy for registered instances.
//!
//! A record is reclaimed only when two independent signals agree:
//!
//! 1. **Stale**: the last heartbeat is older than the configured timeout.
//! 2. **Dead**: the owning process no longer exists.
//!
//! Either signal alone is survivable. A debugger-suspended or heavily
//! loaded registrant stops heartbeating but keeps its process alive, so its
//! record stays. Conversely a freshly crashed registrant has no process but
//! a recent timestamp, and its record stays until the timestamp ages out.
//! Only the combination marks an instance abandoned.

use std::time::Duration;

use crate::record::InstanceRecord;

// ============================================================================
// Process Probing
// ============================================================================

/// Returns true if a process with the given pid currently exists.
///
/// Reads the procfs entry for the pid rather than signalling it, so the
/// probe works on processes owned by other users and never touches the
/// target. Pid 0 (the kernel scheduler slot) is reported as nonexistent:
/// records carrying it come from writers that failed to capture their own
/// pid, and treating them as immortal would leak them forever.
#[must_use]
pub fn process_exists(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    procfs::process::Process::new(pid as i32).is_ok()
}

// ============================================================================
// Reaping Decision
// ============================================================================

/// Returns true if the record should be removed from the registry.
///
/// Implements the dual condition described at the module level: stale
/// heartbeat AND dead owner. The staleness check runs first because it is
/// a pure arithmetic comparison; the process probe hits procfs and is only
/// consulted when the timestamp has already aged out.
#[must_use]
pub fn should_reap(record: &InstanceRecord, stale_timeout: Duration) -> bool {
    record.is_stale(stale_timeout) && !process_exists(record.pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{now_epoch_secs, InstanceId};

    const STALE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Pid that no real system will have allocated.
    const DEAD_PID: u32 = 999_999_999;

    fn record_with(pid: u32, heartbeat: f64) -> InstanceRecord {
        let mut record = InstanceRecord::new(
            InstanceId::new("liveness-test"),
            "127.0.0.1",
            13337,
            "sample.exe",
            "",
            pid,
        );
        record.last_heartbeat = heartbeat;
        record
    }

    #[test]
    fn test_current_process_exists() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn test_init_process_exists() {
        assert!(process_exists(1));
    }

    #[test]
    fn test_unallocated_pid_does_not_exist() {
        assert!(!process_exists(DEAD_PID));
    }

    #[test]
    fn test_pid_zero_does_not_exist() {
        assert!(!process_exists(0));
    }

    #[test]
    fn test_fresh_live_record_survives() {
        let record = record_with(std::process::id(), now_epoch_secs());
        assert!(!should_reap(&record, STALE_TIMEOUT));
    }

    #[test]
    fn test_fresh_dead_record_survives() {
        // Recent heartbeat protects a record even when the process is gone.
        let record = record_with(DEAD_PID, now_epoch_secs());
        assert!(!should_reap(&record, STALE_TIMEOUT));
    }

    #[test]
    fn test_stale_live_record_survives() {
        // A live process protects a record even when its heartbeat lapsed.
        let record = record_with(std::process::id(), now_epoch_secs() - 3_600.0);
        assert!(!should_reap(&record, STALE_TIMEOUT));
    }

    #[test]
    fn test_stale_dead_record_is_reaped() {
        let record = record_with(DEAD_PID, now_epoch_secs() - 3_600.0);
        assert!(should_reap(&record, STALE_TIMEOUT));
    }

    #[test]
    fn test_stale_pid_zero_record_is_reaped() {
        let record = record_with(0, now_epoch_secs() - 3_600.0);
        assert!(should_reap(&record, STALE_TIMEOUT));
    }
}
