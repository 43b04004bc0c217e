//! Registry configuration.
//!
//! All tunables live in one injected [`RegistryConfig`] value rather than
//! process-wide globals, so tests and embedders can point a store at a
//! private directory with private timings without touching the
//! environment.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Ports tried by the allocator, half-open.
pub const DEFAULT_PORT_RANGE: Range<u16> = 13337..13437;

/// Heartbeats older than this mark a record stale.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between heartbeat refreshes. Half the stale timeout, so one
/// missed beat never strands a live instance in the stale state.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Longest a heartbeat shutdown waits for the emitter task to finish.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory component under the home directory holding registry state.
const REGISTRY_SUBDIR: &str = ".ida-mcp";

/// Directory component holding the per-instance record files.
const INSTANCES_SUBDIR: &str = "instances";

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for one registry: where records live and how liveness behaves.
///
/// Construct with [`RegistryConfig::new`] for a custom directory or
/// [`RegistryConfig::default`] for the shared per-user registry, then
/// adjust with the `with_*` builders as needed.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding one `<instance_id>.json` file per record.
    pub root_dir: PathBuf,

    /// Ports the allocator may hand out, half-open.
    pub port_range: Range<u16>,

    /// Heartbeat age beyond which a record counts as stale.
    pub stale_timeout: Duration,

    /// Interval between heartbeat refreshes.
    pub heartbeat_interval: Duration,

    /// Longest a heartbeat shutdown waits for its task to finish.
    pub stop_timeout: Duration,
}

impl RegistryConfig {
    /// Creates a configuration rooted at the given directory with default
    /// timings and port range.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            port_range: DEFAULT_PORT_RANGE,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// The shared per-user registry directory: `~/.ida-mcp/instances`.
    ///
    /// Every cooperating process must derive the same path for discovery to
    /// work, so this resolves through the home directory rather than any
    /// per-process state. Falls back to `/tmp` when no home is available.
    pub fn default_root_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(REGISTRY_SUBDIR)
            .join(INSTANCES_SUBDIR)
    }

    /// Replaces the allocator port range.
    #[must_use]
    pub fn with_port_range(mut self, range: Range<u16>) -> Self {
        self.port_range = range;
        self
    }

    /// Replaces the staleness timeout.
    #[must_use]
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = timeout;
        self
    }

    /// Replaces the heartbeat refresh interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Replaces the heartbeat shutdown wait.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(Self::default_root_dir())
    }
}
