//! Instance record entities and identifiers.
//!
//! An [`InstanceRecord`] describes one advertised endpoint: which binary a
//! host process has loaded, where its endpoint listens, which process owns
//! it, and when it last proved liveness. Records are persisted one file per
//! instance as flat, human-readable JSON; the `timestamp` field rename
//! below pins the on-disk contract.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a registered instance.
///
/// Wraps an opaque string chosen by the registrant (e.g., "a3f91c02").
/// The id doubles as the storage key: the record for id `x` lives in
/// `<registry>/x.json`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Length of generated identifiers.
    const GENERATED_LEN: usize = 8;

    /// Creates an InstanceId from a string.
    ///
    /// Note: This does not validate the format. The registrant chooses the
    /// id and is responsible for its uniqueness.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh 8-character lowercase-hex identifier.
    ///
    /// Matches the id shape host tooling conventionally produces (the first
    /// 8 hex digits of a v4 UUID).
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex.get(..Self::GENERATED_LEN).unwrap_or(&hex).to_string())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Time Helpers
// ============================================================================

/// Returns the current time as floating-point seconds since the Unix epoch.
///
/// This is the clock the persisted `timestamp` field uses. Falls back to 0.0
/// if the system clock reads before the epoch.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ============================================================================
// Instance Record
// ============================================================================

/// Persisted descriptor of one advertised endpoint.
///
/// Serializes to the flat JSON object stored as `<instance_id>.json` in the
/// registry directory:
///
/// ```json
/// {
///   "instance_id": "a3f91c02",
///   "host": "127.0.0.1",
///   "port": 13337,
///   "binary_name": "malware.exe",
///   "binary_path": "/samples/malware.exe",
///   "pid": 41523,
///   "timestamp": 1734628312.123
/// }
/// ```
///
/// Unknown extra fields are ignored on read, and `binary_path` may be
/// absent (it reads as empty). Any other missing field makes the file
/// unparsable and therefore garbage (see `RegistryStore`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Storage key, immutable for the record's lifetime.
    pub instance_id: InstanceId,

    /// Host the endpoint listens on (conventionally "127.0.0.1").
    pub host: String,

    /// Port the endpoint listens on. Advisorily unique among live records.
    pub port: u16,

    /// Name of the loaded binary, matched case-insensitively by lookup.
    pub binary_name: String,

    /// Full path of the loaded binary. May be empty; a record file that
    /// omits the field entirely reads as empty.
    #[serde(default)]
    pub binary_path: String,

    /// OS process id of the registrant, used solely by the liveness probe.
    pub pid: u32,

    /// Seconds since the Unix epoch of the last heartbeat. Never moves
    /// backward for a given record.
    #[serde(rename = "timestamp")]
    pub last_heartbeat: f64,
}

impl InstanceRecord {
    /// Creates a record stamped with the current time.
    ///
    /// The caller supplies every descriptive field; `last_heartbeat` starts
    /// at now.
    pub fn new(
        instance_id: InstanceId,
        host: impl Into<String>,
        port: u16,
        binary_name: impl Into<String>,
        binary_path: impl Into<String>,
        pid: u32,
    ) -> Self {
        Self {
            instance_id,
            host: host.into(),
            port,
            binary_name: binary_name.into(),
            binary_path: binary_path.into(),
            pid,
            last_heartbeat: now_epoch_secs(),
        }
    }

    /// Creates a record owned by the calling process.
    pub fn for_current_process(
        instance_id: InstanceId,
        host: impl Into<String>,
        port: u16,
        binary_name: impl Into<String>,
        binary_path: impl Into<String>,
    ) -> Self {
        Self::new(
            instance_id,
            host,
            port,
            binary_name,
            binary_path,
            std::process::id(),
        )
    }

    /// Advances `last_heartbeat` to the current time.
    ///
    /// Takes the max of now and the stored value, so the timestamp never
    /// moves backward even if the system clock does.
    pub fn touch(&mut self) {
        self.last_heartbeat = now_epoch_secs().max(self.last_heartbeat);
    }

    /// Seconds elapsed since the last heartbeat, clamped at zero.
    #[must_use]
    pub fn heartbeat_age_secs(&self) -> f64 {
        (now_epoch_secs() - self.last_heartbeat).max(0.0)
    }

    /// Returns true if the last heartbeat is older than `timeout`.
    ///
    /// Staleness alone does not make the record reapable; the owning
    /// process must also be dead (see the liveness module).
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.heartbeat_age_secs() > timeout.as_secs_f64()
    }

    /// The last heartbeat as a UTC datetime, for display layers.
    ///
    /// Returns `None` if the stored value is not a representable time.
    pub fn heartbeat_time(&self) -> Option<DateTime<Utc>> {
        if !self.last_heartbeat.is_finite() {
            return None;
        }
        let secs = self.last_heartbeat.trunc() as i64;
        let nanos = (self.last_heartbeat.fract() * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// The endpoint address in `host:port` form.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
