//! Filesystem-backed record store.
//!
//! The registry is a directory of JSON files, one per instance, keyed by
//! instance id. There is no daemon and no lock file: every cooperating
//! process reads and writes the directory directly, and coordination rests
//! on two properties of the storage layer:
//!
//! - **Atomic visibility**: records are written to a temp file in the same
//!   directory and renamed into place, so readers observe either the old
//!   record or the new one, never a torn write.
//! - **Self-healing reads**: a file that fails to parse is deleted on
//!   sight with a warning. One crashed or buggy writer cannot wedge the
//!   directory for everyone else.
//!
//! Reclamation of abandoned records happens as a side effect of listing
//! (and via [`RegistryStore::reap_all`]), gated by the dual stale-and-dead
//! condition in `imr_core::liveness`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use imr_core::config::RegistryConfig;
use imr_core::error::{RegistryError, RegistryResult};
use imr_core::liveness;
use imr_core::record::{InstanceId, InstanceRecord};

/// Distinguishes temp files written concurrently by one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Registry Store
// ============================================================================

/// Handle to one registry directory.
///
/// Stateless apart from its configuration: every operation goes to the
/// filesystem, so handles are cheap to clone and freely shared across
/// threads and tasks. Two handles with the same `root_dir` observe the
/// same registry, whether they live in one process or many.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    config: RegistryConfig,
}

impl RegistryStore {
    /// Creates a store over the directory named by `config`.
    ///
    /// The directory itself is created lazily by the first write or list.
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Path of the record file for an instance id.
    fn record_path(&self, id: &InstanceId) -> PathBuf {
        self.config.root_dir.join(format!("{id}.json"))
    }

    /// Path for an in-flight write. Lives in the registry directory so the
    /// final rename stays on one filesystem, but carries a `.tmp` extension
    /// so directory scans never pick it up.
    fn temp_path(&self, id: &InstanceId) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.config
            .root_dir
            .join(format!("{id}.{}-{seq}.tmp", std::process::id()))
    }

    fn ensure_root(&self) -> RegistryResult<()> {
        fs::create_dir_all(&self.config.root_dir).map_err(|source| RegistryError::Storage {
            path: self.config.root_dir.clone(),
            source,
        })
    }

    /// Writes serialized JSON to the record file via a temp file and an
    /// atomic rename.
    fn write_atomic(&self, id: &InstanceId, json: String) -> RegistryResult<()> {
        let temp = self.temp_path(id);
        fs::write(&temp, json).map_err(|source| RegistryError::Storage {
            path: temp.clone(),
            source,
        })?;

        let path = self.record_path(id);
        fs::rename(&temp, &path).map_err(|source| {
            let _ = fs::remove_file(&temp);
            RegistryError::Storage { path, source }
        })
    }

    /// Serializes a record and moves it into place atomically.
    fn write_record(&self, record: &InstanceRecord) -> RegistryResult<()> {
        let json =
            serde_json::to_string_pretty(record).map_err(|source| RegistryError::Encode {
                instance_id: record.instance_id.clone(),
                source,
            })?;
        self.write_atomic(&record.instance_id, json)
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Persists a record, creating the registry directory if needed.
    ///
    /// Registering an id that already exists overwrites the old record;
    /// the id owner is always entitled to replace its own entry.
    pub fn register(&self, record: &InstanceRecord) -> RegistryResult<()> {
        self.ensure_root()?;
        self.write_record(record)?;
        info!(
            instance_id = %record.instance_id,
            binary_name = %record.binary_name,
            endpoint = %record.endpoint(),
            pid = record.pid,
            "registered instance"
        );
        Ok(())
    }

    /// Loads the record for an id, without any liveness filtering.
    ///
    /// Returns `None` when no record exists or when the file on disk is
    /// unreadable. A file that exists but fails to parse, including one
    /// that is not valid UTF-8, is deleted here per the self-healing rule.
    pub fn get(&self, id: &InstanceId) -> Option<InstanceRecord> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(instance_id = %id, error = %e, "failed to read record file");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(instance_id = %id, error = %e, "deleting corrupt record file");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Removes the record for an id.
    ///
    /// Deleting an absent record is a success: the caller wanted it gone
    /// and it is gone. Registrant shutdown paths and concurrent reapers
    /// both rely on this being idempotent.
    pub fn delete(&self, id: &InstanceId) -> RegistryResult<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(instance_id = %id, "unregistered instance");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(instance_id = %id, "record already absent");
                Ok(())
            }
            Err(source) => Err(RegistryError::Storage { path, source }),
        }
    }

    /// Advances the heartbeat timestamp of an existing record.
    ///
    /// Returns `Ok(false)` when the record is missing (including the case
    /// where it was corrupt and got deleted by the read), so a heartbeat
    /// arriving after unregistration is a no-op rather than a resurrection.
    /// Only a failed rewrite is an error. The rewrite patches the
    /// `timestamp` key of the raw stored object, so fields written by a
    /// newer version survive a refresh by this one.
    pub fn refresh(&self, id: &InstanceId) -> RegistryResult<bool> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                warn!(instance_id = %id, error = %e, "failed to read record file");
                return Ok(false);
            }
        };

        let parsed = serde_json::from_slice::<serde_json::Value>(&bytes).and_then(|raw| {
            let record: InstanceRecord = serde_json::from_value(raw.clone())?;
            Ok((raw, record))
        });
        let (mut raw, mut record) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(instance_id = %id, error = %e, "deleting corrupt record file");
                let _ = fs::remove_file(&path);
                return Ok(false);
            }
        };

        record.touch();
        if let Some(object) = raw.as_object_mut() {
            object.insert("timestamp".to_string(), record.last_heartbeat.into());
        }

        let json = serde_json::to_string_pretty(&raw).map_err(|source| RegistryError::Encode {
            instance_id: id.clone(),
            source,
        })?;
        self.write_atomic(id, json)?;
        debug!(instance_id = %id, "refreshed heartbeat");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Listing and Reaping
    // ------------------------------------------------------------------

    /// Lists records, sorted ascending by instance id.
    ///
    /// With `include_stale = false` (the normal discovery path), records
    /// whose owner is both stale and dead are deleted during the scan and
    /// excluded from the result. With `include_stale = true` the scan is
    /// read-only apart from corrupt-file hygiene, which always applies.
    pub fn list(&self, include_stale: bool) -> RegistryResult<Vec<InstanceRecord>> {
        let (records, _removed) = self.scan(!include_stale)?;
        Ok(records)
    }

    /// Deletes every reapable record and returns how many files were
    /// removed. Corrupt files count toward the total; they occupied a
    /// registry slot and no longer do.
    pub fn reap_all(&self) -> RegistryResult<usize> {
        let (_records, removed) = self.scan(true)?;
        if removed > 0 {
            info!(removed, "reaped abandoned instances");
        }
        Ok(removed)
    }

    /// Walks the registry directory once, returning surviving records in
    /// ascending id order plus the number of files deleted. When `reap` is
    /// set, records meeting the stale-and-dead condition are removed;
    /// corrupt files are removed unconditionally.
    fn scan(&self, reap: bool) -> RegistryResult<(Vec<InstanceRecord>, usize)> {
        self.ensure_root()?;

        let entries = fs::read_dir(&self.config.root_dir).map_err(|source| {
            RegistryError::Storage {
                path: self.config.root_dir.clone(),
                source,
            }
        })?;

        let mut records = Vec::new();
        let mut removed = 0;

        for entry in entries {
            let entry = entry.map_err(|source| RegistryError::Storage {
                path: self.config.root_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Raced with another reaper; the record is simply gone.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read record file");
                    continue;
                }
            };

            let record: InstanceRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "deleting corrupt record file");
                    if remove_record_file(&path) {
                        removed += 1;
                    }
                    continue;
                }
            };

            if reap && liveness::should_reap(&record, self.config.stale_timeout) {
                info!(
                    instance_id = %record.instance_id,
                    binary_name = %record.binary_name,
                    pid = record.pid,
                    "reaping abandoned instance"
                );
                if remove_record_file(&path) {
                    removed += 1;
                }
                continue;
            }

            records.push(record);
        }

        records.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok((records, removed))
    }
}

/// Best-effort deletion during a scan. Returns whether the file went away,
/// counting a concurrent deletion by another process as success.
fn remove_record_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete record file");
            false
        }
    }
}
