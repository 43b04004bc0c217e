//! Name-based instance discovery.
//!
//! Callers usually know which binary they want to talk about, not which
//! instance id happens to serve it. Lookup bridges that gap: match the
//! binary name case-insensitively over the live listing and return one
//! record deterministically.

use tracing::debug;

use imr_core::error::RegistryResult;
use imr_core::record::InstanceRecord;

use crate::store::RegistryStore;

impl RegistryStore {
    /// Finds a live instance whose binary name matches, ignoring case.
    ///
    /// The listing runs with reaping enabled, so an abandoned record can
    /// never be resolved. When several live instances carry the same
    /// binary name, the one with the smallest instance id wins; the
    /// listing is already sorted that way, which makes repeated lookups
    /// agree across processes.
    pub fn find_by_binary_name(
        &self,
        binary_name: &str,
    ) -> RegistryResult<Option<InstanceRecord>> {
        let needle = binary_name.to_lowercase();
        let found = self
            .list(false)?
            .into_iter()
            .find(|record| record.binary_name.to_lowercase() == needle);

        match &found {
            Some(record) => {
                debug!(binary_name, instance_id = %record.instance_id, "resolved binary name");
            }
            None => {
                debug!(binary_name, "no live instance for binary name");
            }
        }
        Ok(found)
    }
}
