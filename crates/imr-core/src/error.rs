//! Error types for registry operations.
//!
//! Only failures the caller can act on become errors. Absence is reported
//! through `Option` and `bool` returns, and a corrupt record file is
//! repaired in place (deleted with a warning) rather than surfaced, so a
//! single bad writer cannot wedge every reader of the shared directory.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::InstanceId;

/// Errors from registry storage, allocation, and encoding.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An I/O operation on the registry directory failed.
    ///
    /// Carries the path that was being touched so multi-registry processes
    /// can tell which directory misbehaved.
    #[error("registry storage failure at {}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every port in the configured range was taken or unbindable.
    #[error("no available port in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    /// A record could not be serialized for persistence.
    #[error("failed to encode record for instance {instance_id}")]
    Encode {
        instance_id: InstanceId,
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_displays_path() {
        let err = RegistryError::Storage {
            path: PathBuf::from("/tmp/registry/abc.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/registry/abc.json"), "got: {msg}");
    }

    #[test]
    fn test_ports_exhausted_displays_range() {
        let err = RegistryError::PortsExhausted {
            start: 13337,
            end: 13437,
        };
        let msg = err.to_string();
        assert!(msg.contains("13337"), "got: {msg}");
        assert!(msg.contains("13437"), "got: {msg}");
    }

    #[test]
    fn test_storage_error_preserves_source() {
        use std::error::Error as _;

        let err = RegistryError::Storage {
            path: PathBuf::from("/tmp/registry"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.source().is_some());
    }
}
