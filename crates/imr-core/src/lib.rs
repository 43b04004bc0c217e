//! Core domain types for the instance registry.
//!
//! This crate defines the vocabulary shared by every registry participant:
//!
//! - [`record`]: the [`InstanceRecord`] persisted per instance and its
//!   [`InstanceId`] key
//! - [`liveness`]: the stale-and-dead policy deciding when a record may be
//!   reclaimed
//! - [`config`]: the injected [`RegistryConfig`] carrying directory, port
//!   range, and timing tunables
//! - [`error`]: the [`RegistryError`] taxonomy for storage and allocation
//!   failures
//!
//! Storage, port allocation, and heartbeating live in `imr-registry`; this
//! crate stays free of I/O side effects apart from the procfs read backing
//! the liveness probe.

pub mod config;
pub mod error;
pub mod liveness;
pub mod record;

// Re-export the types nearly every consumer touches.
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use record::{InstanceId, InstanceRecord};
