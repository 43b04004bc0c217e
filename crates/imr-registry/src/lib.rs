//! Filesystem-backed local instance registry.
//!
//! Lets multiple long-lived processes on one machine advertise service
//! endpoints and discover each other with no broker process and no lock
//! files. State is a shared directory of JSON record files; coordination
//! comes from atomic renames, idempotent deletes, and a conservative
//! reclamation policy instead of any runtime coordination point.
//!
//! The pieces, bottom up:
//!
//! - [`store::RegistryStore`]: CRUD over the record directory, with
//!   corrupt-file hygiene and reap-on-list
//! - [`store::RegistryStore::find_by_binary_name`]: case-insensitive
//!   discovery by binary name
//! - [`ports::PortAllocator`]: advisory first-fit port allocation backed
//!   by a real OS bind probe
//! - [`heartbeat::HeartbeatEmitter`]: the background task keeping one
//!   record's timestamp fresh
//! - [`advertise::Advertisement`]: register-plus-heartbeat bundled into
//!   one lifecycle value
//!
//! Domain types (records, liveness policy, configuration, errors) live in
//! `imr-core`.

pub mod advertise;
pub mod heartbeat;
pub mod ports;
pub mod store;

mod lookup;

pub use advertise::Advertisement;
pub use heartbeat::HeartbeatEmitter;
pub use ports::PortAllocator;
pub use store::RegistryStore;
