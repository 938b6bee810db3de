//! Configuration application.
//!
//! Keys, the file-backed record store, scheme-selected backends and the
//! runner that ties them together.

pub mod backend;
pub mod key;
pub mod runner;
pub mod store;

pub use backend::{BackendRegistry, CommandBackend, ConfigBackend, ConfigSource, UriFetcher};
pub use key::ConfigKey;
pub use runner::{ConfigRunner, RunState, ALREADY_CONFIGURED_STATUS, FLAG_FORCE, UNKNOWN_STATUS};
pub use store::ConfigRecordStore;
