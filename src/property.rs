//! Property Registry & Type Mapper
//!
//! Translates static property schemas into typed storage descriptors and keeps
//! the registered set an agent exposes through the remote property protocol.

pub mod registry;
pub mod types;
pub mod value;

pub use registry::{PropertyRegistry, RegisteredProperty};
pub use types::{resolve_type, Access, NativeType, PropertySpec};
pub use value::PropertyValue;
