//! Registered property set for one agent.

use super::types::{resolve_type, NativeType, PropertySpec};
use crate::error::AgentError;
use std::collections::HashMap;
use tracing::{debug, error};

/// A schema entry together with its resolved native type.
#[derive(Debug, Clone)]
pub struct RegisteredProperty {
    pub spec: PropertySpec,
    pub native: NativeType,
}

/// Property registry
///
/// Keeps registration order for listing and a name index for lookup.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    properties: Vec<RegisteredProperty>,
    index: HashMap<String, usize>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single property.
    ///
    /// Fails with `UnknownPropertyType` for an unrecognised tag and with
    /// `InvalidArguments` when the name is empty or already registered.
    pub fn register(&mut self, spec: PropertySpec) -> Result<(), AgentError> {
        if spec.name.trim().is_empty() {
            return Err(AgentError::InvalidArguments(
                "property name cannot be empty".to_string(),
            ));
        }
        if self.index.contains_key(&spec.name) {
            return Err(AgentError::InvalidArguments(format!(
                "property {} is already registered",
                spec.name
            )));
        }
        let native = resolve_type(&spec.type_tag)?;
        debug!(property = %spec.name, tag = %spec.type_tag, native = %native, "Registered property");
        self.index.insert(spec.name.clone(), self.properties.len());
        self.properties.push(RegisteredProperty { spec, native });
        Ok(())
    }

    /// Register a schema, skipping bad entries.
    ///
    /// One bad entry is logged and skipped; the remaining properties are still
    /// registered. Returns the number of properties registered.
    pub fn register_all<I>(&mut self, specs: I) -> usize
    where
        I: IntoIterator<Item = PropertySpec>,
    {
        let mut registered = 0;
        for spec in specs {
            let name = spec.name.clone();
            match self.register(spec) {
                Ok(()) => registered += 1,
                Err(e) => error!(property = %name, error = %e, "Skipping property registration"),
            }
        }
        registered
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProperty> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProperty> {
        self.properties.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.spec.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::types::Access;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PropertyRegistry::new();
        registry
            .register(PropertySpec::read_only("hostname", "Hostname", "sstr"))
            .unwrap();
        registry
            .register(PropertySpec::read_write("update_interval", "Interval", "uint32"))
            .unwrap();

        let prop = registry.get("update_interval").unwrap();
        assert_eq!(prop.native, NativeType::UInt);
        assert_eq!(prop.spec.access, Access::ReadWrite);
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["hostname", "update_interval"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = PropertyRegistry::new();
        registry
            .register(PropertySpec::read_only("uuid", "UUID", "sstr"))
            .unwrap();
        let err = registry
            .register(PropertySpec::read_only("uuid", "UUID again", "lstr"))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_all_is_fail_soft() {
        let mut registry = PropertyRegistry::new();
        let count = registry.register_all(vec![
            PropertySpec::read_only("a", "", "sstr"),
            PropertySpec::read_only("b", "", "blob"),
            PropertySpec::read_only("c", "", "uint64"),
        ]);
        assert_eq!(count, 2);
        assert!(registry.contains("a"));
        assert!(!registry.contains("b"));
        assert!(registry.contains("c"));
    }
}
