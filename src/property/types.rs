//! Property schema entries and the type-tag mapping.

use super::value::PropertyValue;
use crate::error::AgentError;
use std::collections::BTreeMap;
use std::fmt;

/// Access flags for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn is_writable(self) -> bool {
        self == Access::ReadWrite
    }
}

/// Static schema entry for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub description: String,
    /// Declared type tag, e.g. `sstr`, `uint32`, `absTime`, `map`
    pub type_tag: String,
    pub access: Access,
}

impl PropertySpec {
    pub fn read_only(name: &str, description: &str, type_tag: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            type_tag: type_tag.to_string(),
            access: Access::ReadOnly,
        }
    }

    pub fn read_write(name: &str, description: &str, type_tag: &str) -> Self {
        Self {
            access: Access::ReadWrite,
            ..Self::read_only(name, description, type_tag)
        }
    }
}

/// Native storage descriptor a type tag resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Text,
    Int,
    Int64,
    UInt,
    UInt64,
    Bool,
    Float,
    Double,
    Map,
    List,
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeType::Text => "string",
            NativeType::Int => "int32",
            NativeType::Int64 => "int64",
            NativeType::UInt => "uint32",
            NativeType::UInt64 => "uint64",
            NativeType::Bool => "bool",
            NativeType::Float => "float",
            NativeType::Double => "double",
            NativeType::Map => "map",
            NativeType::List => "list",
        };
        f.write_str(name)
    }
}

fn has_width_suffix(tag: &str, prefix: &str) -> bool {
    match tag.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Resolve a schema type tag into its native descriptor.
///
/// The explicit 64-bit and time tags are checked before the generic
/// `int`/`uint` width families.
pub fn resolve_type(tag: &str) -> Result<NativeType, AgentError> {
    let native = match tag {
        "sstr" | "lstr" => NativeType::Text,
        "int64" | "absTime" => NativeType::Int64,
        "uint64" | "deltaTime" => NativeType::UInt64,
        "bool" => NativeType::Bool,
        "float" => NativeType::Float,
        "double" => NativeType::Double,
        "map" => NativeType::Map,
        "list" => NativeType::List,
        t if has_width_suffix(t, "uint") => NativeType::UInt,
        t if has_width_suffix(t, "int") => NativeType::Int,
        other => return Err(AgentError::UnknownPropertyType(other.to_string())),
    };
    Ok(native)
}

fn out_of_range(native: NativeType, value: &PropertyValue) -> AgentError {
    AgentError::InvalidArguments(format!("value {} is out of range for {}", value, native))
}

fn type_mismatch(native: NativeType, value: &PropertyValue) -> AgentError {
    AgentError::InvalidArguments(format!(
        "expected {} value, got {}",
        native,
        value.type_name()
    ))
}

impl NativeType {
    /// Convert a value into this native representation.
    ///
    /// Integers widen or narrow only when the value fits; floats accept any
    /// finite value inside the IEEE range of the target width.
    pub fn coerce(self, value: PropertyValue) -> Result<PropertyValue, AgentError> {
        match self {
            NativeType::Text => match value {
                PropertyValue::Str(_) => Ok(value),
                other => Err(type_mismatch(self, &other)),
            },
            NativeType::Bool => match value {
                PropertyValue::Bool(_) => Ok(value),
                other => Err(type_mismatch(self, &other)),
            },
            NativeType::Map => match value {
                PropertyValue::Map(_) => Ok(value),
                other => Err(type_mismatch(self, &other)),
            },
            NativeType::List => match value {
                PropertyValue::List(_) => Ok(value),
                other => Err(type_mismatch(self, &other)),
            },
            NativeType::Int | NativeType::Int64 | NativeType::UInt | NativeType::UInt64 => {
                let Some(n) = value.as_integer() else {
                    return Err(type_mismatch(self, &value));
                };
                let converted = match self {
                    NativeType::Int => i32::try_from(n).ok().map(PropertyValue::Int),
                    NativeType::Int64 => i64::try_from(n).ok().map(PropertyValue::Int64),
                    NativeType::UInt => u32::try_from(n).ok().map(PropertyValue::UInt),
                    _ => u64::try_from(n).ok().map(PropertyValue::UInt64),
                };
                converted.ok_or_else(|| out_of_range(self, &value))
            }
            NativeType::Float | NativeType::Double => {
                let f = match &value {
                    PropertyValue::Float(f) => f64::from(*f),
                    PropertyValue::Double(d) => *d,
                    other => match other.as_integer() {
                        Some(n) => n as f64,
                        None => return Err(type_mismatch(self, other)),
                    },
                };
                if !f.is_finite() {
                    return Err(out_of_range(self, &value));
                }
                if self == NativeType::Float {
                    if f.abs() > f64::from(f32::MAX) {
                        return Err(out_of_range(self, &value));
                    }
                    Ok(PropertyValue::Float(f as f32))
                } else {
                    Ok(PropertyValue::Double(f))
                }
            }
        }
    }

    /// Parse textual input (command line, config) into a value of this type.
    ///
    /// Maps use `key=value` pairs separated by commas, lists are comma separated.
    pub fn parse_value(self, raw: &str) -> Result<PropertyValue, AgentError> {
        let invalid = || {
            AgentError::InvalidArguments(format!("cannot parse '{}' as {}", raw, self))
        };
        let value = match self {
            NativeType::Text => PropertyValue::Str(raw.to_string()),
            NativeType::Int => PropertyValue::Int(raw.trim().parse().map_err(|_| invalid())?),
            NativeType::Int64 => PropertyValue::Int64(raw.trim().parse().map_err(|_| invalid())?),
            NativeType::UInt => PropertyValue::UInt(raw.trim().parse().map_err(|_| invalid())?),
            NativeType::UInt64 => {
                PropertyValue::UInt64(raw.trim().parse().map_err(|_| invalid())?)
            }
            NativeType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => PropertyValue::Bool(true),
                "false" | "0" | "no" => PropertyValue::Bool(false),
                _ => return Err(invalid()),
            },
            NativeType::Float => PropertyValue::Float(raw.trim().parse().map_err(|_| invalid())?),
            NativeType::Double => {
                PropertyValue::Double(raw.trim().parse().map_err(|_| invalid())?)
            }
            NativeType::Map => {
                let mut map = BTreeMap::new();
                for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
                    let (k, v) = pair.split_once('=').ok_or_else(invalid)?;
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
                PropertyValue::Map(map)
            }
            NativeType::List => PropertyValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        };
        self.coerce(value)
    }
}
