//! Method call arguments and replies.

use crate::error::AgentError;
use crate::property::PropertyValue;
use serde::{Deserialize, Serialize};

/// Positional arguments of a method call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodArgs {
    values: Vec<PropertyValue>,
}

impl MethodArgs {
    pub fn new(values: Vec<PropertyValue>) -> Self {
        Self { values }
    }

    /// Arguments given as plain text, e.g. from the command line.
    pub fn from_strings<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            raw.into_iter()
                .map(|s| PropertyValue::Str(s.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PropertyValue> {
        self.values.get(index)
    }

    /// Required string argument.
    pub fn str(&self, index: usize, name: &str) -> Result<String, AgentError> {
        match self.values.get(index) {
            Some(PropertyValue::Str(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(missing(name)),
        }
    }

    /// Optional string argument; absent means `default`.
    pub fn str_or(&self, index: usize, default: &str) -> String {
        self.values
            .get(index)
            .map(|v| v.to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Required unsigned argument. Numeric text is accepted.
    pub fn u32(&self, index: usize, name: &str) -> Result<u32, AgentError> {
        let value = self.values.get(index).ok_or_else(|| missing(name))?;
        let parsed = match value {
            PropertyValue::Str(s) => s.trim().parse::<u32>().ok(),
            other => other.as_integer().and_then(|n| u32::try_from(n).ok()),
        };
        parsed.ok_or_else(|| {
            AgentError::InvalidArguments(format!("argument '{}' must be a uint32, got {}", name, value))
        })
    }
}

fn missing(name: &str) -> AgentError {
    AgentError::InvalidArguments(format!("missing argument '{}'", name))
}

/// Output arguments of a method call, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodReply {
    pub values: Vec<PropertyValue>,
}

impl MethodReply {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(value: impl Into<PropertyValue>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    pub fn first(&self) -> Option<&PropertyValue> {
        self.values.first()
    }
}
