//! Events broadcast on an agent's signal channel.

use crate::property::PropertyValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// A named event with positional arguments in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub name: String,
    pub args: Vec<PropertyValue>,
    pub emitted_at: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(name: &str, args: Vec<PropertyValue>) -> Self {
        Self {
            name: name.to_string(),
            args,
            emitted_at: Utc::now(),
        }
    }

    /// `heartbeat(timestamp: int64 ns, sequence: uint32, hostname, uuid)`
    pub fn heartbeat(timestamp_ns: i64, sequence: u32, hostname: &str, uuid: &str) -> Self {
        Self::new(
            HEARTBEAT_EVENT,
            vec![
                PropertyValue::Int64(timestamp_ns),
                PropertyValue::UInt(sequence),
                PropertyValue::Str(hostname.to_string()),
                PropertyValue::Str(uuid.to_string()),
            ],
        )
    }

    /// Sequence number if this is a heartbeat event.
    pub fn heartbeat_sequence(&self) -> Option<u32> {
        if self.name != HEARTBEAT_EVENT {
            return None;
        }
        match self.args.get(1) {
            Some(PropertyValue::UInt(seq)) => Some(*seq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_layout() {
        let event = AgentEvent::heartbeat(1_000_000_000, 4, "node1", "abc");
        assert_eq!(event.name, "heartbeat");
        assert_eq!(event.args[0], PropertyValue::Int64(1_000_000_000));
        assert_eq!(event.heartbeat_sequence(), Some(4));
        assert_eq!(event.args[2].as_str(), Some("node1"));
        assert_eq!(event.args[3].as_str(), Some("abc"));
        assert_eq!(AgentEvent::new("other", vec![]).heartbeat_sequence(), None);
    }

    #[test]
    fn test_event_timestamp_serializes() {
        let event = AgentEvent::heartbeat(7, 1, "node1", "abc");
        let json = serde_json::to_value(&event).unwrap();
        let stamp = json["emitted_at"].as_str().unwrap();
        assert_eq!(DateTime::parse_from_rfc3339(stamp).unwrap(), event.emitted_at);

        let back: AgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
