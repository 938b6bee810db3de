use crate::support::{allow_all, attach_module};
use async_trait::async_trait;
use hostwarden::agent::Agent;
use hostwarden::auth::CallerContext;
use hostwarden::dispatch::{MethodArgs, MethodReply};
use hostwarden::error::{AgentError, ResultCode};
use hostwarden::modules::Module;
use hostwarden::property::{PropertySpec, PropertyValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const IFACE: &str = "org.hostwarden.Gauge";

/// Tag under test, the raw value the getter hands back, and the value the
/// caller must receive.
fn cases() -> Vec<(&'static str, PropertyValue, PropertyValue)> {
    let map: BTreeMap<String, String> = [("1".to_string(), "0.5".to_string())].into();
    vec![
        ("sstr", "short".into(), "short".into()),
        ("lstr", "long".into(), "long".into()),
        ("int8", PropertyValue::Int64(-8), PropertyValue::Int(-8)),
        ("int16", PropertyValue::UInt(16), PropertyValue::Int(16)),
        ("int32", PropertyValue::Int(-32), PropertyValue::Int(-32)),
        ("int64", PropertyValue::Int(-64), PropertyValue::Int64(-64)),
        ("uint8", PropertyValue::UInt64(8), PropertyValue::UInt(8)),
        ("uint16", PropertyValue::Int(16), PropertyValue::UInt(16)),
        ("uint32", PropertyValue::UInt(32), PropertyValue::UInt(32)),
        ("uint64", PropertyValue::UInt(64), PropertyValue::UInt64(64)),
        ("absTime", PropertyValue::UInt64(1_700_000_000), PropertyValue::Int64(1_700_000_000)),
        ("deltaTime", PropertyValue::Int64(30), PropertyValue::UInt64(30)),
        ("bool", PropertyValue::Bool(true), PropertyValue::Bool(true)),
        ("float", PropertyValue::Double(1.5), PropertyValue::Float(1.5)),
        ("double", PropertyValue::Float(2.5), PropertyValue::Double(2.5)),
        ("map", PropertyValue::Map(map.clone()), PropertyValue::Map(map)),
        (
            "list",
            vec!["a".to_string()].into(),
            PropertyValue::List(vec!["a".to_string()]),
        ),
    ]
}

/// One writable property per type tag, named after the tag.
struct Gauge {
    values: Mutex<BTreeMap<String, PropertyValue>>,
    writes: AtomicUsize,
}

impl Gauge {
    fn new() -> Self {
        Self {
            values: Mutex::new(
                cases()
                    .into_iter()
                    .map(|(tag, raw, _)| (tag.to_string(), raw))
                    .collect(),
            ),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Module for Gauge {
    fn name(&self) -> &'static str {
        "gauge"
    }

    fn interface(&self) -> &'static str {
        IFACE
    }

    fn properties(&self) -> Vec<PropertySpec> {
        let mut specs: Vec<PropertySpec> = cases()
            .into_iter()
            .map(|(tag, _, _)| PropertySpec::read_write(tag, tag, tag))
            .collect();
        specs.push(PropertySpec::read_write("blob", "unsupported", "blob"));
        specs
    }

    fn methods(&self) -> &'static [&'static str] {
        &[]
    }

    fn init(&self, _agent: &Arc<Agent>) -> Result<(), AgentError> {
        Ok(())
    }

    fn get_property(&self, _agent: &Agent, name: &str) -> Result<PropertyValue, AgentError> {
        self.values
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::InvalidArguments(name.to_string()))
    }

    fn set_property(
        &self,
        _agent: &Agent,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), AgentError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().insert(name.to_string(), value);
        Ok(())
    }

    async fn invoke(
        &self,
        _agent: &Arc<Agent>,
        method: &str,
        _args: MethodArgs,
    ) -> Result<MethodReply, AgentError> {
        Err(AgentError::NotImplemented(method.to_string()))
    }
}

#[tokio::test]
async fn every_tag_is_served_in_its_native_type() {
    let gauge = Arc::new(Gauge::new());
    let (dispatcher, _) = attach_module(gauge, allow_all());
    let caller = CallerContext::new(":1.1");

    assert_eq!(dispatcher.schema().len(), cases().len());
    for (tag, _, expected) in cases() {
        let value = dispatcher.handle_get(IFACE, tag, &caller).await.unwrap();
        assert_eq!(value, expected, "tag {}", tag);
    }

    let err = dispatcher.handle_get(IFACE, "blob", &caller).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidArgs);
}

#[tokio::test]
async fn out_of_range_writes_never_reach_the_setter() {
    let gauge = Arc::new(Gauge::new());
    let (dispatcher, transport) = attach_module(gauge.clone(), allow_all());
    let caller = CallerContext::new(":1.1");

    let rejected = [
        ("uint32", PropertyValue::UInt64(u64::from(u32::MAX) + 1)),
        ("uint8", PropertyValue::Int(-1)),
        ("int32", PropertyValue::Int64(i64::from(i32::MIN) - 1)),
        ("uint64", PropertyValue::Int64(-1)),
        ("float", PropertyValue::Double(1e300)),
        ("bool", PropertyValue::UInt(1)),
        ("sstr", PropertyValue::UInt(1)),
    ];
    for (tag, value) in rejected {
        let err = dispatcher
            .handle_set(IFACE, tag, value.clone(), &caller)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgs, "{} <- {:?}", tag, value);
    }
    assert_eq!(gauge.writes.load(Ordering::SeqCst), 0);
    assert!(transport.property_changes().is_empty());

    dispatcher
        .handle_set(IFACE, "absTime", PropertyValue::UInt(5), &caller)
        .await
        .unwrap();
    assert_eq!(gauge.writes.load(Ordering::SeqCst), 1);
    assert_eq!(
        gauge.values.lock().get("absTime"),
        Some(&PropertyValue::Int64(5))
    );
}
