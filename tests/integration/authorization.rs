use crate::support::{attach_module, shell_runner};
use async_trait::async_trait;
use hostwarden::auth::{
    AuthorizationBackend, AuthorizationGate, CallerContext, PolicyRule, PolicyTable,
};
use hostwarden::dispatch::MethodArgs;
use hostwarden::error::{AgentError, ResultCode};
use hostwarden::modules::{ModuleDeps, ModuleRegistry, StaticSensors};
use hostwarden::property::PropertyValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const HOST: &str = "org.hostwarden.Host";
const NETWORK: &str = "org.hostwarden.Network";

/// Backend that is never reachable, counting how often it was asked.
#[derive(Default)]
struct Offline {
    asked: AtomicUsize,
}

#[async_trait]
impl AuthorizationBackend for Offline {
    async fn check_authorization(
        &self,
        _action: &str,
        _caller: &CallerContext,
    ) -> Result<bool, AgentError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::Backend("polkit: connection refused".into()))
    }
}

fn registry(temp: &TempDir) -> (ModuleRegistry, Arc<StaticSensors>) {
    let host = Arc::new(StaticSensors::new("gatehost"));
    let runner = shell_runner(temp.path(), "echo x");
    (
        ModuleRegistry::builtin(ModuleDeps::in_memory(host.clone(), runner)),
        host,
    )
}

#[tokio::test]
async fn backend_failure_denies_get_set_and_calls() {
    let temp = TempDir::new().unwrap();
    let (registry, host) = registry(&temp);
    let backend = Arc::new(Offline::default());
    let gate = AuthorizationGate::new(backend.clone());
    let caller = CallerContext::new(":1.7");

    let (dispatcher, transport) = attach_module(registry.create("host").unwrap(), gate.clone());
    let err = dispatcher.handle_get(HOST, "hostname", &caller).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::AuthenticationError);
    assert_eq!(err.message(), "polkit: connection refused");

    let err = dispatcher
        .handle_set(HOST, "update_interval", PropertyValue::UInt(1), &caller)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::AuthenticationError);
    assert!(transport.property_changes().is_empty());

    let (network, _) = attach_module(registry.create("network").unwrap(), gate);
    let err = network
        .handle_invoke(NETWORK, "stop", MethodArgs::from_strings(["eth0"]), &caller)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::AuthenticationError);
    assert!(host.calls().is_empty());
    assert_eq!(backend.asked.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn policy_rules_apply_per_member_and_caller() {
    let temp = TempDir::new().unwrap();
    let (registry, host) = registry(&temp);
    let mut operators = PolicyRule::allow("org.hostwarden.Network.*");
    operators.callers = vec!["uid:0".into(), ":1.99".into()];
    let table = PolicyTable::new(vec![
        PolicyRule::allow("org.hostwarden.Network.hostname"),
        PolicyRule::deny("org.hostwarden.Network.restart"),
        operators,
    ]);
    let (dispatcher, _) = attach_module(
        registry.create("network").unwrap(),
        AuthorizationGate::new(Arc::new(table)),
    );

    let anyone = CallerContext::new(":1.5");
    let root = CallerContext::new(":1.6").with_uid(0);

    assert_eq!(
        dispatcher.handle_get(NETWORK, "hostname", &anyone).await.unwrap(),
        PropertyValue::Str("itest-host".into())
    );
    let err = dispatcher.handle_get(NETWORK, "uuid", &anyone).await.unwrap_err();
    assert_eq!(err.to_string(), "Not authorized");
    assert!(dispatcher.handle_get(NETWORK, "uuid", &root).await.is_ok());

    let err = dispatcher
        .handle_invoke(NETWORK, "restart", MethodArgs::from_strings(["eth0"]), &root)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::AuthenticationError);
    dispatcher
        .handle_invoke(NETWORK, "stop", MethodArgs::from_strings(["eth0"]), &root)
        .await
        .unwrap();
    assert_eq!(host.calls(), vec!["stop eth0"]);
}

#[tokio::test]
async fn empty_policy_denies_everything() {
    let temp = TempDir::new().unwrap();
    let (registry, _) = registry(&temp);
    let (dispatcher, _) = attach_module(
        registry.create("sysconfig").unwrap(),
        AuthorizationGate::new(Arc::new(PolicyTable::new(Vec::new()))),
    );
    let caller = CallerContext::new(":1.1").with_uid(0);
    let err = dispatcher
        .handle_get("org.hostwarden.Sysconfig", "is_postboot_configured", &caller)
        .await
        .unwrap_err();
    assert_eq!(err, AgentError::not_authorized());
    assert_eq!(dispatcher.agent().last_error(), Some(AgentError::not_authorized()));
}
