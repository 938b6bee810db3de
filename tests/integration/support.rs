//! Shared fixtures: in-memory host, shell-backed config runner, attached modules.

use hostwarden::agent::{Agent, RecordingTransport};
use hostwarden::auth::{AuthorizationGate, PolicyRule, PolicyTable};
use hostwarden::config::CommandBackendConfig;
use hostwarden::dispatch::Dispatcher;
use hostwarden::error::ResultCode;
use hostwarden::modules::{Module, ModuleDeps, ModuleRegistry, StaticSensors};
use hostwarden::sysconfig::{BackendRegistry, ConfigRecordStore, ConfigRunner};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SHELL_SCHEME: &str = "shell";

/// Runner with a `shell` backend that runs `script` under `sh -c`.
pub fn shell_runner(dir: &Path, script: &str) -> Arc<ConfigRunner> {
    let mut commands = HashMap::new();
    commands.insert(
        SHELL_SCHEME.to_string(),
        CommandBackendConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            query_args: vec!["-c".to_string(), "cat".to_string()],
        },
    );
    Arc::new(ConfigRunner::new(
        ConfigRecordStore::new(dir),
        BackendRegistry::from_commands(&commands),
    ))
}

pub fn allow_all() -> AuthorizationGate {
    AuthorizationGate::new(Arc::new(PolicyTable::new(vec![PolicyRule::allow("*")])))
}

pub fn attach_module(
    module: Arc<dyn Module>,
    gate: AuthorizationGate,
) -> (Dispatcher, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let agent = Arc::new(Agent::new(
        hostwarden::agent::AgentIdentity::new("itest-host", "5f0c9a3e-1111-4a2b-9c3d-000000000001"),
        transport.clone(),
    ));
    let dispatcher = Dispatcher::new(agent, module, gate).expect("module attaches");
    (dispatcher, transport)
}

/// Attach a built-in module served by an in-memory host.
pub fn attach_builtin(
    name: &str,
    runner: Arc<ConfigRunner>,
    gate: AuthorizationGate,
) -> (Dispatcher, Arc<RecordingTransport>) {
    let registry =
        ModuleRegistry::builtin(ModuleDeps::in_memory(Arc::new(StaticSensors::default()), runner));
    attach_module(registry.create(name).expect("builtin module"), gate)
}

/// Route the agent's completion callback into a channel.
pub fn completions(agent: &Agent) -> mpsc::UnboundedReceiver<(ResultCode, String)> {
    let (tx, rx) = mpsc::unbounded_channel();
    agent.set_callback(Arc::new(move |code: ResultCode, status: String| {
        let _ = tx.send((code, status));
    }));
    rx
}
