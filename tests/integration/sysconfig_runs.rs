use crate::support::{allow_all, attach_builtin, completions, shell_runner, SHELL_SCHEME};
use async_trait::async_trait;
use hostwarden::auth::CallerContext;
use hostwarden::dispatch::MethodArgs;
use hostwarden::error::{AgentError, ResultCode};
use hostwarden::property::PropertyValue;
use hostwarden::sysconfig::{
    BackendRegistry, ConfigBackend, ConfigKey, ConfigRecordStore, ConfigRunner, ConfigSource,
    RunState, ALREADY_CONFIGURED_STATUS, FLAG_FORCE,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const IFACE: &str = "org.hostwarden.Sysconfig";

fn caller() -> CallerContext {
    CallerContext::new(":1.42")
}

fn run_string(text: &str, flags: u32, key: &str) -> MethodArgs {
    MethodArgs::from_strings([text, &flags.to_string(), SHELL_SCHEME, key])
}

#[tokio::test]
async fn never_set_key_reports_unknown() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(temp.path(), "echo x"), allow_all());
    let reply = dispatcher
        .handle_invoke(IFACE, "is_configured", MethodArgs::from_strings(["never.set"]), &caller())
        .await
        .unwrap();
    assert_eq!(reply.first(), Some(&PropertyValue::Str("unknown".into())));
}

#[tokio::test]
async fn set_configured_round_trip() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(temp.path(), "echo x"), allow_all());
    dispatcher
        .handle_invoke(IFACE, "set_configured", MethodArgs::from_strings(["web-1", "ok"]), &caller())
        .await
        .unwrap();
    let reply = dispatcher
        .handle_invoke(IFACE, "is_configured", MethodArgs::from_strings(["web-1"]), &caller())
        .await
        .unwrap();
    assert_eq!(reply.first().and_then(|v| v.as_str()), Some("ok"));
    assert!(temp.path().join("web-1").is_file());
}

#[tokio::test]
async fn unsafe_keys_never_touch_storage() {
    let temp = TempDir::new().unwrap();
    let keys_dir = temp.path().join("keys");
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(&keys_dir, "echo x"), allow_all());

    for key in ["", ".hidden", "a/../b", "bad*key"] {
        for (method, args) in [
            ("set_configured", MethodArgs::from_strings([key, "ok"])),
            ("is_configured", MethodArgs::from_strings([key])),
            ("run_string", run_string("x", 0, key)),
        ] {
            let err = dispatcher
                .handle_invoke(IFACE, method, args, &caller())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ResultCode::InvalidArgs, "{} {:?}", method, key);
        }
    }
    assert!(!keys_dir.exists());
}

#[tokio::test]
async fn run_returns_async_and_completes_once() {
    let temp = TempDir::new().unwrap();
    let runner = shell_runner(temp.path(), "cat >/dev/null; sleep 0.5; echo converged");
    let (dispatcher, _) = attach_builtin("sysconfig", runner.clone(), allow_all());
    let mut done = completions(dispatcher.agent());

    let started = Instant::now();
    let reply = dispatcher
        .handle_invoke(IFACE, "run_string", run_string("pkg=nginx", 0, "web"), &caller())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(10), "{:?}", started.elapsed());
    assert_eq!(reply.first(), Some(&PropertyValue::UInt(ResultCode::Async as u32)));
    assert!(runner.state("web").is_some_and(|s| s.in_flight()));

    // A second run for the same key while the first is in flight is refused.
    let err = dispatcher
        .handle_invoke(IFACE, "run_string", run_string("pkg=nginx", 0, "web"), &caller())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::OtherError);

    let (code, status) = done.recv().await.unwrap();
    assert_eq!(code, ResultCode::Success);
    assert_eq!(status, "converged");
    assert!(tokio::time::timeout(Duration::from_millis(300), done.recv())
        .await
        .is_err());
    assert_eq!(runner.state("web"), Some(RunState::Done));
}

struct Sluggish(Duration);

#[async_trait]
impl ConfigBackend for Sluggish {
    async fn run(
        &self,
        _source: &ConfigSource,
        _flags: u32,
        _key: &ConfigKey,
    ) -> Result<String, AgentError> {
        tokio::time::sleep(self.0).await;
        Ok("settled".to_string())
    }

    async fn query(&self, _text: &str, _flags: u32) -> Result<Option<String>, AgentError> {
        Ok(None)
    }
}

#[tokio::test(start_paused = true)]
async fn run_returns_before_backend_latency_elapses() {
    let temp = TempDir::new().unwrap();
    let mut backends = BackendRegistry::new();
    backends.register("sluggish", Arc::new(Sluggish(Duration::from_secs(120))));
    let runner = Arc::new(ConfigRunner::new(ConfigRecordStore::new(temp.path()), backends));
    let (dispatcher, _) = attach_builtin("sysconfig", runner.clone(), allow_all());
    let mut done = completions(dispatcher.agent());

    let started = tokio::time::Instant::now();
    let args = MethodArgs::from_strings(["x", "0", "sluggish", "slow"]);
    let reply = dispatcher
        .handle_invoke(IFACE, "run_string", args, &caller())
        .await
        .unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(reply.first(), Some(&PropertyValue::UInt(ResultCode::Async as u32)));
    assert!(done.try_recv().is_err());

    let (code, status) = done.recv().await.unwrap();
    assert_eq!((code, status.as_str()), (ResultCode::Success, "settled"));
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test]
async fn applied_key_is_skipped_unless_forced() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("runs");
    let script = format!("cat >/dev/null; echo run >> {}; echo converged", marker.display());
    let keys = temp.path().join("keys");
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(&keys, &script), allow_all());
    let mut done = completions(dispatcher.agent());

    let mut statuses = Vec::new();
    for flags in [0, 0, FLAG_FORCE] {
        dispatcher
            .handle_invoke(IFACE, "run_string", run_string("x", flags, "db"), &caller())
            .await
            .unwrap();
        let (code, status) = done.recv().await.unwrap();
        assert_eq!(code, ResultCode::Success);
        statuses.push(status);
    }
    assert_eq!(statuses, vec!["converged", ALREADY_CONFIGURED_STATUS, "converged"]);
    let runs = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(runs.lines().count(), 2);
    let record = std::fs::read_to_string(keys.join("db")).unwrap();
    assert!(record.starts_with("OK\n"));
}

#[tokio::test]
async fn failed_run_is_recorded_and_retried() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, _) = attach_builtin(
        "sysconfig",
        shell_runner(temp.path(), "cat >/dev/null; echo broken >&2; exit 3"),
        allow_all(),
    );
    let mut done = completions(dispatcher.agent());

    for _ in 0..2 {
        dispatcher
            .handle_invoke(IFACE, "run_string", run_string("x", 0, "cache"), &caller())
            .await
            .unwrap();
        let (code, status) = done.recv().await.unwrap();
        assert_eq!(code, ResultCode::BackendError);
        assert!(status.contains("broken"));
    }
    let record = std::fs::read_to_string(temp.path().join("cache")).unwrap();
    assert!(record.starts_with("FAILED 4:"));
}

#[tokio::test]
async fn unknown_scheme_fails_synchronously() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(temp.path(), "echo x"), allow_all());
    let args = MethodArgs::from_strings(["x", "0", "chef", "web"]);
    let err = dispatcher
        .handle_invoke(IFACE, "run_string", args, &caller())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::NotImplemented);
    assert_eq!(
        dispatcher.agent().last_error().map(|e| e.code()),
        Some(ResultCode::NotImplemented)
    );
}

#[tokio::test]
async fn query_passes_text_to_backend() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, _) = attach_builtin("sysconfig", shell_runner(temp.path(), "echo x"), allow_all());
    let args = MethodArgs::from_strings(["facts.os", "0", SHELL_SCHEME]);
    let reply = dispatcher.handle_invoke(IFACE, "query", args, &caller()).await.unwrap();
    assert_eq!(reply.first().and_then(|v| v.as_str()), Some("facts.os"));
}
