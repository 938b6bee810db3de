//! Hostwarden: Host Management Agent
//!
//! Hosts feature modules (host, network, sysconfig) behind a typed remote
//! property protocol. Every request passes an authorization gate, property
//! values cross the boundary in their declared native type, hosts emit a
//! periodic heartbeat, and configuration runs are idempotent per key.

pub mod agent;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod modules;
pub mod property;
pub mod sysconfig;
pub mod tooling;

pub use agent::{Agent, AgentEvent, AgentIdentity, AgentTransport, BusTransport, RecordingTransport};
pub use auth::{AuthorizationBackend, AuthorizationGate, CallerContext, PolicyTable};
pub use config::{AgentSettings, ConfigLoader};
pub use dispatch::{Dispatcher, MethodArgs, MethodReply};
pub use error::{AgentError, ResultCode};
pub use heartbeat::HeartbeatEmitter;
pub use modules::{Module, ModuleDeps, ModuleRegistry};
pub use property::{PropertyRegistry, PropertySpec, PropertyValue};
pub use sysconfig::{ConfigRunner, FLAG_FORCE};
