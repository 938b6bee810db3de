//! Integration tests for the hostwarden agent

mod authorization;
mod cli_parse;
mod heartbeat;
mod property_types;
mod support;
mod sysconfig_runs;
