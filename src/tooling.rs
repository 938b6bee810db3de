//! Tooling
//!
//! Command-line access to the agent: one-shot requests and the long-running
//! `run` mode.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
