//! Tooling & Integration Layer
//!
//! Command-line surface over the agent, engine and configuration.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
