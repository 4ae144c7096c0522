//! Building blocks of the `instrumental-agent` binary.
//!
//! - [`config`]: `instrumental.toml` loading and CLI overrides
//! - [`process`]: samples the agent's own process into a metric registry

pub mod config;
pub mod process;
