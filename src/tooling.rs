//! Tooling
//!
//! Operator-facing entry points over the catalog engine.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
