//! fpstore CLI library
//!
//! Argument parsing, tracing setup and the command implementations behind the
//! `fpstore` binary. Kept as a library so commands can be driven from tests
//! without spawning a process.

// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Tracing and logging configuration.
pub mod tracing;

pub use cli::{CliError, Commands, exit_code_for};
pub use commands::{Output, execute, load_config};
