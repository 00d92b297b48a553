//! Command-line interface for forwardr.
//!
//! Provides commands for queueing content, inspecting and cancelling jobs,
//! purging old ones and running the processor.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
