//! Host runner for the `modem-at` engine.
//!
//! Loads a YAML command table, builds the engine descriptors from it and
//! serves the table over stdin/stdout. Every declared handler only logs and
//! counts its invocations, which makes the runner useful for exercising a
//! peer against a scripted modem.

pub mod config;
pub mod error;
pub mod stdio;
pub mod table;

pub use config::RunnerConfig;
pub use error::{Result, RunnerError};
pub use stdio::StdioTransport;
pub use table::RunnerContext;
