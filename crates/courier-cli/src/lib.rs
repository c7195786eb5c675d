//! Courier CLI library: argument parsing, layered configuration, and errors
//! for the `courier` binary.

pub mod cli;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, Result};
