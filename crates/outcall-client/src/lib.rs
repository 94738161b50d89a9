//! Command line, configuration loading and process wiring
//!
//! This crate provides the `outcall-api` binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod serve;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
