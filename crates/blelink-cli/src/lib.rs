//! blelink CLI library
//!
//! Components of the `blelink` command-line front end: argument parsing,
//! layered configuration, device selection and the command handlers.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{DeviceSelector, LinkApp};
pub use cli::{Cli, Commands};
pub use config::{AppConfig, ConfigOverrides};
pub use error::{CliError, Result};
