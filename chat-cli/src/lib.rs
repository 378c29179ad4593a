//! # chat-cli
//!
//! Operator CLI over the sync engine: argument parsing, config loading, component assembly and
//! subcommand handlers.

pub mod cli;
pub mod commands;
pub mod components;
pub mod config;

pub use cli::{Cli, Commands};
pub use components::ChatComponents;
pub use config::CliConfig;
