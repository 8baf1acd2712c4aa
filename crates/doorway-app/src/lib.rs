//! Command-line front end for doorway sessions.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, SessionArgs};
pub use config::{AppConfig, SessionSettings};
