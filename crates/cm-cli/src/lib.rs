//! Code metrics CLI library.
//!
//! This crate provides the CLI interface and the request/response engine
//! for the code metrics store.

mod cli;
pub mod commands;
mod config;
pub mod engine;

pub use cli::{Cli, Commands, ImportFormat, SettingsAction};
pub use config::Config;
pub use engine::{Engine, EngineError, Request, Response};
