//! CLI subcommand implementations.

pub mod clear;
pub mod export;
pub mod import;
pub mod init;
pub mod recompute;
pub mod record;
pub mod serve;
pub mod settings;
pub mod status;
pub mod summary;
mod util;
