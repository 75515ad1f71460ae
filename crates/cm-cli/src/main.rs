use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cm_cli::commands::{
    clear, export, import, init, recompute, record, serve, settings, status, summary,
};
use cm_cli::{Cli, Commands, Config, Engine};

/// Load config and open the engine, ensuring the parent directory exists.
fn open_engine(config_path: Option<&Path>) -> Result<(Engine, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let engine = Engine::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((engine, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries command output and `serve` responses
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (mut engine, config) = open_engine(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Init => init::run(&mut out, &engine, &config)?,
        Commands::Record { payload } => {
            record::run(&mut out, &mut engine, payload.as_deref(), io::stdin().lock())?;
        }
        Commands::Import { format } => {
            let inserted = import::run(&mut engine, *format, io::stdin().lock())?;
            writeln!(out, "Imported {inserted} event(s).")?;
        }
        Commands::Summary {
            origin,
            day,
            all,
            json,
        } => summary::run(
            &mut out,
            &engine,
            &summary::SummaryArgs {
                origin: origin.as_deref(),
                day: day.as_deref(),
                all: *all,
                json: *json,
            },
        )?,
        Commands::Export { format, output } => export::run(
            &mut out,
            &mut io::stderr(),
            &engine,
            *format,
            output.as_deref(),
        )?,
        Commands::ExportSummary {
            origin,
            day,
            output,
        } => export::run_summary(
            &mut out,
            &engine,
            origin,
            day.as_deref(),
            output.as_deref(),
        )?,
        Commands::Clear => clear::run(&mut out, &mut engine)?,
        Commands::Settings(action) => settings::run(&mut out, &mut engine, action)?,
        Commands::Recompute { check } => recompute::run(&mut out, &mut engine, *check)?,
        Commands::Status => status::run(&mut out, &engine, &config)?,
        Commands::Serve => {
            let stdin = io::stdin();
            serve::run(stdin.lock(), &mut out, &mut engine)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_engine_creates_parent_directory() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("nested").join("metrics.db");
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!("database_path = {:?}\n", db_path.display().to_string()),
        )
        .unwrap();

        let (engine, config) = open_engine(Some(&config_path)).unwrap();
        assert_eq!(config.database_path, db_path);
        assert!(db_path.exists());
        assert_eq!(engine.get_settings().unwrap().idle_ms, 5000);
    }
}
