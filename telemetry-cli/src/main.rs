mod cli;
mod config;
mod error;

use std::io::{self, Read};
use std::process;

use clap::Parser;
use serde_json::{Map, Value, json};
use telemetry_upload::{Ping, Telemetry};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
    error::{CliError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Enqueue {
            category,
            upload_path,
            measurements,
        } => {
            let raw = match measurements {
                Some(raw) => raw,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };

            let mut ping = Ping::new(category, parse_measurements(&raw)?);
            if let Some(path) = upload_path {
                ping = ping.with_upload_path(path);
            }

            let telemetry = Telemetry::open(config.upload).await?;
            telemetry.queue(&ping).await?;
            info!(category = %ping.ping_type, document_id = %ping.document_id, "Ping queued");
            println!("{}", ping.document_id);
        }

        Commands::Upload { category } => {
            let telemetry = Telemetry::open(config.upload).await?;
            let report = telemetry.schedule_upload(&category).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Status { category } => {
            let max_per_day = config.upload.max_uploads_for(&category);
            let telemetry = Telemetry::open(config.upload).await?;
            let quota = telemetry.quota().state(&category).await?;
            let uploads_today = telemetry.quota().effective_count(&category).await?;
            let pending = telemetry.pending(&category).await?;

            let status = json!({
                "category": category,
                "uploads_today": uploads_today,
                "max_uploads_per_day": max_per_day,
                "stored_upload_count": quota.daily_upload_count,
                "last_upload": quota.last_upload.to_rfc3339(),
                "pending_files": pending.files,
                "pending_records": pending.records,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Config { show } => {
            if show {
                println!("{}", config.show()?);
            } else {
                match AppConfig::default_path() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("No config directory on this platform"),
                }
                println!("Use --show to display the current configuration");
            }
        }
    }

    Ok(())
}

fn parse_measurements(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw.trim())? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::InvalidInput(format!(
            "measurements must be a JSON object, got {}",
            other
        ))),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
