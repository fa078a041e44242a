use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "telemetry",
    version,
    about = "Queue telemetry pings and upload them within a daily quota"
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a ping until the next upload run
    Enqueue {
        /// Category (ping type) to queue the ping under
        #[arg(long)]
        category: String,

        /// Path appended to the server endpoint
        #[arg(long)]
        upload_path: Option<String>,

        /// Measurements as a JSON object; read from stdin when omitted
        #[arg(long)]
        measurements: Option<String>,
    },

    /// Upload the ready pings of a category
    Upload {
        #[arg(long)]
        category: String,
    },

    /// Show quota usage and pending pings of a category
    Status {
        #[arg(long)]
        category: String,
    },

    /// Configuration management
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}
