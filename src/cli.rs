use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::config::OutputFormat;
use crate::core::{Engine, TraceOverrides};

#[derive(Parser)]
#[command(name = "callseq")]
#[command(about = "Print the call sequences reachable from a Go program's entry points")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trace every main function and registered service method
    Trace {
        /// Root directory of the Go module
        root: PathBuf,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Deepest call-site depth to print
        #[arg(long)]
        max_depth: Option<usize>,

        /// Regex for registration selector names
        #[arg(long)]
        registration_pattern: Option<String>,
    },

    /// List detected entry points without tracing them
    Roots {
        /// Root directory of the Go module
        root: PathBuf,
    },

    /// Write a default callseq.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Trace {
                root,
                format,
                max_depth,
                registration_pattern,
            } => {
                let overrides = TraceOverrides {
                    format,
                    max_depth,
                    registration_pattern,
                };
                engine.trace(root, overrides).await
            }
            Commands::Roots { root } => engine.roots(root).await,
            Commands::Init { path } => engine.init(path).await,
        }
    }
}
