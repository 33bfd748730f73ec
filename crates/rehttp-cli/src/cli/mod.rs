//! CLI for the rehttp resumable HTTP client.

mod commands;
mod sink;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rehttp_core::config;
use std::path::PathBuf;

use commands::{run_config, run_get, run_head, GetArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rehttp")]
#[command(about = "rehttp: HTTP requests that retry and resume interrupted bodies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// GET a URL, resuming the body across dropped connections.
    Get {
        /// HTTP/HTTPS URL.
        url: String,
        /// Write the body to FILE instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Extra request header, e.g. -H 'Authorization: Bearer x'. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Override the configured number of retries.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Print the SHA-256 of the received body.
        #[arg(long)]
        sha256: bool,
    },

    /// HEAD a URL and print status and response headers.
    Head {
        /// HTTP/HTTPS URL.
        url: String,
        /// Extra request header. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },

    /// Show the effective configuration and where it lives.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                output,
                headers,
                max_retries,
                sha256,
            } => {
                let args = GetArgs {
                    url,
                    output,
                    headers,
                    max_retries,
                    sha256,
                };
                run_get(&cfg, args).await?;
            }
            CliCommand::Head { url, headers } => run_head(&cfg, &url, &headers).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}
