//! # assemblage CLI
//!
//! Assembling reverse proxy: forwards requests to an origin and splices
//! referenced resources into the responses on request.

mod commands;
mod upstream;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assemblage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "assemblage.yml", env = "ASSEMBLAGE_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the assembling reverse proxy
    Serve {
        /// Address to listen on (overrides server.listen_addr)
        #[arg(long, env = "ASSEMBLAGE_LISTEN")]
        listen: Option<String>,

        /// Origin to forward requests to (overrides server.upstream)
        #[arg(long, env = "ASSEMBLAGE_UPSTREAM")]
        upstream: Option<String>,

        /// Largest body in bytes that is assembled
        #[arg(long, env = "ASSEMBLAGE_MAX_CONTENT_LENGTH")]
        max_content_length: Option<usize>,

        /// Largest inbound request body in bytes
        #[arg(long, env = "ASSEMBLAGE_MAX_REQUEST_BODY")]
        max_request_body: Option<usize>,
    },

    /// Validate the configuration and show the plan for a resource
    Check {
        /// Content type selecting the assemblage
        #[arg(long, default_value = "text/html")]
        content_type: String,

        /// Resource URI to resolve names against
        #[arg(long)]
        uri: Option<String>,

        /// Request method of the resource
        #[arg(long, default_value = "GET")]
        method: String,

        /// Requested names (comma separated)
        #[arg(long, value_delimiter = ',')]
        names: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            listen,
            upstream,
            max_content_length,
            max_request_body,
        } => {
            let options = commands::ServeOptions {
                listen,
                upstream,
                max_content_length,
                max_request_body,
            };
            commands::serve(&cli.config, options).await?;
        }

        Commands::Check {
            content_type,
            uri,
            method,
            names,
            json,
        } => {
            let options = commands::CheckOptions {
                content_type,
                uri,
                method,
                names,
                json,
            };
            commands::check_config(&cli.config, &options)?;
        }
    }

    Ok(())
}
