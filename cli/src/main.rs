// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Blockyard CLI
//!
//! The `blockyard` binary opens a registry from configuration, runs one
//! command against it and closes it again.
//!
//! ## Commands
//!
//! - `blockyard config show|validate|generate` - Configuration management
//! - `blockyard component put|find|show|outcome|list` - Component store
//! - `blockyard workflow register|resolve|expand|list` - Workflow registry
//! - `blockyard request <description>` - Assemble components for a request
//! - `blockyard status` - Registry counters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use blockyard_cli::commands::{self, ComponentCommand, ConfigCommand, RequestArgs, WorkflowCommand};

/// Blockyard - reuse tested code instead of regenerating it
#[derive(Parser)]
#[command(name = "blockyard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "BLOCKYARD_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "BLOCKYARD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Component store operations
    #[command(name = "component")]
    Component {
        #[command(subcommand)]
        command: ComponentCommand,
    },

    /// Workflow registry operations
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Assemble components for a request, generating what is missing
    #[command(name = "request")]
    Request(RequestArgs),

    /// Show registry counters
    #[command(name = "status")]
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Component { command }) => commands::component::handle_command(command, cli.config).await,
        Some(Commands::Workflow { command }) => commands::workflow::handle_command(command, cli.config).await,
        Some(Commands::Request(args)) => commands::request::handle_command(args, cli.config).await,
        Some(Commands::Status { json }) => commands::status::handle_command(json, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. Logs go to stderr so command
/// output stays machine-readable.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
