// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use blockyard_core::domain::registry_config::{RegistryConfigManifest, CONFIG_PATH_ENV};
use blockyard_core::domain::repository::StorageBackend;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./blockyard-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = RegistryConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./blockyard-config.yaml");
        println!("  4. ~/.blockyard/config.yaml");
        println!("  5. /etc/blockyard/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "Storage:".bold());
    match config.storage_backend() {
        StorageBackend::InMemory => println!("  Backend: in-memory {}", "(nothing persists)".dimmed()),
        StorageBackend::Sled(sled) => {
            println!("  Backend: sled");
            println!("  Path: {}", sled.path.display());
        }
    }
    println!();

    let scoring = &config.spec.scoring;
    println!("{}", "Scoring:".bold());
    println!("  Success rate alpha: {}", scoring.success_rate_alpha);
    println!("  Confidence threshold: {}", scoring.confidence_threshold);
    println!("  Search limit: {}", scoring.search_limit);
    println!();

    let coordinator = &config.spec.coordinator;
    println!("{}", "Coordinator:".bold());
    println!(
        "  Generation timeout: {}",
        humantime_serde::re::humantime::format_duration(coordinator.generation_timeout)
    );
    println!("  Promote after successes: {}", coordinator.promote_after_successes);
    if config.spec.generator.command.is_empty() {
        println!("  Generator: {}", "(none, gaps fail)".dimmed());
    } else {
        println!("  Generator: {}", config.spec.generator.command.join(" "));
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RegistryConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
