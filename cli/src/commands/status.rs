// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `blockyard status`: registry counters

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use blockyard_core::domain::repository::StorageBackend;

use super::open_runtime;

pub async fn handle_command(json: bool, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = open_runtime(config_path)?;
    let status = runtime.coordinator.status().await;
    let backend = runtime.config.storage_backend();
    runtime.close().await?;
    let status = status?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Registry status".bold());
    match backend {
        StorageBackend::InMemory => println!("  Storage: in-memory"),
        StorageBackend::Sled(sled) => println!("  Storage: sled at {}", sled.path.display()),
    }
    println!("  Components: {}", status.components);
    println!("  Workflows: {}", status.workflows);
    println!("  Pending promotions: {}", status.pending_promotions);

    Ok(())
}
