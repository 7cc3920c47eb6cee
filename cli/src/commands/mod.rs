// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Blockyard CLI

pub mod component;
pub mod config;
pub mod request;
pub mod status;
pub mod workflow;

pub use self::component::ComponentCommand;
pub use self::config::ConfigCommand;
pub use self::request::RequestArgs;
pub use self::workflow::WorkflowCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;

use blockyard_core::application::RegistryRuntime;
use blockyard_core::domain::registry_config::RegistryConfigManifest;

/// Load configuration (explicit path or discovery) and open the registry.
pub fn open_runtime(config_path: Option<PathBuf>) -> Result<RegistryRuntime> {
    let config = RegistryConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    tracing::debug!(registry = %config.metadata.name, "Opening registry");
    RegistryRuntime::open(config).context("Failed to open registry")
}
