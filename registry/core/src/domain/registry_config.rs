// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Registry Configuration Types
//
// Defines the configuration schema for a Blockyard registry process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Storage backend selection (in-memory or sled)
// - Retrieval scoring (success-rate smoothing, confidence threshold)
// - Coordinator limits (generation timeout, workflow promotion)
// - External generator command
// - Event bus sizing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{SledConfig, StorageBackend};

pub const API_VERSION: &str = "blockyard.dev/v1";
pub const KIND: &str = "RegistryConfig";
pub const CONFIG_PATH_ENV: &str = "BLOCKYARD_CONFIG_PATH";

/// Top-level Kubernetes-style registry configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfigManifest {
    /// API version (must be "blockyard.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RegistryConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: RegistryConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackendKind {
    InMemory,
    #[default]
    Sled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Sled database directory. Defaults to `~/.blockyard/store`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Moving-average weight of the newest execution outcome, in (0, 1]
    #[serde(default = "default_success_rate_alpha")]
    pub success_rate_alpha: f64,

    /// Minimum keyword relevance for a stored match to be reused
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            success_rate_alpha: default_success_rate_alpha(),
            confidence_threshold: default_confidence_threshold(),
            search_limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound for a single generator call
    #[serde(default = "default_generation_timeout", with = "humantime_serde")]
    pub generation_timeout: Duration,

    /// Successful end-to-end runs before a composition becomes a workflow
    #[serde(default = "default_promote_after_successes")]
    pub promote_after_successes: u32,

    /// Finished assemblies kept for lookup before the oldest are dropped
    #[serde(default = "default_max_retained_assemblies")]
    pub max_retained_assemblies: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            generation_timeout: default_generation_timeout(),
            promote_after_successes: default_promote_after_successes(),
            max_retained_assemblies: default_max_retained_assemblies(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Program and arguments. Empty means no generator is available.
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for RegistryConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "blockyard".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: RegistryConfigSpec::default(),
        }
    }
}

impl RegistryConfigManifest {
    /// Volatile configuration for tests and one-off runs
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.spec.storage.backend = StorageBackendKind::InMemory;
        config
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. BLOCKYARD_CONFIG_PATH environment variable
    /// 2. ./blockyard-config.yaml (working directory)
    /// 3. ~/.blockyard/config.yaml (user home)
    /// 4. /etc/blockyard/config.yaml (Unix) or C:\ProgramData\Blockyard\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./blockyard-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".blockyard").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/blockyard/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Blockyard\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("BLOCKYARD_STORAGE_PATH") {
            if !path.trim().is_empty() {
                tracing::info!("Environment override: BLOCKYARD_STORAGE_PATH={}", path);
                self.spec.storage.backend = StorageBackendKind::Sled;
                self.spec.storage.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("BLOCKYARD_CONFIDENCE_THRESHOLD") {
            match val.trim().parse::<f64>() {
                Ok(threshold) => {
                    tracing::info!("Environment override: BLOCKYARD_CONFIDENCE_THRESHOLD={}", threshold);
                    self.spec.scoring.confidence_threshold = threshold;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for BLOCKYARD_CONFIDENCE_THRESHOLD: '{}'. Expected a number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Backend the repository factory should open
    pub fn storage_backend(&self) -> StorageBackend {
        match self.spec.storage.backend {
            StorageBackendKind::InMemory => StorageBackend::InMemory,
            StorageBackendKind::Sled => StorageBackend::Sled(SledConfig {
                path: self
                    .spec
                    .storage
                    .path
                    .clone()
                    .unwrap_or_else(default_store_path),
            }),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let scoring = &self.spec.scoring;
        if !(scoring.success_rate_alpha > 0.0 && scoring.success_rate_alpha <= 1.0) {
            anyhow::bail!(
                "spec.scoring.success_rate_alpha must be in (0, 1], got {}",
                scoring.success_rate_alpha
            );
        }
        if !(0.0..=1.0).contains(&scoring.confidence_threshold) {
            anyhow::bail!(
                "spec.scoring.confidence_threshold must be in [0, 1], got {}",
                scoring.confidence_threshold
            );
        }
        if scoring.search_limit == 0 {
            anyhow::bail!("spec.scoring.search_limit must be at least 1");
        }

        if self.spec.coordinator.generation_timeout.is_zero() {
            anyhow::bail!("spec.coordinator.generation_timeout must be greater than zero");
        }
        if self.spec.coordinator.promote_after_successes == 0 {
            anyhow::bail!("spec.coordinator.promote_after_successes must be at least 1");
        }
        if self.spec.coordinator.max_retained_assemblies == 0 {
            anyhow::bail!("spec.coordinator.max_retained_assemblies must be at least 1");
        }

        if let Some(program) = self.spec.generator.command.first() {
            if program.trim().is_empty() {
                anyhow::bail!("spec.generator.command program cannot be empty");
            }
        }

        if self.spec.event_bus.capacity == 0 {
            anyhow::bail!("spec.event_bus.capacity must be at least 1");
        }

        Ok(())
    }
}

fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".blockyard").join("store"))
        .unwrap_or_else(|| PathBuf::from(".blockyard/store"))
}

fn default_success_rate_alpha() -> f64 {
    crate::domain::stats::DEFAULT_SUCCESS_ALPHA
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_search_limit() -> usize {
    10
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_promote_after_successes() -> u32 {
    2
}

fn default_max_retained_assemblies() -> usize {
    1000
}

fn default_event_bus_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = RegistryConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::Sled);
        assert_eq!(manifest.spec.coordinator.promote_after_successes, 2);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: blockyard.dev/v1
kind: RegistryConfig
metadata:
  name: laptop
spec:
  storage:
    backend: in-memory
  coordinator:
    generation_timeout: 45s
"#;
        let manifest = RegistryConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.storage_backend(), StorageBackend::InMemory);
        assert_eq!(manifest.spec.coordinator.generation_timeout, Duration::from_secs(45));
        assert_eq!(manifest.spec.coordinator.promote_after_successes, 2);
        assert_eq!(manifest.spec.coordinator.max_retained_assemblies, 1000);
        assert_eq!(manifest.spec.scoring.success_rate_alpha, 0.1);
        assert!(manifest.spec.generator.command.is_empty());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_sled_backend_uses_configured_path() {
        let mut manifest = RegistryConfigManifest::default();
        manifest.spec.storage.path = Some(PathBuf::from("/tmp/blockyard-test"));
        assert_eq!(
            manifest.storage_backend(),
            StorageBackend::Sled(SledConfig { path: PathBuf::from("/tmp/blockyard-test") })
        );
    }

    #[test]
    fn test_validation() {
        let mut manifest = RegistryConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.scoring.success_rate_alpha = 0.0;
        assert!(manifest.validate().is_err());
        manifest.spec.scoring.success_rate_alpha = 0.2;

        manifest.spec.scoring.confidence_threshold = 1.5;
        assert!(manifest.validate().is_err());
        manifest.spec.scoring.confidence_threshold = 0.6;

        manifest.spec.coordinator.promote_after_successes = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.coordinator.promote_after_successes = 1;

        manifest.spec.coordinator.max_retained_assemblies = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.coordinator.max_retained_assemblies = 50;

        manifest.spec.generator.command = vec![" ".to_string()];
        assert!(manifest.validate().is_err());
        manifest.spec.generator.command = vec!["./gen.sh".to_string()];

        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = RegistryConfigManifest::in_memory();
        manifest.spec.generator.command = vec!["python3".to_string(), "gen.py".to_string()];
        manifest.spec.coordinator.generation_timeout = Duration::from_millis(1500);

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = RegistryConfigManifest::from_yaml_str(&yaml).unwrap();

        assert_eq!(parsed.spec.storage.backend, StorageBackendKind::InMemory);
        assert_eq!(parsed.spec.generator.command, manifest.spec.generator.command);
        assert_eq!(parsed.spec.coordinator.generation_timeout, Duration::from_millis(1500));
    }
}
