// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! External collaborators of the coordinator: the component generator that
//! fills capability gaps, and the validator that executes assemblies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::assembly::{Assembly, ExecutionReport};
use crate::domain::capability::Capability;
use crate::domain::component::{ComponentDraft, ComponentKind, PackageDependency, Permission};

/// Fallback language tag when neither the generator nor the request names one
pub const UNKNOWN_LANGUAGE: &str = "plaintext";

/// What a generator hands back for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComponent {
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub packages: Vec<PackageDependency>,
}

impl GeneratedComponent {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            description: String::new(),
            language: None,
            kind: ComponentKind::default(),
            tags: Vec::new(),
            permissions: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Draft named after the capability it fills and tagged with the
    /// capability's keywords so later searches for the same need find it.
    pub fn into_draft(self, capability: &Capability) -> ComponentDraft {
        let language = self
            .language
            .filter(|language| !language.trim().is_empty())
            .or_else(|| capability.language.clone())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let description = if self.description.trim().is_empty() {
            capability.name.clone()
        } else {
            self.description
        };

        let mut draft = ComponentDraft::new(capability.name.clone(), self.source, language)
            .with_description(description)
            .with_kind(self.kind)
            .with_tags(capability.keywords())
            .with_tags(self.tags);
        draft.permissions = self.permissions;
        draft.packages = self.packages;
        draft
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator cannot produce this capability: {0}")]
    CannotGenerate(String),

    #[error("Generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Produces new components for capabilities nothing stored covers.
#[async_trait]
pub trait ComponentGenerator: Send + Sync {
    async fn generate(&self, capability: &Capability) -> Result<GeneratedComponent, GenerationError>;
}

/// Runs an assembly and reports how it went.
#[async_trait]
pub trait ExecutionValidator: Send + Sync {
    async fn validate(&self, assembly: &Assembly) -> anyhow::Result<ExecutionReport>;
}

/// Generator used when none is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGenerator;

#[async_trait]
impl ComponentGenerator for UnavailableGenerator {
    async fn generate(&self, capability: &Capability) -> Result<GeneratedComponent, GenerationError> {
        Err(GenerationError::CannotGenerate(format!(
            "no generator configured for '{}'",
            capability.name
        )))
    }
}
