// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Component Aggregate
//!
//! A component is an immutable, content-addressed unit of stored code plus the
//! permissions and packages it needs to run.
//!
//! ## Identity
//!
//! [`ComponentId`] is the hex SHA-256 of the *normalized* source text (line
//! endings unified, trailing whitespace and surrounding blank lines removed).
//! Two drafts whose sources normalize to the same text are the same component,
//! whatever name or tags they carry.
//!
//! ## Permissions and packages
//!
//! Components only hold [`PermissionId`]s and [`PackageId`]s. The rows
//! themselves live in separate tables so that components sharing a
//! requirement reference a single record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::capability::{keywords, normalize_language};
use crate::domain::stats::UsageStats;

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Content address of an already normalized source text.
    pub fn for_source(normalized_source: &str) -> Self {
        Self(hex::encode(Sha256::digest(normalized_source.as_bytes())))
    }

    pub fn parse(value: &str) -> Result<Self, ComponentError> {
        let value = value.trim().to_lowercase();
        if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ComponentError::InvalidId(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ComponentId {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(pub String);

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub String);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unify line endings, strip trailing whitespace per line and drop leading and
/// trailing blank lines.
pub fn normalize_source(source: &str) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();

    let Some(first) = lines.iter().position(|line| !line.is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .unwrap_or(first);

    lines[first..=last].join("\n")
}

// ============================================================================
// Permissions & packages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionKind {
    NetworkEgress,
    SecretAccess,
    FilesystemRead,
    FilesystemWrite,
    ProcessSpawn,
    Other(String),
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKind::NetworkEgress => write!(f, "network-egress"),
            PermissionKind::SecretAccess => write!(f, "secret-access"),
            PermissionKind::FilesystemRead => write!(f, "filesystem-read"),
            PermissionKind::FilesystemWrite => write!(f, "filesystem-write"),
            PermissionKind::ProcessSpawn => write!(f, "process-spawn"),
            PermissionKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

impl FromStr for PermissionKind {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = s.trim().to_lowercase();
        Ok(match kind.as_str() {
            "" => return Err(ComponentError::InvalidPermission(s.to_string())),
            "network-egress" => PermissionKind::NetworkEgress,
            "secret-access" => PermissionKind::SecretAccess,
            "filesystem-read" => PermissionKind::FilesystemRead,
            "filesystem-write" => PermissionKind::FilesystemWrite,
            "process-spawn" => PermissionKind::ProcessSpawn,
            _ => PermissionKind::Other(kind),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub description: String,
    pub kind: PermissionKind,
}

impl Permission {
    /// Permission scoped to `target`, identified as `{kind}:{target}`.
    pub fn new(kind: PermissionKind, target: &str, description: impl Into<String>) -> Self {
        let target = target.trim();
        let id = if target.is_empty() {
            kind.to_string()
        } else {
            format!("{}:{}", kind, target)
        };
        Self {
            id: PermissionId(id),
            description: description.into(),
            kind,
        }
    }

    /// Parse the `kind[:target]` shorthand used on the command line and in
    /// generator output.
    pub fn parse_spec(spec: &str) -> Result<Self, ComponentError> {
        let (kind, target) = spec.split_once(':').unwrap_or((spec, ""));
        let kind: PermissionKind = kind.parse()?;
        let description = if target.trim().is_empty() {
            format!("{}", kind)
        } else {
            format!("{} ({})", kind, target.trim())
        };
        Ok(Self::new(kind, target, description))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: PackageId,
    pub ecosystem: String,
    pub name: String,
    pub version_constraint: String,
}

impl PackageDependency {
    pub fn new(ecosystem: &str, name: &str, version_constraint: &str) -> Self {
        let ecosystem = ecosystem.trim().to_lowercase();
        let name = name.trim().to_string();
        let version_constraint = match version_constraint.trim() {
            "" => "*".to_string(),
            constraint => constraint.to_string(),
        };
        Self {
            id: PackageId(format!("{}/{}@{}", ecosystem, name, version_constraint)),
            ecosystem,
            name,
            version_constraint,
        }
    }

    /// Parse `ecosystem/name[@constraint]`, e.g. `cargo/serde@1.0`.
    pub fn parse_spec(spec: &str) -> Result<Self, ComponentError> {
        let (coordinates, constraint) = spec.rsplit_once('@').unwrap_or((spec, "*"));
        match coordinates.split_once('/') {
            Some((ecosystem, name)) if !ecosystem.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Self::new(ecosystem, name, constraint))
            }
            _ => Err(ComponentError::InvalidPackage(spec.to_string())),
        }
    }
}

// ============================================================================
// Aggregate Root: Component
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Function,
    Class,
    Module,
    #[default]
    Snippet,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Function => write!(f, "function"),
            ComponentKind::Class => write!(f, "class"),
            ComponentKind::Module => write!(f, "module"),
            ComponentKind::Snippet => write!(f, "snippet"),
        }
    }
}

impl FromStr for ComponentKind {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "function" => Ok(ComponentKind::Function),
            "class" => Ok(ComponentKind::Class),
            "module" | "component" => Ok(ComponentKind::Module),
            "snippet" => Ok(ComponentKind::Snippet),
            other => Err(ComponentError::InvalidKind(other.to_string())),
        }
    }
}

/// Input to [`ComponentStore::put`](crate::application::ComponentStore::put).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: String,
    pub language: String,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub packages: Vec<PackageDependency>,
}

impl ComponentDraft {
    pub fn new(name: impl Into<String>, source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source: source.into(),
            language: language.into(),
            kind: ComponentKind::default(),
            tags: Vec::new(),
            permissions: Vec::new(),
            packages: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_package(mut self, package: PackageDependency) -> Self {
        self.packages.push(package);
        self
    }
}

/// A validated draft, split into the component row and the permission and
/// package rows it references.
#[derive(Debug, Clone)]
pub struct PreparedComponent {
    pub component: Component,
    pub permissions: Vec<Permission>,
    pub packages: Vec<PackageDependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub description: String,
    pub source: String,
    pub language: String,
    pub kind: ComponentKind,
    pub tags: BTreeSet<String>,
    pub permissions: BTreeSet<PermissionId>,
    pub packages: BTreeSet<PackageId>,
    pub stats: UsageStats,
    pub created_at: DateTime<Utc>,
}

impl Component {
    pub fn from_draft(draft: ComponentDraft, now: DateTime<Utc>) -> Result<PreparedComponent, ComponentError> {
        let source = normalize_source(&draft.source);
        if source.is_empty() {
            return Err(ComponentError::EmptySource);
        }
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(ComponentError::EmptyName);
        }
        let language = normalize_language(&draft.language);
        if language.is_empty() {
            return Err(ComponentError::EmptyLanguage);
        }

        let component = Component {
            id: ComponentId::for_source(&source),
            name,
            description: draft.description.trim().to_string(),
            source,
            language,
            kind: draft.kind,
            tags: draft
                .tags
                .iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
            permissions: draft.permissions.iter().map(|p| p.id.clone()).collect(),
            packages: draft.packages.iter().map(|p| p.id.clone()).collect(),
            stats: UsageStats::new(now),
            created_at: now,
        };

        Ok(PreparedComponent {
            component,
            permissions: draft.permissions,
            packages: draft.packages,
        })
    }

    /// Words this component can be found by.
    pub fn keywords(&self) -> BTreeSet<String> {
        let mut words = keywords(&self.name);
        words.extend(keywords(&self.description));
        for tag in &self.tags {
            words.extend(keywords(tag));
        }
        words
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Component source text is empty")]
    EmptySource,

    #[error("Component name cannot be empty")]
    EmptyName,

    #[error("Component language cannot be empty")]
    EmptyLanguage,

    #[error("Invalid component id: {0}")]
    InvalidId(String),

    #[error("Invalid component kind: {0} (expected function, class, module or snippet)")]
    InvalidKind(String),

    #[error("Invalid permission spec: {0}")]
    InvalidPermission(String),

    #[error("Invalid package spec: {0} (expected ecosystem/name[@constraint])")]
    InvalidPackage(String),
}
