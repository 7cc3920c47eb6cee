// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per aggregate,
//! interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ComponentRepository` | `Component` (+ permission and package tables) | `InMemoryComponentRepository`, `SledComponentRepository` |
//! | `WorkflowRepository` | `Workflow` (+ pending promotion counters) | `InMemoryWorkflowRepository`, `SledWorkflowRepository` |
//!
//! ## Write serialization
//!
//! Every write is scoped to a single row and applied atomically by the
//! implementation (dashmap entry lock, sled compare-and-swap or transaction).
//! Statistics updates are expressed as [`StatsMutation`]s so the read-modify-write
//! happens under that row lock instead of in the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::domain::component::{Component, ComponentId, PackageDependency, PackageId, Permission, PermissionId};
use crate::domain::stats::StatsMutation;
use crate::domain::workflow::{Workflow, WorkflowId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Sled(SledConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SledConfig {
    pub path: PathBuf,
}

/// Result of an idempotent component insert
#[derive(Debug, Clone)]
pub enum ComponentInsert {
    Inserted,
    /// The content hash was already stored; its usage was recorded and the
    /// updated row is returned.
    Existing(Component),
}

#[derive(Debug, Clone)]
pub enum WorkflowInsert {
    Inserted,
    /// Same ordered member sequence already registered
    Existing(Workflow),
    /// The name belongs to a different member sequence
    NameTaken(WorkflowId),
}

/// Repository interface for Component aggregates and the permission/package
/// tables they reference.
#[async_trait]
pub trait ComponentRepository: Send + Sync {
    /// Insert the component unless its id exists; otherwise record a use on the
    /// existing row. At most one insert happens per id, even under contention.
    async fn insert_or_touch(&self, component: &Component, at: DateTime<Utc>) -> Result<ComponentInsert, RepositoryError>;

    async fn find_by_id(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError>;

    /// Batch lookup; result is positionally aligned with `ids`.
    async fn find_many(&self, ids: &[ComponentId]) -> Result<Vec<Option<Component>>, RepositoryError>;

    /// Apply a statistics mutation atomically. `None` if the id is unknown.
    async fn apply(&self, id: &ComponentId, mutation: StatsMutation) -> Result<Option<Component>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Component>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    /// Insert permission rows that do not exist yet; existing rows are kept.
    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), RepositoryError>;

    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError>;

    /// Insert package rows that do not exist yet; existing rows are kept.
    async fn upsert_packages(&self, packages: &[PackageDependency]) -> Result<(), RepositoryError>;

    async fn find_packages(&self, ids: &[PackageId]) -> Result<Vec<PackageDependency>, RepositoryError>;

    /// Persist buffered writes (no-op for volatile backends)
    async fn flush(&self) -> Result<(), RepositoryError>;
}

/// Repository interface for Workflow aggregates
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Insert the workflow and claim its name in one atomic step.
    async fn insert_if_absent(&self, workflow: &Workflow) -> Result<WorkflowInsert, RepositoryError>;

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError>;

    async fn apply(&self, id: &WorkflowId, mutation: StatsMutation) -> Result<Option<Workflow>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Workflow>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    /// Count one more successful run of a composition that is not a workflow
    /// yet and return the new total. Atomic per composition.
    async fn increment_pending_success(&self, composition: &WorkflowId) -> Result<u32, RepositoryError>;

    async fn clear_pending(&self, composition: &WorkflowId) -> Result<(), RepositoryError>;

    /// Compositions with at least one counted success
    async fn pending_count(&self) -> Result<usize, RepositoryError>;

    async fn flush(&self) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sled::Error> for RepositoryError {
    fn from(err: sled::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
