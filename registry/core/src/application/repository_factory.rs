// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations for the configured storage
//! backend, keeping the domain layer free of infrastructure types.

use std::sync::Arc;

use crate::domain::repository::{ComponentRepository, RepositoryError, StorageBackend, WorkflowRepository};
use crate::infrastructure::repositories::{InMemoryComponentRepository, InMemoryWorkflowRepository, SledDatabase};

/// The repositories of one registry, opened together.
#[derive(Clone)]
pub struct Repositories {
    pub components: Arc<dyn ComponentRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
}

/// Open both repositories for `backend`. Sled-backed repositories share one
/// database handle.
pub fn open_repositories(backend: &StorageBackend) -> Result<Repositories, RepositoryError> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories {
            components: Arc::new(InMemoryComponentRepository::new()),
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
        }),
        StorageBackend::Sled(config) => {
            let db = SledDatabase::open(&config.path)?;
            Ok(Repositories {
                components: Arc::new(db.component_repository()?),
                workflows: Arc::new(db.workflow_repository()?),
            })
        }
    }
}
