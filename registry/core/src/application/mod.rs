// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod collaborators;
pub mod component_store;
pub mod coordinator;
pub mod repository_factory;
pub mod runtime;
pub mod workflow_registry;

// Re-export services for convenience
pub use collaborators::{ComponentGenerator, ExecutionValidator, GeneratedComponent, GenerationError, UnavailableGenerator};
pub use component_store::{ComponentMatch, ComponentStore, ComponentStoreError, StoredComponent};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorSettings, OutcomeSummary, SystemStatus};
pub use repository_factory::{open_repositories, Repositories};
pub use runtime::RegistryRuntime;
pub use workflow_registry::{WorkflowMatch, WorkflowRegistry, WorkflowRegistryError};
