// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Registry runtime: wires configuration, repositories, services and the
//! coordinator together. The entry point owns one runtime and closes it on the
//! way out so durable backends are flushed.

use std::sync::Arc;
use tracing::info;

use crate::application::collaborators::{ComponentGenerator, UnavailableGenerator};
use crate::application::component_store::ComponentStore;
use crate::application::coordinator::{Coordinator, CoordinatorSettings};
use crate::application::repository_factory::open_repositories;
use crate::application::workflow_registry::WorkflowRegistry;
use crate::domain::registry_config::RegistryConfigManifest;
use crate::infrastructure::command_generator::CommandGenerator;
use crate::infrastructure::event_bus::EventBus;

pub struct RegistryRuntime {
    pub config: RegistryConfigManifest,
    pub event_bus: Arc<EventBus>,
    pub components: Arc<ComponentStore>,
    pub workflows: Arc<WorkflowRegistry>,
    pub coordinator: Arc<Coordinator>,
}

impl RegistryRuntime {
    /// Open with the generator named in the configuration, if any.
    pub fn open(config: RegistryConfigManifest) -> anyhow::Result<Self> {
        let generator: Arc<dyn ComponentGenerator> = match CommandGenerator::from_command(&config.spec.generator.command) {
            Some(generator) => Arc::new(generator),
            None => Arc::new(UnavailableGenerator),
        };
        Self::open_with_generator(config, generator)
    }

    pub fn open_with_generator(
        config: RegistryConfigManifest,
        generator: Arc<dyn ComponentGenerator>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let backend = config.storage_backend();
        let repositories = open_repositories(&backend)
            .map_err(|e| anyhow::anyhow!("Failed to open {:?} storage: {}", backend, e))?;

        let event_bus = Arc::new(EventBus::new(config.spec.event_bus.capacity));
        let components = Arc::new(
            ComponentStore::new(repositories.components, event_bus.clone())
                .with_success_alpha(config.spec.scoring.success_rate_alpha),
        );
        let workflows = Arc::new(WorkflowRegistry::new(
            repositories.workflows,
            components.clone(),
            event_bus.clone(),
        ));
        let coordinator = Arc::new(Coordinator::new(
            components.clone(),
            workflows.clone(),
            generator,
            event_bus.clone(),
            CoordinatorSettings::from_config(&config),
        ));

        info!(registry = %config.metadata.name, ?backend, "Registry runtime opened");

        Ok(Self {
            config,
            event_bus,
            components,
            workflows,
            coordinator,
        })
    }

    /// Flush buffered writes.
    pub async fn close(self) -> anyhow::Result<()> {
        self.components.flush().await?;
        self.workflows.flush().await?;
        info!(registry = %self.config.metadata.name, "Registry runtime closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ComponentDraft;

    #[tokio::test]
    async fn test_open_in_memory_and_close() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        runtime
            .components
            .put(ComponentDraft::new("noop", "pass", "python"))
            .await
            .unwrap();
        assert_eq!(runtime.coordinator.status().await.unwrap().components, 1);
        runtime.close().await.unwrap();
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = RegistryConfigManifest::in_memory();
        config.spec.scoring.search_limit = 0;
        assert!(RegistryRuntime::open(config).is_err());
    }
}
