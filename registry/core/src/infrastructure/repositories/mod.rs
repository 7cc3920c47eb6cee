// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! [`crate::domain::repository`].
//!
//! # Available Implementations
//!
//! ## In-Memory Repositories
//!
//! Volatile, `dashmap`-backed storage for tests and one-off runs:
//! - **InMemoryComponentRepository** - components plus permission and package tables
//! - **InMemoryWorkflowRepository** - workflows, the unique name index and pending promotion counters
//!
//! ## Sled Repositories
//!
//! Embedded durable storage, see [`sled_store`]:
//! - **SledComponentRepository**
//! - **SledWorkflowRepository**
//!
//! Writes lock a single key: dashmap entries hold the shard lock for the
//! duration of the read-modify-write, so concurrent inserts of one id resolve
//! to one row.

pub mod sled_store;

pub use sled_store::{SledComponentRepository, SledDatabase, SledWorkflowRepository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::component::{Component, ComponentId, PackageDependency, PackageId, Permission, PermissionId};
use crate::domain::repository::{
    ComponentInsert, ComponentRepository, RepositoryError, WorkflowInsert, WorkflowRepository,
};
use crate::domain::stats::StatsMutation;
use crate::domain::workflow::{Workflow, WorkflowId};

#[derive(Clone, Default)]
pub struct InMemoryComponentRepository {
    components: Arc<DashMap<ComponentId, Component>>,
    permissions: Arc<DashMap<PermissionId, Permission>>,
    packages: Arc<DashMap<PackageId, PackageDependency>>,
}

impl InMemoryComponentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComponentRepository for InMemoryComponentRepository {
    async fn insert_or_touch(&self, component: &Component, at: DateTime<Utc>) -> Result<ComponentInsert, RepositoryError> {
        match self.components.entry(component.id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().stats.record_use(at);
                Ok(ComponentInsert::Existing(entry.get().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(component.clone());
                Ok(ComponentInsert::Inserted)
            }
        }
    }

    async fn find_by_id(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError> {
        Ok(self.components.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_many(&self, ids: &[ComponentId]) -> Result<Vec<Option<Component>>, RepositoryError> {
        Ok(ids
            .iter()
            .map(|id| self.components.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn apply(&self, id: &ComponentId, mutation: StatsMutation) -> Result<Option<Component>, RepositoryError> {
        Ok(self.components.get_mut(id).map(|mut entry| {
            mutation.apply(&mut entry.stats);
            entry.value().clone()
        }))
    }

    async fn list_all(&self) -> Result<Vec<Component>, RepositoryError> {
        Ok(self.components.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.components.len())
    }

    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), RepositoryError> {
        for permission in permissions {
            self.permissions
                .entry(permission.id.clone())
                .or_insert_with(|| permission.clone());
        }
        Ok(())
    }

    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.permissions.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn upsert_packages(&self, packages: &[PackageDependency]) -> Result<(), RepositoryError> {
        for package in packages {
            self.packages
                .entry(package.id.clone())
                .or_insert_with(|| package.clone());
        }
        Ok(())
    }

    async fn find_packages(&self, ids: &[PackageId]) -> Result<Vec<PackageDependency>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.packages.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<DashMap<WorkflowId, Workflow>>,
    names: Arc<DashMap<String, WorkflowId>>,
    pending_promotions: Arc<DashMap<WorkflowId, u32>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert_if_absent(&self, workflow: &Workflow) -> Result<WorkflowInsert, RepositoryError> {
        // Lock order is always name index, then rows.
        let name_entry = self.names.entry(workflow.name.clone());
        if let Entry::Occupied(existing) = &name_entry {
            if existing.get() != &workflow.id {
                return Ok(WorkflowInsert::NameTaken(existing.get().clone()));
            }
        }

        match self.workflows.entry(workflow.id.clone()) {
            Entry::Occupied(existing) => Ok(WorkflowInsert::Existing(existing.get().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(workflow.clone());
                name_entry.or_insert_with(|| workflow.id.clone());
                Ok(WorkflowInsert::Inserted)
            }
        }
    }

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError> {
        let id = match self.names.get(name) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        self.find_by_id(&id).await
    }

    async fn apply(&self, id: &WorkflowId, mutation: StatsMutation) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get_mut(id).map(|mut entry| {
            mutation.apply(&mut entry.stats);
            entry.value().clone()
        }))
    }

    async fn list_all(&self) -> Result<Vec<Workflow>, RepositoryError> {
        Ok(self.workflows.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.workflows.len())
    }

    async fn increment_pending_success(&self, composition: &WorkflowId) -> Result<u32, RepositoryError> {
        let mut count = self.pending_promotions.entry(composition.clone()).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn clear_pending(&self, composition: &WorkflowId) -> Result<(), RepositoryError> {
        self.pending_promotions.remove(composition);
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.pending_promotions.len())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ComponentDraft;

    fn component(name: &str, source: &str) -> Component {
        Component::from_draft(ComponentDraft::new(name, source, "rust"), Utc::now())
            .unwrap()
            .component
    }

    #[tokio::test]
    async fn test_insert_then_touch() {
        let repo = InMemoryComponentRepository::new();
        let c = component("sort", "fn sort() {}");

        assert!(matches!(repo.insert_or_touch(&c, Utc::now()).await.unwrap(), ComponentInsert::Inserted));
        match repo.insert_or_touch(&c, Utc::now()).await.unwrap() {
            ComponentInsert::Existing(existing) => assert_eq!(existing.stats.usage_count, 1),
            ComponentInsert::Inserted => panic!("second insert must hit the existing row"),
        }
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_inserts_store_one_row() {
        let repo = InMemoryComponentRepository::new();
        let c = component("sort", "fn sort() {}");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            let c = c.clone();
            handles.push(tokio::spawn(async move { repo.insert_or_touch(&c, Utc::now()).await.unwrap() }));
        }

        let mut inserted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ComponentInsert::Inserted) {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
        let stored = repo.find_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.stats.usage_count, 15);
    }

    #[tokio::test]
    async fn test_find_many_preserves_positions() {
        let repo = InMemoryComponentRepository::new();
        let a = component("a", "a()");
        let b = component("b", "b()");
        repo.insert_or_touch(&a, Utc::now()).await.unwrap();
        repo.insert_or_touch(&b, Utc::now()).await.unwrap();

        let missing = ComponentId::for_source("missing");
        let found = repo.find_many(&[b.id.clone(), missing, a.id.clone()]).await.unwrap();
        assert_eq!(found[0].as_ref().map(|c| &c.id), Some(&b.id));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().map(|c| &c.id), Some(&a.id));
    }

    #[tokio::test]
    async fn test_permission_first_writer_wins() {
        let repo = InMemoryComponentRepository::new();
        let first = Permission::parse_spec("network-egress:example.com").unwrap();
        let mut second = first.clone();
        second.description = "rewritten".to_string();

        repo.upsert_permissions(&[first.clone()]).await.unwrap();
        repo.upsert_permissions(&[second]).await.unwrap();

        let stored = repo.find_permissions(&[first.id.clone()]).await.unwrap();
        assert_eq!(stored, vec![first]);
    }

    #[tokio::test]
    async fn test_apply_unknown_id_is_none() {
        let repo = InMemoryComponentRepository::new();
        let outcome = repo
            .apply(&ComponentId::for_source("nope"), StatsMutation::RecordOutcome { succeeded: true, alpha: 0.1 })
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_workflow_name_and_sequence_rules() {
        let repo = InMemoryWorkflowRepository::new();
        let a = component("a", "a()");
        let b = component("b", "b()");

        let ab = Workflow::compose("pipeline", "", &[a.clone(), b.clone()], Utc::now()).unwrap();
        let ab_renamed = Workflow::compose("other-name", "", &[a.clone(), b.clone()], Utc::now()).unwrap();
        let ba = Workflow::compose("pipeline", "", &[b, a], Utc::now()).unwrap();

        assert!(matches!(repo.insert_if_absent(&ab).await.unwrap(), WorkflowInsert::Inserted));
        assert!(matches!(repo.insert_if_absent(&ab_renamed).await.unwrap(), WorkflowInsert::Existing(_)));
        match repo.insert_if_absent(&ba).await.unwrap() {
            WorkflowInsert::NameTaken(owner) => assert_eq!(owner, ab.id),
            other => panic!("expected NameTaken, got {:?}", other),
        }

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.find_by_name("pipeline").await.unwrap().unwrap().id, ab.id);
        assert!(repo.find_by_name("other-name").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_success_counter() {
        let repo = InMemoryWorkflowRepository::new();
        let composition = WorkflowId::for_members(&[ComponentId::for_source("a()")]);

        assert_eq!(repo.increment_pending_success(&composition).await.unwrap(), 1);
        assert_eq!(repo.increment_pending_success(&composition).await.unwrap(), 2);
        assert_eq!(repo.pending_count().await.unwrap(), 1);

        repo.clear_pending(&composition).await.unwrap();
        assert_eq!(repo.pending_count().await.unwrap(), 0);
        assert_eq!(repo.increment_pending_success(&composition).await.unwrap(), 1);
    }
}
