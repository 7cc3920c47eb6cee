// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ComponentStore: content-addressed component storage and retrieval
//!
//! ## Deduplication
//!
//! A component's id is the hash of its normalized source. Storing a source
//! that is already present never overwrites the row: the existing component's
//! usage count and `last_used` are bumped and its id is returned.
//!
//! ## Ranking
//!
//! [`ComponentStore::find`] keeps components whose name, description or tags
//! share at least one keyword with the query (and whose language matches when
//! the query names one), then orders them by success rate, usage count and
//! recency, best first. `find` is read-only; callers that actually use a
//! result record it with [`ComponentStore::mark_used`].

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::capability::CapabilityQuery;
use crate::domain::component::{
    Component, ComponentDraft, ComponentError, ComponentId, PackageDependency, Permission,
};
use crate::domain::events::ComponentEvent;
use crate::domain::repository::{ComponentInsert, ComponentRepository, RepositoryError};
use crate::domain::stats::{StatsMutation, DEFAULT_SUCCESS_ALPHA};
use crate::infrastructure::event_bus::EventBus;

/// One `find` hit
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMatch {
    pub component: Component,
    /// Fraction of query keywords the component carries, in (0, 1]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredComponent {
    pub id: ComponentId,
    /// False when the source was already stored
    pub created: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ComponentStoreError {
    #[error("Invalid component: {0}")]
    InvalidComponent(#[from] ComponentError),

    #[error("Component not found: {0}")]
    NotFound(ComponentId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct ComponentStore {
    repository: Arc<dyn ComponentRepository>,
    event_bus: Arc<EventBus>,
    alpha: f64,
}

impl ComponentStore {
    pub fn new(repository: Arc<dyn ComponentRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            repository,
            event_bus,
            alpha: DEFAULT_SUCCESS_ALPHA,
        }
    }

    /// Weight of the newest outcome in the success-rate moving average
    pub fn with_success_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn success_alpha(&self) -> f64 {
        self.alpha
    }

    pub async fn put(&self, draft: ComponentDraft) -> Result<ComponentId, ComponentStoreError> {
        Ok(self.put_with_outcome(draft).await?.id)
    }

    /// Like [`put`](Self::put), but also tells whether a new row was created.
    pub async fn put_with_outcome(&self, draft: ComponentDraft) -> Result<StoredComponent, ComponentStoreError> {
        let now = Utc::now();
        let prepared = Component::from_draft(draft, now)?;
        let component = prepared.component;

        // Referenced rows go in before the component, so a stored component
        // never points at a permission or package that is missing.
        self.repository.upsert_permissions(&prepared.permissions).await?;
        self.repository.upsert_packages(&prepared.packages).await?;

        match self.repository.insert_or_touch(&component, now).await? {
            ComponentInsert::Inserted => {
                info!(
                    component_id = %component.id.short(),
                    name = %component.name,
                    language = %component.language,
                    "Stored new component"
                );
                metrics::counter!("blockyard_components_stored_total").increment(1);

                self.event_bus.publish_component_event(ComponentEvent::ComponentStored {
                    component_id: component.id.clone(),
                    name: component.name.clone(),
                    language: component.language.clone(),
                    stored_at: now,
                });

                Ok(StoredComponent {
                    id: component.id,
                    created: true,
                })
            }
            ComponentInsert::Existing(existing) => {
                debug!(
                    component_id = %existing.id.short(),
                    usage_count = existing.stats.usage_count,
                    "Component already stored, recorded reuse"
                );
                metrics::counter!("blockyard_components_reused_total").increment(1);

                self.event_bus.publish_component_event(ComponentEvent::ComponentReused {
                    component_id: existing.id.clone(),
                    usage_count: existing.stats.usage_count,
                    reused_at: now,
                });

                Ok(StoredComponent {
                    id: existing.id,
                    created: false,
                })
            }
        }
    }

    pub async fn get(&self, id: &ComponentId) -> Result<Option<Component>, ComponentStoreError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Batch lookup in one repository call; the result is aligned with `ids`.
    pub async fn get_many(&self, ids: &[ComponentId]) -> Result<Vec<Option<Component>>, ComponentStoreError> {
        Ok(self.repository.find_many(ids).await?)
    }

    pub async fn find(&self, query: &CapabilityQuery) -> Result<Vec<ComponentMatch>, ComponentStoreError> {
        let mut matches: Vec<ComponentMatch> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|component| query.accepts_language(&component.language))
            .filter_map(|component| {
                query
                    .score(&component.keywords())
                    .map(|relevance| ComponentMatch { component, relevance })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.component
                .stats
                .rank_cmp(&b.component.stats)
                .then_with(|| a.component.id.cmp(&b.component.id))
        });
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        debug!(query = %query.text, hits = matches.len(), "Component search");
        Ok(matches)
    }

    /// Fold one execution outcome into the component's success rate.
    pub async fn record_outcome(&self, id: &ComponentId, succeeded: bool) -> Result<Component, ComponentStoreError> {
        let before = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ComponentStoreError::NotFound(id.clone()))?;

        let updated = self
            .repository
            .apply(
                id,
                StatsMutation::RecordOutcome {
                    succeeded,
                    alpha: self.alpha,
                },
            )
            .await?
            .ok_or_else(|| ComponentStoreError::NotFound(id.clone()))?;

        debug!(
            component_id = %id.short(),
            succeeded,
            success_rate = updated.stats.success_rate,
            "Recorded component outcome"
        );

        self.event_bus.publish_component_event(ComponentEvent::ComponentOutcomeRecorded {
            component_id: id.clone(),
            succeeded,
            old_rate: before.stats.success_rate,
            new_rate: updated.stats.success_rate,
            recorded_at: Utc::now(),
        });

        Ok(updated)
    }

    /// Record that the given components were selected for use.
    pub async fn mark_used(&self, ids: &[ComponentId]) -> Result<(), ComponentStoreError> {
        let at = Utc::now();
        for id in ids {
            if self.repository.apply(id, StatsMutation::MarkUsed { at }).await?.is_none() {
                return Err(ComponentStoreError::NotFound(id.clone()));
            }
        }
        Ok(())
    }

    pub async fn permissions_of(&self, component: &Component) -> Result<Vec<Permission>, ComponentStoreError> {
        let ids: Vec<_> = component.permissions.iter().cloned().collect();
        Ok(self.repository.find_permissions(&ids).await?)
    }

    pub async fn packages_of(&self, component: &Component) -> Result<Vec<PackageDependency>, ComponentStoreError> {
        let ids: Vec<_> = component.packages.iter().cloned().collect();
        Ok(self.repository.find_packages(&ids).await?)
    }

    /// Union of the permission and package rows of several components,
    /// deduplicated, in first-seen order.
    pub async fn requirements_of(
        &self,
        components: &[Component],
    ) -> Result<(Vec<Permission>, Vec<PackageDependency>), ComponentStoreError> {
        let mut permission_ids = Vec::new();
        let mut package_ids = Vec::new();
        let mut seen_permissions = BTreeSet::new();
        let mut seen_packages = BTreeSet::new();

        for component in components {
            for id in &component.permissions {
                if seen_permissions.insert(id.clone()) {
                    permission_ids.push(id.clone());
                }
            }
            for id in &component.packages {
                if seen_packages.insert(id.clone()) {
                    package_ids.push(id.clone());
                }
            }
        }

        let (permissions, packages) = futures::try_join!(
            self.repository.find_permissions(&permission_ids),
            self.repository.find_packages(&package_ids),
        )?;
        Ok((permissions, packages))
    }

    pub async fn count(&self) -> Result<usize, ComponentStoreError> {
        Ok(self.repository.count().await?)
    }

    /// Every stored component, most recently created first.
    pub async fn list(&self) -> Result<Vec<Component>, ComponentStoreError> {
        let mut components = self.repository.list_all().await?;
        components.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(components)
    }

    pub async fn flush(&self) -> Result<(), ComponentStoreError> {
        Ok(self.repository.flush().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{PackageId, PermissionId, PermissionKind};
    use crate::infrastructure::repositories::InMemoryComponentRepository;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn store() -> ComponentStore {
        ComponentStore::new(Arc::new(InMemoryComponentRepository::new()), Arc::new(EventBus::new(64)))
    }

    fn sort_draft() -> ComponentDraft {
        ComponentDraft::new("sort list", "def sort(xs):\n    return sorted(xs)\n", "python")
            .with_tags(["sorting"])
    }

    #[tokio::test]
    async fn test_put_identical_source_returns_same_id() {
        let store = store();
        let first = store.put_with_outcome(sort_draft()).await.unwrap();
        let second = store
            .put_with_outcome(
                ComponentDraft::new("another name", "\r\ndef sort(xs):   \r\n    return sorted(xs)", "python"),
            )
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count().await.unwrap(), 1);

        let stored = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "sort list");
        assert_eq!(stored.stats.usage_count, 1);
    }

    #[tokio::test]
    async fn test_put_rejects_empty_source() {
        let store = store();
        let err = store.put(ComponentDraft::new("blank", "\n   \n", "python")).await.unwrap_err();
        assert!(matches!(err, ComponentStoreError::InvalidComponent(ComponentError::EmptySource)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_filters_language_and_keywords() {
        let store = store();
        store.put(sort_draft()).await.unwrap();
        store
            .put(ComponentDraft::new("sort list", "fn sort(v: &mut Vec<i32>) { v.sort() }", "rust"))
            .await
            .unwrap();
        store
            .put(ComponentDraft::new("parse json", "json.loads(s)", "python"))
            .await
            .unwrap();

        let query = CapabilityQuery::new("sort a list").with_language(Some("python"));
        let hits = store.find(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].component.language, "python");
        assert!((hits[0].relevance - 1.0).abs() < 1e-9);

        let none = store.find(&CapabilityQuery::new("render video")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_ranks_by_success_then_usage() {
        let store = store();
        let a = store.put(ComponentDraft::new("cache a", "a = {}", "python")).await.unwrap();
        let b = store.put(ComponentDraft::new("cache b", "b = {}", "python")).await.unwrap();

        store.mark_used(&[a.clone(), b.clone(), b.clone()]).await.unwrap();
        let hits = store.find(&CapabilityQuery::new("cache")).await.unwrap();
        assert_eq!(hits[0].component.id, b);

        store.record_outcome(&b, false).await.unwrap();
        let hits = store.find(&CapabilityQuery::new("cache")).await.unwrap();
        assert_eq!(hits[0].component.id, a);
    }

    #[tokio::test]
    async fn test_record_outcome_unknown_id() {
        let store = store();
        let err = store
            .record_outcome(&ComponentId::for_source("missing"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_requirements_are_shared_rows() {
        let store = store();
        let egress = Permission::new(PermissionKind::NetworkEgress, "api.example.com", "call the API");
        let requests = PackageDependency::new("pypi", "requests", ">=2");

        let first = store
            .put(
                ComponentDraft::new("fetch user", "get('/user')", "python")
                    .with_permission(egress.clone())
                    .with_package(requests.clone()),
            )
            .await
            .unwrap();
        let second = store
            .put(
                ComponentDraft::new("fetch repo", "get('/repo')", "python")
                    .with_permission(egress.clone())
                    .with_package(requests.clone()),
            )
            .await
            .unwrap();

        let components: Vec<Component> = store
            .get_many(&[first, second])
            .await
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        let (permissions, packages) = store.requirements_of(&components).await.unwrap();

        assert_eq!(permissions, vec![egress]);
        assert_eq!(packages, vec![requests]);
        assert_eq!(store.permissions_of(&components[0]).await.unwrap().len(), 1);
        assert_eq!(store.packages_of(&components[1]).await.unwrap().len(), 1);
    }

    /// Fails the first permission write, then behaves like the wrapped store.
    struct FirstPermissionWriteFails {
        inner: InMemoryComponentRepository,
        failed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ComponentRepository for FirstPermissionWriteFails {
        async fn insert_or_touch(&self, component: &Component, at: chrono::DateTime<Utc>) -> Result<ComponentInsert, RepositoryError> {
            self.inner.insert_or_touch(component, at).await
        }

        async fn find_by_id(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn find_many(&self, ids: &[ComponentId]) -> Result<Vec<Option<Component>>, RepositoryError> {
            self.inner.find_many(ids).await
        }

        async fn apply(&self, id: &ComponentId, mutation: StatsMutation) -> Result<Option<Component>, RepositoryError> {
            self.inner.apply(id, mutation).await
        }

        async fn list_all(&self) -> Result<Vec<Component>, RepositoryError> {
            self.inner.list_all().await
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            self.inner.count().await
        }

        async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), RepositoryError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(RepositoryError::Database("disk full".to_string()));
            }
            self.inner.upsert_permissions(permissions).await
        }

        async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError> {
            self.inner.find_permissions(ids).await
        }

        async fn upsert_packages(&self, packages: &[PackageDependency]) -> Result<(), RepositoryError> {
            self.inner.upsert_packages(packages).await
        }

        async fn find_packages(&self, ids: &[PackageId]) -> Result<Vec<PackageDependency>, RepositoryError> {
            self.inner.find_packages(ids).await
        }

        async fn flush(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_permission_write_leaves_no_dangling_reference() {
        let repository = Arc::new(FirstPermissionWriteFails {
            inner: InMemoryComponentRepository::new(),
            failed: AtomicBool::new(false),
        });
        let store = ComponentStore::new(repository, Arc::new(EventBus::new(64)));
        let draft = ComponentDraft::new("read secret", "vault.read('db')", "python")
            .with_permission(Permission::parse_spec("secret-access:db").unwrap());

        let err = store.put(draft.clone()).await.unwrap_err();
        assert!(matches!(err, ComponentStoreError::Repository(RepositoryError::Database(_))));
        assert_eq!(store.count().await.unwrap(), 0);

        let stored = store.put_with_outcome(draft).await.unwrap();
        assert!(stored.created);
        let component = store.get(&stored.id).await.unwrap().unwrap();
        let (permissions, _) = store.requirements_of(&[component.clone()]).await.unwrap();
        assert_eq!(permissions.len(), component.permissions.len());
        assert_eq!(permissions[0].id.0, "secret-access:db");
    }
}
