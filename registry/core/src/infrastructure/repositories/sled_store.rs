// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sled-backed repositories.
//!
//! One sled database per registry, one tree per table:
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `components` | component id | `Component` (JSON) |
//! | `permissions` | permission id | `Permission` (JSON) |
//! | `packages` | package id | `PackageDependency` (JSON) |
//! | `workflows` | workflow id | `Workflow` (JSON) |
//! | `workflow_names` | workflow name | workflow id |
//! | `pending_promotions` | composition id | success count (`u32`, big endian) |
//!
//! Inserts use `compare_and_swap` against an absent key, statistics updates
//! use `update_and_fetch`, and a workflow row is written together with its
//! name in one two-tree transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};

use crate::domain::component::{Component, ComponentId, PackageDependency, PackageId, Permission, PermissionId};
use crate::domain::repository::{
    ComponentInsert, ComponentRepository, RepositoryError, WorkflowInsert, WorkflowRepository,
};
use crate::domain::stats::StatsMutation;
use crate::domain::workflow::{Workflow, WorkflowId};

const COMPONENTS_TREE: &str = "components";
const PERMISSIONS_TREE: &str = "permissions";
const PACKAGES_TREE: &str = "packages";
const WORKFLOWS_TREE: &str = "workflows";
const WORKFLOW_NAMES_TREE: &str = "workflow_names";
const PENDING_PROMOTIONS_TREE: &str = "pending_promotions";

/// An open sled database and the trees the repositories share.
#[derive(Clone)]
pub struct SledDatabase {
    db: sled::Db,
}

impl SledDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::Database(format!("cannot create {:?}: {}", parent, e)))?;
            }
        }
        let db = sled::open(path)?;
        info!("Opened sled store at {:?}", path);
        Ok(Self { db })
    }

    pub fn component_repository(&self) -> Result<SledComponentRepository, RepositoryError> {
        Ok(SledComponentRepository {
            db: self.db.clone(),
            components: self.db.open_tree(COMPONENTS_TREE)?,
            permissions: self.db.open_tree(PERMISSIONS_TREE)?,
            packages: self.db.open_tree(PACKAGES_TREE)?,
        })
    }

    pub fn workflow_repository(&self) -> Result<SledWorkflowRepository, RepositoryError> {
        Ok(SledWorkflowRepository {
            db: self.db.clone(),
            workflows: self.db.open_tree(WORKFLOWS_TREE)?,
            names: self.db.open_tree(WORKFLOW_NAMES_TREE)?,
            pending: self.db.open_tree(PENDING_PROMOTIONS_TREE)?,
        })
    }

    pub async fn flush(&self) -> Result<(), RepositoryError> {
        let bytes = self.db.flush_async().await?;
        debug!(bytes, "Flushed sled store");
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RepositoryError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_row<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, RepositoryError> {
    tree.get(key.as_bytes())?.map(|bytes| decode(&bytes)).transpose()
}

fn list_rows<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, RepositoryError> {
    tree.iter()
        .values()
        .map(|value| decode(&value?))
        .collect()
}

/// Insert rows whose key is still absent; existing rows are left untouched.
fn insert_absent<T: Serialize>(tree: &Tree, rows: &[(String, &T)]) -> Result<(), RepositoryError> {
    for (key, row) in rows {
        let encoded = serde_json::to_vec(row)?;
        // A lost race means another writer stored the row first
        let _ = tree.compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(encoded))?;
    }
    Ok(())
}

/// Atomically read-modify-write one JSON row. Returns the updated row, or
/// `None` when the key is absent.
fn update_row<T, F>(tree: &Tree, key: &str, mut mutate: F) -> Result<Option<T>, RepositoryError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T),
{
    let mut failure: Option<RepositoryError> = None;
    let mut updated: Option<T> = None;

    // The closure may run more than once under contention; only the last
    // run's results count.
    tree.update_and_fetch(key.as_bytes(), |current| {
        failure = None;
        updated = None;
        let bytes = current?;
        let mut row = match serde_json::from_slice::<T>(bytes) {
            Ok(row) => row,
            Err(e) => {
                failure = Some(e.into());
                return Some(bytes.to_vec());
            }
        };
        mutate(&mut row);
        match serde_json::to_vec(&row) {
            Ok(encoded) => {
                updated = Some(row);
                Some(encoded)
            }
            Err(e) => {
                failure = Some(e.into());
                Some(bytes.to_vec())
            }
        }
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(updated),
    }
}

#[derive(Clone)]
pub struct SledComponentRepository {
    db: sled::Db,
    components: Tree,
    permissions: Tree,
    packages: Tree,
}

#[async_trait]
impl ComponentRepository for SledComponentRepository {
    async fn insert_or_touch(&self, component: &Component, at: DateTime<Utc>) -> Result<ComponentInsert, RepositoryError> {
        let key = component.id.as_str();
        let encoded = serde_json::to_vec(component)?;

        loop {
            if self
                .components
                .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(encoded.clone()))?
                .is_ok()
            {
                return Ok(ComponentInsert::Inserted);
            }

            let touched = update_row::<Component, _>(&self.components, key, |row| row.stats.record_use(at))?;
            if let Some(existing) = touched {
                return Ok(ComponentInsert::Existing(existing));
            }
        }
    }

    async fn find_by_id(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError> {
        get_row(&self.components, id.as_str())
    }

    async fn find_many(&self, ids: &[ComponentId]) -> Result<Vec<Option<Component>>, RepositoryError> {
        ids.iter()
            .map(|id| get_row(&self.components, id.as_str()))
            .collect()
    }

    async fn apply(&self, id: &ComponentId, mutation: StatsMutation) -> Result<Option<Component>, RepositoryError> {
        update_row::<Component, _>(&self.components, id.as_str(), |row| mutation.apply(&mut row.stats))
    }

    async fn list_all(&self) -> Result<Vec<Component>, RepositoryError> {
        list_rows(&self.components)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.components.len())
    }

    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), RepositoryError> {
        let rows: Vec<(String, &Permission)> = permissions.iter().map(|p| (p.id.0.clone(), p)).collect();
        insert_absent(&self.permissions, &rows)
    }

    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<Permission>, RepositoryError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(permission) = get_row(&self.permissions, &id.0)? {
                found.push(permission);
            }
        }
        Ok(found)
    }

    async fn upsert_packages(&self, packages: &[PackageDependency]) -> Result<(), RepositoryError> {
        let rows: Vec<(String, &PackageDependency)> = packages.iter().map(|p| (p.id.0.clone(), p)).collect();
        insert_absent(&self.packages, &rows)
    }

    async fn find_packages(&self, ids: &[PackageId]) -> Result<Vec<PackageDependency>, RepositoryError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(package) = get_row(&self.packages, &id.0)? {
                found.push(package);
            }
        }
        Ok(found)
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

enum RawWorkflowInsert {
    Inserted,
    Existing(sled::IVec),
    NameTaken(sled::IVec),
}

/// Counter rows are 4 big-endian bytes; anything else reads as zero.
fn decode_count(bytes: &[u8]) -> u32 {
    <[u8; 4]>::try_from(bytes).map(u32::from_be_bytes).unwrap_or(0)
}

#[derive(Clone)]
pub struct SledWorkflowRepository {
    db: sled::Db,
    workflows: Tree,
    names: Tree,
    pending: Tree,
}

#[async_trait]
impl WorkflowRepository for SledWorkflowRepository {
    async fn insert_if_absent(&self, workflow: &Workflow) -> Result<WorkflowInsert, RepositoryError> {
        let id_key = workflow.id.as_str().as_bytes();
        let name_key = workflow.name.as_bytes();
        let row = serde_json::to_vec(workflow)?;

        let result: TransactionResult<RawWorkflowInsert, RepositoryError> =
            (&self.workflows, &self.names).transaction(|(workflows, names)| {
                if let Some(owner) = names.get(name_key)? {
                    if owner.as_ref() != id_key {
                        return Ok(RawWorkflowInsert::NameTaken(owner));
                    }
                }
                if let Some(existing) = workflows.get(id_key)? {
                    return Ok(RawWorkflowInsert::Existing(existing));
                }
                workflows.insert(id_key, row.as_slice())?;
                names.insert(name_key, id_key)?;
                Ok(RawWorkflowInsert::Inserted)
            });

        let raw = match result {
            Ok(raw) => raw,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        };

        match raw {
            RawWorkflowInsert::Inserted => Ok(WorkflowInsert::Inserted),
            RawWorkflowInsert::Existing(bytes) => Ok(WorkflowInsert::Existing(decode(&bytes)?)),
            RawWorkflowInsert::NameTaken(owner) => {
                let owner = WorkflowId::parse(&String::from_utf8_lossy(&owner))
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
                Ok(WorkflowInsert::NameTaken(owner))
            }
        }
    }

    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        get_row(&self.workflows, id.as_str())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, RepositoryError> {
        let Some(id) = self.names.get(name.as_bytes())? else {
            return Ok(None);
        };
        match self.workflows.get(&id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Err(RepositoryError::NotFound(format!(
                "workflow name '{}' points at missing row {}",
                name,
                String::from_utf8_lossy(&id)
            ))),
        }
    }

    async fn apply(&self, id: &WorkflowId, mutation: StatsMutation) -> Result<Option<Workflow>, RepositoryError> {
        update_row::<Workflow, _>(&self.workflows, id.as_str(), |row| mutation.apply(&mut row.stats))
    }

    async fn list_all(&self) -> Result<Vec<Workflow>, RepositoryError> {
        list_rows(&self.workflows)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.workflows.len())
    }

    async fn increment_pending_success(&self, composition: &WorkflowId) -> Result<u32, RepositoryError> {
        let updated = self.pending.update_and_fetch(composition.as_str().as_bytes(), |current| {
            let count = current.map(decode_count).unwrap_or(0);
            Some(count.saturating_add(1).to_be_bytes().to_vec())
        })?;
        Ok(updated.as_deref().map(decode_count).unwrap_or(0))
    }

    async fn clear_pending(&self, composition: &WorkflowId) -> Result<(), RepositoryError> {
        self.pending.remove(composition.as_str().as_bytes())?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.pending.len())
    }

    async fn flush(&self) -> Result<(), RepositoryError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ComponentDraft;
    use tempfile::TempDir;

    fn component(name: &str, source: &str) -> Component {
        Component::from_draft(ComponentDraft::new(name, source, "python"), Utc::now())
            .unwrap()
            .component
    }

    fn open() -> (TempDir, SledDatabase) {
        let dir = TempDir::new().unwrap();
        let db = SledDatabase::open(dir.path().join("store")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_insert_or_touch_dedups() {
        let (_dir, db) = open();
        let repo = db.component_repository().unwrap();
        let c = component("sort", "sorted(xs)");

        assert!(matches!(repo.insert_or_touch(&c, Utc::now()).await.unwrap(), ComponentInsert::Inserted));
        match repo.insert_or_touch(&c, Utc::now()).await.unwrap() {
            ComponentInsert::Existing(existing) => {
                assert_eq!(existing.stats.usage_count, 1);
                assert_eq!(existing.source, c.source);
            }
            ComponentInsert::Inserted => panic!("duplicate insert"),
        }
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_inserts_store_one_row() {
        let (_dir, db) = open();
        let repo = db.component_repository().unwrap();
        let c = component("sort", "sorted(xs)");

        let mut handles = Vec::new();
        for _ in 0..8 {
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
        assert_eq!(repo.find_by_id(&c.id).await.unwrap().unwrap().stats.usage_count, 7);
    }

    #[tokio::test]
    async fn test_apply_records_outcome() {
        let (_dir, db) = open();
        let repo = db.component_repository().unwrap();
        let c = component("sort", "sorted(xs)");
        repo.insert_or_touch(&c, Utc::now()).await.unwrap();

        let updated = repo
            .apply(&c.id, StatsMutation::RecordOutcome { succeeded: false, alpha: 0.1 })
            .await
            .unwrap()
            .unwrap();
        assert!((updated.stats.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(updated.stats.failure_count, 1);

        let missing = repo
            .apply(&ComponentId::for_source("nope"), StatsMutation::MarkUsed { at: Utc::now() })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_packages_keep_first_row() {
        let (_dir, db) = open();
        let repo = db.component_repository().unwrap();
        let package = PackageDependency::parse_spec("pypi/requests@>=2").unwrap();

        repo.upsert_packages(&[package.clone()]).await.unwrap();
        repo.upsert_packages(&[package.clone()]).await.unwrap();

        let found = repo
            .find_packages(&[package.id.clone(), PackageId("pypi/missing@*".to_string())])
            .await
            .unwrap();
        assert_eq!(found, vec![package]);
    }

    #[tokio::test]
    async fn test_workflow_transaction_rules() {
        let (_dir, db) = open();
        let repo = db.workflow_repository().unwrap();
        let a = component("a", "a()");
        let b = component("b", "b()");

        let ab = Workflow::compose("etl", "", &[a.clone(), b.clone()], Utc::now()).unwrap();
        let ba = Workflow::compose("etl", "", &[b, a], Utc::now()).unwrap();

        assert!(matches!(repo.insert_if_absent(&ab).await.unwrap(), WorkflowInsert::Inserted));
        assert!(matches!(repo.insert_if_absent(&ab).await.unwrap(), WorkflowInsert::Existing(_)));
        match repo.insert_if_absent(&ba).await.unwrap() {
            WorkflowInsert::NameTaken(owner) => assert_eq!(owner, ab.id),
            other => panic!("expected NameTaken, got {:?}", other),
        }

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.find_by_name("etl").await.unwrap().unwrap().component_ids, ab.component_ids);
    }

    #[tokio::test]
    async fn test_pending_success_counter_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let composition = WorkflowId::for_members(&[component("a", "a()").id]);

        {
            let db = SledDatabase::open(&path).unwrap();
            let repo = db.workflow_repository().unwrap();
            assert_eq!(repo.increment_pending_success(&composition).await.unwrap(), 1);
            db.flush().await.unwrap();
        }

        let db = SledDatabase::open(&path).unwrap();
        let repo = db.workflow_repository().unwrap();
        assert_eq!(repo.pending_count().await.unwrap(), 1);
        assert_eq!(repo.increment_pending_success(&composition).await.unwrap(), 2);
        repo.clear_pending(&composition).await.unwrap();
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }
}
