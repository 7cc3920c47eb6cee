// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Durability of the sled backend: components, shared permission/package rows,
//! workflows and their statistics survive closing and reopening the runtime,
//! and so do the success counts that lead to a workflow promotion.

use blockyard_core::application::RegistryRuntime;
use blockyard_core::domain::registry_config::{RegistryConfigManifest, StorageBackendKind};
use blockyard_core::{CapabilityQuery, ComponentDraft, ExecutionReport, PackageDependency, Permission, Request};
use std::path::Path;
use tempfile::TempDir;

fn sled_config(path: &Path) -> RegistryConfigManifest {
    let mut config = RegistryConfigManifest::default();
    config.spec.storage.backend = StorageBackendKind::Sled;
    config.spec.storage.path = Some(path.to_path_buf());
    config
}

#[tokio::test]
async fn test_registry_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    let (component_id, workflow_id) = {
        let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
        let draft = ComponentDraft::new("upload file", "s3.upload(path)", "python")
            .with_tags(["storage"])
            .with_permission(Permission::parse_spec("network-egress:s3.amazonaws.com").unwrap())
            .with_package(PackageDependency::parse_spec("pypi/boto3@>=1.28").unwrap());

        let component_id = runtime.components.put(draft).await.unwrap();
        runtime.components.record_outcome(&component_id, false).await.unwrap();
        let workflow_id = runtime
            .workflows
            .register_described("uploader", "upload files to s3", &[component_id.clone()])
            .await
            .unwrap();

        runtime.close().await.unwrap();
        (component_id, workflow_id)
    };

    let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();

    let component = runtime.components.get(&component_id).await.unwrap().unwrap();
    assert_eq!(component.source, "s3.upload(path)");
    assert!((component.stats.success_rate - 0.9).abs() < 1e-9);
    assert_eq!(component.stats.failure_count, 1);

    let permissions = runtime.components.permissions_of(&component).await.unwrap();
    assert_eq!(permissions[0].id.0, "network-egress:s3.amazonaws.com");
    let packages = runtime.components.packages_of(&component).await.unwrap();
    assert_eq!(packages[0].name, "boto3");

    let workflow = runtime.workflows.find_by_name("uploader").await.unwrap().unwrap();
    assert_eq!(workflow.id, workflow_id);
    assert_eq!(runtime.workflows.expand(&workflow_id).await.unwrap()[0].id, component_id);

    let hits = runtime.components.find(&CapabilityQuery::new("upload to storage")).await.unwrap();
    assert_eq!(hits.len(), 1);

    runtime.close().await.unwrap();
}

#[tokio::test]
async fn test_reopened_store_keeps_dedup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");
    let draft = ComponentDraft::new("greet", "print('hello')", "python");

    {
        let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
        runtime.components.put(draft.clone()).await.unwrap();
        runtime.close().await.unwrap();
    }

    let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
    let id = runtime.components.put(draft).await.unwrap();
    assert_eq!(runtime.components.count().await.unwrap(), 1);
    assert_eq!(runtime.components.get(&id).await.unwrap().unwrap().stats.usage_count, 1);
    runtime.close().await.unwrap();
}

#[tokio::test]
async fn test_promotion_counts_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    {
        let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
        runtime
            .components
            .put(ComponentDraft::new("sort list", "sorted(items)", "python").with_description("sort a list of items"))
            .await
            .unwrap();
        runtime.close().await.unwrap();
    }

    // One request per process, each reported as a success
    let mut promoted = None;
    for round in 0..3 {
        let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
        let assembly = runtime.coordinator.handle(Request::new("sort a list")).await.unwrap();
        let summary = runtime
            .coordinator
            .report_outcome(assembly.id, ExecutionReport::success())
            .await
            .unwrap();

        let status = runtime.coordinator.status().await.unwrap();
        match round {
            0 => {
                assert!(summary.promoted.is_none());
                assert_eq!(status.pending_promotions, 1);
                assert_eq!(status.workflows, 0);
            }
            1 => {
                promoted = summary.promoted;
                assert!(promoted.is_some());
                assert_eq!(status.pending_promotions, 0);
            }
            _ => {
                assert_eq!(assembly.workflow_id, promoted);
                assert_eq!(summary.workflow_updated, promoted);
            }
        }
        runtime.close().await.unwrap();
    }

    let runtime = RegistryRuntime::open(sled_config(&path)).unwrap();
    let status = runtime.coordinator.status().await.unwrap();
    assert_eq!(status.workflows, 1);
    assert_eq!(status.pending_promotions, 0);
    runtime.close().await.unwrap();
}
