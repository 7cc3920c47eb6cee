// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Registry
//!
//! Registers ordered component compositions under unique names and resolves
//! them back, either by exact name or by capability match against the
//! workflow's name, description and aggregate tags.
//!
//! Registration checks every member against the component store first, so a
//! failed `register` leaves the registry untouched. Expanding a workflow whose
//! member has disappeared is an integrity violation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::application::component_store::{ComponentStore, ComponentStoreError};
use crate::domain::capability::CapabilityQuery;
use crate::domain::component::{Component, ComponentId};
use crate::domain::events::WorkflowEvent;
use crate::domain::repository::{RepositoryError, WorkflowInsert, WorkflowRepository};
use crate::domain::stats::StatsMutation;
use crate::domain::workflow::{Workflow, WorkflowError, WorkflowId};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowMatch {
    pub workflow: Workflow,
    /// 1.0 for an exact name hit
    pub relevance: f64,
    pub by_name: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowRegistryError {
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),

    #[error("Workflow references unknown component {0}")]
    InvalidReference(ComponentId),

    #[error("Workflow name '{name}' is already used by {existing}")]
    NameTaken { name: String, existing: WorkflowId },

    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("Workflow {workflow_id} references missing component {missing}")]
    Integrity { workflow_id: WorkflowId, missing: ComponentId },

    #[error(transparent)]
    ComponentStore(#[from] ComponentStoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct WorkflowRegistry {
    repository: Arc<dyn WorkflowRepository>,
    components: Arc<ComponentStore>,
    event_bus: Arc<EventBus>,
}

impl WorkflowRegistry {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        components: Arc<ComponentStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            components,
            event_bus,
        }
    }

    pub async fn register(&self, name: &str, component_ids: &[ComponentId]) -> Result<WorkflowId, WorkflowRegistryError> {
        self.register_described(name, "", component_ids).await
    }

    /// Register an ordered composition. Registering the same member sequence
    /// again returns the existing id, whatever name it is given.
    pub async fn register_described(
        &self,
        name: &str,
        description: &str,
        component_ids: &[ComponentId],
    ) -> Result<WorkflowId, WorkflowRegistryError> {
        if name.trim().is_empty() {
            return Err(WorkflowError::EmptyName.into());
        }
        if component_ids.is_empty() {
            return Err(WorkflowError::NoMembers.into());
        }

        let found = self.components.get_many(component_ids).await?;
        let mut members: Vec<Component> = Vec::with_capacity(found.len());
        for (id, component) in component_ids.iter().zip(found) {
            match component {
                Some(component) => members.push(component),
                None => return Err(WorkflowRegistryError::InvalidReference(id.clone())),
            }
        }

        let workflow = Workflow::compose(name, description, &members, Utc::now())?;

        match self.repository.insert_if_absent(&workflow).await? {
            WorkflowInsert::Inserted => {
                info!(
                    workflow_id = %workflow.id.short(),
                    name = %workflow.name,
                    members = workflow.component_ids.len(),
                    "Registered workflow"
                );
                self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowRegistered {
                    workflow_id: workflow.id.clone(),
                    name: workflow.name.clone(),
                    member_count: workflow.component_ids.len(),
                    registered_at: workflow.created_at,
                });
                Ok(workflow.id)
            }
            WorkflowInsert::Existing(existing) => {
                debug!(workflow_id = %existing.id.short(), "Member sequence already registered");
                Ok(existing.id)
            }
            WorkflowInsert::NameTaken(existing) => Err(WorkflowRegistryError::NameTaken {
                name: workflow.name,
                existing,
            }),
        }
    }

    pub async fn get(&self, id: &WorkflowId) -> Result<Option<Workflow>, WorkflowRegistryError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, WorkflowRegistryError> {
        Ok(self.repository.find_by_name(name.trim()).await?)
    }

    /// Exact name lookup on the query text first, then the best capability
    /// match. Language-incompatible workflows are skipped on both paths.
    pub async fn resolve(&self, query: &CapabilityQuery) -> Result<Option<WorkflowMatch>, WorkflowRegistryError> {
        let best = self.candidates(query).await?.into_iter().next();
        if let Some(hit) = &best {
            debug!(
                workflow_id = %hit.workflow.id.short(),
                relevance = hit.relevance,
                by_name = hit.by_name,
                "Resolved workflow"
            );
            let by = if hit.by_name { "name" } else { "capability" };
            metrics::counter!("blockyard_workflow_hits_total", "by" => by).increment(1);
        }
        Ok(best)
    }

    /// Every workflow matching the query, best first: the exact name hit,
    /// then capability matches by relevance and then by success rate, usage
    /// and recency.
    pub async fn candidates(&self, query: &CapabilityQuery) -> Result<Vec<WorkflowMatch>, WorkflowRegistryError> {
        let compatible = |workflow: &Workflow| match &query.language {
            Some(language) => workflow.speaks(language),
            None => true,
        };

        let named = self
            .find_by_name(&query.text)
            .await?
            .filter(|workflow| compatible(workflow));

        let mut matches: Vec<WorkflowMatch> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|workflow| compatible(workflow))
            .filter(|workflow| named.as_ref().map_or(true, |n| n.id != workflow.id))
            .filter_map(|workflow| {
                query.score(&workflow.keywords()).map(|relevance| WorkflowMatch {
                    workflow,
                    relevance,
                    by_name: false,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.workflow.stats.rank_cmp(&b.workflow.stats))
                .then_with(|| a.workflow.id.cmp(&b.workflow.id))
        });

        if let Some(workflow) = named {
            matches.insert(
                0,
                WorkflowMatch {
                    workflow,
                    relevance: 1.0,
                    by_name: true,
                },
            );
        }
        Ok(matches)
    }

    /// Members of the workflow, in order, fetched in one batch.
    pub async fn expand(&self, id: &WorkflowId) -> Result<Vec<Component>, WorkflowRegistryError> {
        let workflow = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowRegistryError::NotFound(id.clone()))?;
        self.expand_workflow(&workflow).await
    }

    pub async fn expand_workflow(&self, workflow: &Workflow) -> Result<Vec<Component>, WorkflowRegistryError> {
        let found = self.components.get_many(&workflow.component_ids).await?;

        let mut members = Vec::with_capacity(found.len());
        for (id, component) in workflow.component_ids.iter().zip(found) {
            match component {
                Some(component) => members.push(component),
                None => {
                    error!(
                        workflow_id = %workflow.id,
                        missing = %id,
                        "Workflow references a component that is no longer stored"
                    );
                    return Err(WorkflowRegistryError::Integrity {
                        workflow_id: workflow.id.clone(),
                        missing: id.clone(),
                    });
                }
            }
        }
        Ok(members)
    }

    pub async fn record_outcome(&self, id: &WorkflowId, succeeded: bool) -> Result<Workflow, WorkflowRegistryError> {
        let updated = self
            .repository
            .apply(
                id,
                StatsMutation::RecordOutcome {
                    succeeded,
                    alpha: self.components.success_alpha(),
                },
            )
            .await?
            .ok_or_else(|| WorkflowRegistryError::NotFound(id.clone()))?;

        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowOutcomeRecorded {
            workflow_id: id.clone(),
            succeeded,
            new_rate: updated.stats.success_rate,
            recorded_at: Utc::now(),
        });
        Ok(updated)
    }

    pub async fn mark_used(&self, id: &WorkflowId) -> Result<Workflow, WorkflowRegistryError> {
        self.repository
            .apply(id, StatsMutation::MarkUsed { at: Utc::now() })
            .await?
            .ok_or_else(|| WorkflowRegistryError::NotFound(id.clone()))
    }

    /// All workflows, best ranked first.
    pub async fn list(&self) -> Result<Vec<Workflow>, WorkflowRegistryError> {
        let mut workflows = self.repository.list_all().await?;
        workflows.sort_by(|a, b| a.stats.rank_cmp(&b.stats).then_with(|| a.name.cmp(&b.name)));
        Ok(workflows)
    }

    pub async fn count(&self) -> Result<usize, WorkflowRegistryError> {
        Ok(self.repository.count().await?)
    }

    /// Count a successful run of an unregistered composition; returns the
    /// total so far. Counters are stored with the workflows, so they carry
    /// over between processes on durable backends.
    pub async fn count_pending_success(&self, composition: &WorkflowId) -> Result<u32, WorkflowRegistryError> {
        Ok(self.repository.increment_pending_success(composition).await?)
    }

    pub async fn clear_pending(&self, composition: &WorkflowId) -> Result<(), WorkflowRegistryError> {
        Ok(self.repository.clear_pending(composition).await?)
    }

    pub async fn pending_promotions(&self) -> Result<usize, WorkflowRegistryError> {
        Ok(self.repository.pending_count().await?)
    }

    pub async fn flush(&self) -> Result<(), WorkflowRegistryError> {
        Ok(self.repository.flush().await?)
    }
}
