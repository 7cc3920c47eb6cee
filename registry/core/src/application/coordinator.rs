// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Retrieval/Assembly Coordinator
//!
//! Turns a [`Request`] into an ordered [`Assembly`] of components, reusing as
//! much stored code as it can:
//!
//! 1. **SearchingWorkflow**: resolve a registered workflow by the request's
//!    full keyword signature. A confident hit is expanded and assembled as is.
//! 2. **SearchingComponents**: otherwise search the component store once per
//!    capability.
//! 3. **GapAnalysis**: capabilities whose best match falls below the
//!    confidence threshold are gaps.
//! 4. **Delegating**: each gap is handed to the [`ComponentGenerator`] under a
//!    timeout and the result is stored. The first failure fails the request.
//! 5. **Assembling**: members in capability order, marked used, with the
//!    union of their permission and package rows.
//!
//! Execution outcomes arrive later through [`Coordinator::report_outcome`],
//! which updates component and workflow statistics and promotes a composition
//! to a workflow once it has succeeded `promote_after_successes` times. Success
//! counts are kept by the workflow repository, so they accumulate across
//! processes on a durable backend.
//!
//! Assemblies are held in memory only until their outcome is reported. At most
//! `max_retained_assemblies` finished ones are kept; the oldest go first.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::application::collaborators::{ComponentGenerator, ExecutionValidator, GenerationError};
use crate::application::component_store::{ComponentMatch, ComponentStore, ComponentStoreError};
use crate::application::workflow_registry::{WorkflowRegistry, WorkflowRegistryError};
use crate::domain::assembly::{Assembly, AssemblyId, AssemblyStage, ExecutionReport, Request};
use crate::domain::capability::{slugify, Capability};
use crate::domain::component::{Component, ComponentId};
use crate::domain::events::AssemblyEvent;
use crate::domain::registry_config::RegistryConfigManifest;
use crate::domain::workflow::WorkflowId;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Minimum relevance for a stored workflow or component to be reused
    pub confidence_threshold: f64,
    /// Candidates considered per capability
    pub search_limit: usize,
    /// Default bound for a single generator call
    pub generation_timeout: Duration,
    /// Successful runs before a composition is registered as a workflow
    pub promote_after_successes: u32,
    /// Finished assemblies kept for lookup and outcome reports
    pub max_retained_assemblies: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            search_limit: 10,
            generation_timeout: Duration::from_secs(30),
            promote_after_successes: 2,
            max_retained_assemblies: 1000,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &RegistryConfigManifest) -> Self {
        Self {
            confidence_threshold: config.spec.scoring.confidence_threshold,
            search_limit: config.spec.scoring.search_limit,
            generation_timeout: config.spec.coordinator.generation_timeout,
            promote_after_successes: config.spec.coordinator.promote_after_successes,
            max_retained_assemblies: config.spec.coordinator.max_retained_assemblies,
        }
    }
}

/// What [`Coordinator::report_outcome`] did with a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub assembly_id: AssemblyId,
    pub succeeded: bool,
    pub components_updated: usize,
    pub workflow_updated: Option<WorkflowId>,
    /// Set when this report promoted the composition to a workflow
    pub promoted: Option<WorkflowId>,
}

/// Registry-wide counters, the CLI's `status` view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub components: usize,
    pub workflows: usize,
    pub assemblies_in_progress: usize,
    /// Since this coordinator started
    pub assemblies_completed: usize,
    pub assemblies_failed: usize,
    /// Finished assemblies still held in memory
    pub assemblies_retained: usize,
    /// Compositions that succeeded but are not workflows yet
    pub pending_promotions: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Generation failed for capability '{capability}': {source}")]
    GenerationFailed {
        capability: String,
        #[source]
        source: GenerationError,
    },

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Unknown assembly: {0}")]
    UnknownAssembly(AssemblyId),

    #[error("Assembly {0} has not completed")]
    AssemblyNotCompleted(AssemblyId),

    #[error("Outcome for assembly {0} was already reported")]
    OutcomeAlreadyReported(AssemblyId),

    #[error("No execution validator configured")]
    ValidatorUnavailable,

    #[error("Execution validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    ComponentStore(#[from] ComponentStoreError),

    #[error(transparent)]
    WorkflowRegistry(WorkflowRegistryError),
}

impl From<WorkflowRegistryError> for CoordinatorError {
    fn from(err: WorkflowRegistryError) -> Self {
        match err {
            WorkflowRegistryError::Integrity { .. } => CoordinatorError::Integrity(err.to_string()),
            WorkflowRegistryError::ComponentStore(inner) => CoordinatorError::ComponentStore(inner),
            other => CoordinatorError::WorkflowRegistry(other),
        }
    }
}

pub struct Coordinator {
    components: Arc<ComponentStore>,
    workflows: Arc<WorkflowRegistry>,
    generator: Arc<dyn ComponentGenerator>,
    validator: Option<Arc<dyn ExecutionValidator>>,
    event_bus: Arc<EventBus>,
    settings: CoordinatorSettings,
    assemblies: DashMap<AssemblyId, Assembly>,
    completed_total: AtomicUsize,
    failed_total: AtomicUsize,
}

impl Coordinator {
    pub fn new(
        components: Arc<ComponentStore>,
        workflows: Arc<WorkflowRegistry>,
        generator: Arc<dyn ComponentGenerator>,
        event_bus: Arc<EventBus>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            components,
            workflows,
            generator,
            validator: None,
            event_bus,
            settings,
            assemblies: DashMap::new(),
            completed_total: AtomicUsize::new(0),
            failed_total: AtomicUsize::new(0),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn ExecutionValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Handle a request with the configured generation timeout.
    pub async fn handle(&self, request: Request) -> Result<Assembly, CoordinatorError> {
        let timeout = self.settings.generation_timeout;
        self.handle_with_timeout(request, timeout).await
    }

    pub async fn handle_with_timeout(
        &self,
        request: Request,
        generation_timeout: Duration,
    ) -> Result<Assembly, CoordinatorError> {
        request.validate().map_err(CoordinatorError::InvalidRequest)?;

        let mut assembly = Assembly::new(request);
        info!(assembly_id = %assembly.id, description = %assembly.request.description, "Request received");
        self.assemblies.insert(assembly.id, assembly.clone());
        self.event_bus.publish_assembly_event(AssemblyEvent::RequestReceived {
            assembly_id: assembly.id,
            description: assembly.request.description.clone(),
            received_at: assembly.started_at,
        });

        match self.run(&mut assembly, generation_timeout).await {
            Ok(()) => {
                self.enter(&mut assembly, AssemblyStage::Completed);
                info!(
                    assembly_id = %assembly.id,
                    components = assembly.components.len(),
                    reused = assembly.reused.len(),
                    generated = assembly.generated.len(),
                    "Assembly completed"
                );
                self.event_bus.publish_assembly_event(AssemblyEvent::AssemblyCompleted {
                    assembly_id: assembly.id,
                    workflow_id: assembly.workflow_id.clone(),
                    component_count: assembly.components.len(),
                    generated_count: assembly.generated.len(),
                    completed_at: Utc::now(),
                });
                self.completed_total.fetch_add(1, Ordering::Relaxed);
                self.prune_finished();
                Ok(assembly)
            }
            Err(e) => {
                assembly.error = Some(e.to_string());
                self.enter(&mut assembly, AssemblyStage::Failed);
                match &e {
                    CoordinatorError::Integrity(_) => error!(assembly_id = %assembly.id, "Assembly failed: {}", e),
                    _ => warn!(assembly_id = %assembly.id, "Assembly failed: {}", e),
                }
                self.event_bus.publish_assembly_event(AssemblyEvent::AssemblyFailed {
                    assembly_id: assembly.id,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                self.prune_finished();
                Err(e)
            }
        }
    }

    fn enter(&self, assembly: &mut Assembly, stage: AssemblyStage) {
        assembly.advance(stage);
        debug!(assembly_id = %assembly.id, %stage, "Entered stage");
        self.assemblies.insert(assembly.id, assembly.clone());
        self.event_bus.publish_assembly_event(AssemblyEvent::StageEntered {
            assembly_id: assembly.id,
            stage,
            entered_at: Utc::now(),
        });
    }

    /// Drop the oldest finished assemblies beyond the retention cap. Running
    /// assemblies and those with a report in flight are never dropped.
    fn prune_finished(&self) {
        let limit = self.settings.max_retained_assemblies;
        let mut finished: Vec<(DateTime<Utc>, AssemblyId)> = self
            .assemblies
            .iter()
            .filter(|entry| entry.stage().is_terminal() && entry.outcome.is_none())
            .map(|entry| (entry.completed_at.unwrap_or(entry.started_at), *entry.key()))
            .collect();
        if finished.len() <= limit {
            return;
        }

        finished.sort_by_key(|(finished_at, _)| *finished_at);
        let excess = finished.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            self.assemblies.remove(&id);
        }
        debug!(evicted = excess, "Dropped finished assemblies over the retention cap");
    }

    async fn run(&self, assembly: &mut Assembly, generation_timeout: Duration) -> Result<(), CoordinatorError> {
        self.enter(assembly, AssemblyStage::SearchingWorkflow);

        let signature = assembly
            .request
            .signature()
            .with_min_relevance(self.settings.confidence_threshold);

        let wanted = signature.keywords();
        let capability_count = assembly.request.capabilities().len();
        for hit in self.workflows.candidates(&signature).await? {
            let members = self.workflows.expand_workflow(&hit.workflow).await?;
            if !hit.by_name && !fits_request(&wanted, capability_count, &members) {
                debug!(
                    assembly_id = %assembly.id,
                    workflow_id = %hit.workflow.id.short(),
                    members = members.len(),
                    "Skipping workflow with members the request did not ask for"
                );
                continue;
            }

            let by = if hit.by_name { "name" } else { "capability" };
            metrics::counter!("blockyard_workflow_hits_total", "by" => by).increment(1);
            info!(
                assembly_id = %assembly.id,
                workflow_id = %hit.workflow.id.short(),
                relevance = hit.relevance,
                "Reusing registered workflow"
            );
            self.workflows.mark_used(&hit.workflow.id).await?;
            assembly.workflow_id = Some(hit.workflow.id.clone());
            assembly.reused = hit.workflow.component_ids.clone();

            self.enter(assembly, AssemblyStage::Assembling);
            return self.assemble(assembly, members).await;
        }

        self.enter(assembly, AssemblyStage::SearchingComponents);
        let capabilities = assembly.request.capabilities();
        let mut best: Vec<Option<ComponentMatch>> = Vec::with_capacity(capabilities.len());
        for capability in &capabilities {
            let query = capability.to_query().with_limit(self.settings.search_limit);
            let hit = self.components.find(&query).await?.into_iter().next();
            best.push(hit);
        }

        self.enter(assembly, AssemblyStage::GapAnalysis);
        let gaps: Vec<usize> = best
            .iter()
            .enumerate()
            .filter(|(_, hit)| match hit {
                Some(hit) => hit.relevance < self.settings.confidence_threshold,
                None => true,
            })
            .map(|(index, _)| index)
            .collect();
        debug!(
            assembly_id = %assembly.id,
            capabilities = capabilities.len(),
            gaps = gaps.len(),
            "Gap analysis done"
        );

        let mut chosen: Vec<Option<Component>> = best
            .into_iter()
            .map(|hit| hit.filter(|h| h.relevance >= self.settings.confidence_threshold).map(|h| h.component))
            .collect();

        for component in chosen.iter().flatten() {
            assembly.reused.push(component.id.clone());
        }

        if !gaps.is_empty() {
            self.enter(assembly, AssemblyStage::Delegating);
            for index in gaps {
                let capability = &capabilities[index];
                let (component, created) = self.delegate(assembly.id, capability, generation_timeout).await?;
                if created {
                    assembly.generated.push(component.id.clone());
                } else {
                    assembly.reused.push(component.id.clone());
                }
                chosen[index] = Some(component);
            }
        }

        self.enter(assembly, AssemblyStage::Assembling);
        let members: Vec<Component> = chosen.into_iter().flatten().collect();
        self.assemble(assembly, members).await
    }

    /// Ask the generator for one capability and store the result.
    async fn delegate(
        &self,
        assembly_id: AssemblyId,
        capability: &Capability,
        generation_timeout: Duration,
    ) -> Result<(Component, bool), CoordinatorError> {
        self.event_bus.publish_assembly_event(AssemblyEvent::GenerationDelegated {
            assembly_id,
            capability: capability.name.clone(),
            delegated_at: Utc::now(),
        });
        metrics::counter!("blockyard_generations_total").increment(1);

        let generated = match tokio::time::timeout(generation_timeout, self.generator.generate(capability)).await {
            Ok(Ok(generated)) => generated,
            Ok(Err(e)) => return Err(self.generation_failed(assembly_id, capability, e)),
            Err(_) => {
                return Err(self.generation_failed(
                    assembly_id,
                    capability,
                    GenerationError::TimedOut(generation_timeout),
                ))
            }
        };

        let stored = self.components.put_with_outcome(generated.into_draft(capability)).await?;
        let component = self.components.get(&stored.id).await?.ok_or_else(|| {
            CoordinatorError::Integrity(format!("component {} vanished right after being stored", stored.id))
        })?;

        info!(
            assembly_id = %assembly_id,
            capability = %capability.name,
            component_id = %component.id.short(),
            created = stored.created,
            "Generated component for capability"
        );
        Ok((component, stored.created))
    }

    fn generation_failed(&self, assembly_id: AssemblyId, capability: &Capability, source: GenerationError) -> CoordinatorError {
        warn!(assembly_id = %assembly_id, capability = %capability.name, "Generation failed: {}", source);
        metrics::counter!("blockyard_generation_failures_total").increment(1);
        self.event_bus.publish_assembly_event(AssemblyEvent::GenerationFailed {
            assembly_id,
            capability: capability.name.clone(),
            reason: source.to_string(),
            failed_at: Utc::now(),
        });
        CoordinatorError::GenerationFailed {
            capability: capability.name.clone(),
            source,
        }
    }

    async fn assemble(&self, assembly: &mut Assembly, members: Vec<Component>) -> Result<(), CoordinatorError> {
        // A component serving several capabilities appears once, at its first position
        let mut seen = BTreeSet::new();
        let members: Vec<Component> = members
            .into_iter()
            .filter(|component| seen.insert(component.id.clone()))
            .collect();

        let ids: Vec<ComponentId> = members.iter().map(|c| c.id.clone()).collect();
        self.components.mark_used(&ids).await?;

        let (permissions, packages) = self.components.requirements_of(&members).await?;
        assembly.components = members;
        assembly.permissions = permissions;
        assembly.packages = packages;
        Ok(())
    }

    /// Feed an execution report back into component and workflow statistics.
    /// A reported assembly is dropped from memory; a report whose updates fail
    /// leaves the assembly in place so it can be resubmitted.
    pub async fn report_outcome(
        &self,
        assembly_id: AssemblyId,
        report: ExecutionReport,
    ) -> Result<OutcomeSummary, CoordinatorError> {
        // Claiming the outcome first turns a concurrent second report away
        let assembly = {
            let mut entry = self
                .assemblies
                .get_mut(&assembly_id)
                .ok_or(CoordinatorError::UnknownAssembly(assembly_id))?;
            if entry.stage() != AssemblyStage::Completed {
                return Err(CoordinatorError::AssemblyNotCompleted(assembly_id));
            }
            if entry.outcome.is_some() {
                return Err(CoordinatorError::OutcomeAlreadyReported(assembly_id));
            }
            entry.outcome = Some(report.succeeded);
            entry.value().clone()
        };

        match self.apply_report(&assembly, &report).await {
            Ok(summary) => {
                self.assemblies.remove(&assembly_id);
                Ok(summary)
            }
            Err(e) => {
                warn!(assembly_id = %assembly_id, "Outcome report failed, assembly kept for retry: {}", e);
                if let Some(mut entry) = self.assemblies.get_mut(&assembly_id) {
                    entry.outcome = None;
                }
                Err(e)
            }
        }
    }

    async fn apply_report(&self, assembly: &Assembly, report: &ExecutionReport) -> Result<OutcomeSummary, CoordinatorError> {
        let ids = assembly.component_ids();
        for id in &ids {
            self.components.record_outcome(id, report.outcome_for(id)).await?;
        }

        let mut summary = OutcomeSummary {
            assembly_id: assembly.id,
            succeeded: report.succeeded,
            components_updated: ids.len(),
            workflow_updated: None,
            promoted: None,
        };

        if let Some(workflow_id) = &assembly.workflow_id {
            self.workflows.record_outcome(workflow_id, report.succeeded).await?;
            summary.workflow_updated = Some(workflow_id.clone());
            return Ok(summary);
        }

        if ids.is_empty() {
            return Ok(summary);
        }

        let composition = WorkflowId::for_members(&ids);
        if self.workflows.get(&composition).await?.is_some() {
            // Already registered, just not found by this request's keywords
            self.workflows.record_outcome(&composition, report.succeeded).await?;
            summary.workflow_updated = Some(composition);
            return Ok(summary);
        }

        if report.succeeded {
            let successes = self.workflows.count_pending_success(&composition).await?;
            debug!(
                composition = %composition.short(),
                successes,
                needed = self.settings.promote_after_successes,
                "Counted successful composition"
            );

            if successes >= self.settings.promote_after_successes {
                let workflow_id = self.promote(assembly, &ids).await?;
                self.workflows.clear_pending(&composition).await?;
                self.event_bus.publish_assembly_event(AssemblyEvent::WorkflowPromoted {
                    assembly_id: assembly.id,
                    workflow_id: workflow_id.clone(),
                    promoted_at: Utc::now(),
                });
                summary.promoted = Some(workflow_id);
            }
        }

        Ok(summary)
    }

    /// Register a composition as a workflow named after the request. A name
    /// owned by another composition gets the new workflow's short id appended.
    async fn promote(&self, assembly: &Assembly, ids: &[ComponentId]) -> Result<WorkflowId, CoordinatorError> {
        let request = &assembly.request;
        let mut name = slugify(&request.description);
        if name.is_empty() {
            name = "workflow".to_string();
        }

        let workflow_id = match self.workflows.register_described(&name, &request.description, ids).await {
            Ok(id) => id,
            Err(WorkflowRegistryError::NameTaken { .. }) => {
                let composition = WorkflowId::for_members(ids);
                let suffixed = format!("{}-{}", name, &composition.as_str()[..8]);
                self.workflows
                    .register_described(&suffixed, &request.description, ids)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            assembly_id = %assembly.id,
            workflow_id = %workflow_id.short(),
            members = ids.len(),
            "Promoted composition to workflow"
        );
        metrics::counter!("blockyard_workflow_promotions_total").increment(1);
        Ok(workflow_id)
    }

    /// Run the configured validator on a completed assembly and report its
    /// result.
    pub async fn validate_assembly(&self, assembly_id: AssemblyId) -> Result<OutcomeSummary, CoordinatorError> {
        let validator = self.validator.as_ref().ok_or(CoordinatorError::ValidatorUnavailable)?;
        let assembly = self
            .assembly(assembly_id)
            .ok_or(CoordinatorError::UnknownAssembly(assembly_id))?;

        let report = validator
            .validate(&assembly)
            .await
            .map_err(|e| CoordinatorError::Validation(format!("{:#}", e)))?;
        self.report_outcome(assembly_id, report).await
    }

    pub fn assembly(&self, assembly_id: AssemblyId) -> Option<Assembly> {
        self.assemblies.get(&assembly_id).map(|entry| entry.value().clone())
    }

    pub async fn status(&self) -> Result<SystemStatus, CoordinatorError> {
        let mut status = SystemStatus {
            components: self.components.count().await?,
            workflows: self.workflows.count().await?,
            assemblies_in_progress: 0,
            assemblies_completed: self.completed_total.load(Ordering::Relaxed),
            assemblies_failed: self.failed_total.load(Ordering::Relaxed),
            assemblies_retained: 0,
            pending_promotions: self.workflows.pending_promotions().await?,
        };
        for entry in self.assemblies.iter() {
            if entry.value().stage().is_terminal() {
                status.assemblies_retained += 1;
            } else {
                status.assemblies_in_progress += 1;
            }
        }
        Ok(status)
    }
}

/// A workflow found by keywords is only reused when it has no more members
/// than the request has capabilities and every member matches something the
/// request asked for.
fn fits_request(wanted: &BTreeSet<String>, capability_count: usize, members: &[Component]) -> bool {
    members.len() <= capability_count && members.iter().all(|member| !member.keywords().is_disjoint(wanted))
}
