// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the registry.
//! Published on the [`EventBus`](crate::infrastructure::event_bus::EventBus) for
//! observability and integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::assembly::{AssemblyId, AssemblyStage};
use crate::domain::component::ComponentId;
use crate::domain::workflow::WorkflowId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentEvent {
    ComponentStored {
        component_id: ComponentId,
        name: String,
        language: String,
        stored_at: DateTime<Utc>,
    },
    /// `put` hit an existing content hash
    ComponentReused {
        component_id: ComponentId,
        usage_count: u64,
        reused_at: DateTime<Utc>,
    },
    ComponentOutcomeRecorded {
        component_id: ComponentId,
        succeeded: bool,
        old_rate: f64,
        new_rate: f64,
        recorded_at: DateTime<Utc>,
    },
}

impl ComponentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ComponentEvent::ComponentStored { .. } => "component_stored",
            ComponentEvent::ComponentReused { .. } => "component_reused",
            ComponentEvent::ComponentOutcomeRecorded { .. } => "component_outcome_recorded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowRegistered {
        workflow_id: WorkflowId,
        name: String,
        member_count: usize,
        registered_at: DateTime<Utc>,
    },
    WorkflowOutcomeRecorded {
        workflow_id: WorkflowId,
        succeeded: bool,
        new_rate: f64,
        recorded_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowRegistered { .. } => "workflow_registered",
            WorkflowEvent::WorkflowOutcomeRecorded { .. } => "workflow_outcome_recorded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssemblyEvent {
    RequestReceived {
        assembly_id: AssemblyId,
        description: String,
        received_at: DateTime<Utc>,
    },
    StageEntered {
        assembly_id: AssemblyId,
        stage: AssemblyStage,
        entered_at: DateTime<Utc>,
    },
    GenerationDelegated {
        assembly_id: AssemblyId,
        capability: String,
        delegated_at: DateTime<Utc>,
    },
    GenerationFailed {
        assembly_id: AssemblyId,
        capability: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    AssemblyCompleted {
        assembly_id: AssemblyId,
        workflow_id: Option<WorkflowId>,
        component_count: usize,
        generated_count: usize,
        completed_at: DateTime<Utc>,
    },
    AssemblyFailed {
        assembly_id: AssemblyId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    WorkflowPromoted {
        assembly_id: AssemblyId,
        workflow_id: WorkflowId,
        promoted_at: DateTime<Utc>,
    },
}

impl AssemblyEvent {
    pub fn assembly_id(&self) -> AssemblyId {
        match self {
            AssemblyEvent::RequestReceived { assembly_id, .. }
            | AssemblyEvent::StageEntered { assembly_id, .. }
            | AssemblyEvent::GenerationDelegated { assembly_id, .. }
            | AssemblyEvent::GenerationFailed { assembly_id, .. }
            | AssemblyEvent::AssemblyCompleted { assembly_id, .. }
            | AssemblyEvent::AssemblyFailed { assembly_id, .. }
            | AssemblyEvent::WorkflowPromoted { assembly_id, .. } => *assembly_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AssemblyEvent::RequestReceived { .. } => "request_received",
            AssemblyEvent::StageEntered { .. } => "stage_entered",
            AssemblyEvent::GenerationDelegated { .. } => "generation_delegated",
            AssemblyEvent::GenerationFailed { .. } => "generation_failed",
            AssemblyEvent::AssemblyCompleted { .. } => "assembly_completed",
            AssemblyEvent::AssemblyFailed { .. } => "assembly_failed",
            AssemblyEvent::WorkflowPromoted { .. } => "workflow_promoted",
        }
    }
}
