// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Requests and the assemblies the coordinator builds for them.
//!
//! Every request moves through
//! `Received → SearchingWorkflow → (Assembling | SearchingComponents → GapAnalysis
//! → [Delegating] → Assembling) → Completed`, or ends in `Failed`. The stages an
//! assembly passed through are kept in [`Assembly::stages`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::capability::{Capability, CapabilityQuery};
use crate::domain::component::{Component, ComponentId, PackageDependency, Permission};
use crate::domain::workflow::WorkflowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyId(pub Uuid);

impl AssemblyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssemblyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request for functionality. Ephemeral: only the resulting assembly is
/// kept, and only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Ordered features; each one becomes a capability
    #[serde(default)]
    pub features: Vec<String>,
}

impl Request {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            language: None,
            features: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("request description cannot be empty".to_string());
        }
        Ok(())
    }

    /// Capabilities in declared order: one per non-blank feature, or the
    /// description alone when there are none.
    pub fn capabilities(&self) -> Vec<Capability> {
        let language = self.language.as_deref();
        let features: Vec<Capability> = self
            .features
            .iter()
            .filter(|feature| !feature.trim().is_empty())
            .map(|feature| Capability::new(feature.as_str(), language))
            .collect();

        if features.is_empty() {
            vec![Capability::new(self.description.as_str(), language)]
        } else {
            features
        }
    }

    /// Query covering the whole request, used to look up workflows.
    pub fn signature(&self) -> CapabilityQuery {
        let mut text = self.description.clone();
        for feature in &self.features {
            text.push(' ');
            text.push_str(feature);
        }
        CapabilityQuery::new(text).with_language(self.language.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStage {
    Received,
    SearchingWorkflow,
    SearchingComponents,
    GapAnalysis,
    Delegating,
    Assembling,
    Completed,
    Failed,
}

impl AssemblyStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyStage::Completed | AssemblyStage::Failed)
    }
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssemblyStage::Received => "received",
            AssemblyStage::SearchingWorkflow => "searching_workflow",
            AssemblyStage::SearchingComponents => "searching_components",
            AssemblyStage::GapAnalysis => "gap_analysis",
            AssemblyStage::Delegating => "delegating",
            AssemblyStage::Assembling => "assembling",
            AssemblyStage::Completed => "completed",
            AssemblyStage::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: AssemblyId,
    pub request: Request,
    pub stages: Vec<AssemblyStage>,
    /// Set when the assembly came from a registered workflow
    pub workflow_id: Option<WorkflowId>,
    pub components: Vec<Component>,
    pub permissions: Vec<Permission>,
    pub packages: Vec<PackageDependency>,
    /// Members found in the store
    pub reused: Vec<ComponentId>,
    /// Members created by the generator for this request
    pub generated: Vec<ComponentId>,
    pub error: Option<String>,
    /// End-to-end execution result, once reported
    pub outcome: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Assembly {
    pub fn new(request: Request) -> Self {
        Self {
            id: AssemblyId::new(),
            request,
            stages: vec![AssemblyStage::Received],
            workflow_id: None,
            components: Vec::new(),
            permissions: Vec::new(),
            packages: Vec::new(),
            reused: Vec::new(),
            generated: Vec::new(),
            error: None,
            outcome: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn stage(&self) -> AssemblyStage {
        self.stages.last().copied().unwrap_or(AssemblyStage::Received)
    }

    pub fn advance(&mut self, stage: AssemblyStage) {
        self.stages.push(stage);
        if stage.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn passed_through(&self, stage: AssemblyStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components.iter().map(|c| c.id.clone()).collect()
    }
}

/// Result of running an assembly end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub succeeded: bool,
    /// Members known to have failed. When empty, every member is credited
    /// with the overall result.
    #[serde(default)]
    pub failed_components: Vec<ComponentId>,
}

impl ExecutionReport {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            failed_components: Vec::new(),
        }
    }

    pub fn failure(failed_components: Vec<ComponentId>) -> Self {
        Self {
            succeeded: false,
            failed_components,
        }
    }

    pub fn outcome_for(&self, id: &ComponentId) -> bool {
        if self.failed_components.is_empty() {
            self.succeeded
        } else {
            !self.failed_components.contains(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_description_is_invalid() {
        assert!(Request::new("   ").validate().is_err());
        assert!(Request::new("sort a list").validate().is_ok());
    }

    #[test]
    fn test_capabilities_follow_feature_order() {
        let request = Request::new("todo app")
            .with_language("Python")
            .with_features(["persist todos", " ", "list todos"]);
        let capabilities = request.capabilities();

        assert_eq!(capabilities.len(), 2);
        assert_eq!(capabilities[0].name, "persist todos");
        assert_eq!(capabilities[1].name, "list todos");
        assert_eq!(capabilities[0].language.as_deref(), Some("python"));
    }

    #[test]
    fn test_description_is_the_capability_without_features() {
        let capabilities = Request::new("sort a list").capabilities();
        assert_eq!(capabilities, vec![Capability::new("sort a list", None)]);
    }

    #[test]
    fn test_signature_includes_features() {
        let signature = Request::new("todo app").with_features(["persist"]).signature();
        assert!(signature.keywords().contains("persist"));
        assert!(signature.keywords().contains("todo"));
    }

    #[test]
    fn test_report_attribution() {
        let good = ComponentId::for_source("good");
        let bad = ComponentId::for_source("bad");

        let report = ExecutionReport::failure(vec![bad.clone()]);
        assert!(report.outcome_for(&good));
        assert!(!report.outcome_for(&bad));

        let blanket = ExecutionReport::failure(Vec::new());
        assert!(!blanket.outcome_for(&good));
        assert!(ExecutionReport::success().outcome_for(&bad));
    }

    #[test]
    fn test_terminal_stage_sets_completion_time() {
        let mut assembly = Assembly::new(Request::new("x"));
        assert_eq!(assembly.stage(), AssemblyStage::Received);
        assembly.advance(AssemblyStage::SearchingWorkflow);
        assert!(assembly.completed_at.is_none());
        assembly.advance(AssemblyStage::Completed);
        assert!(assembly.completed_at.is_some());
        assert!(assembly.passed_through(AssemblyStage::SearchingWorkflow));
    }
}
