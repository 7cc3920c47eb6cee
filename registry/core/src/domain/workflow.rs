// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Domain Model
//!
//! A workflow is a named, ordered composition of components known to work
//! together. Member order is execution order.
//!
//! # Invariants
//! - At least one member
//! - Every member id referenced at registration exists in the component store
//! - Identity is the ordered member sequence: [`WorkflowId`] is the hex
//!   SHA-256 of the member ids joined by newlines, so two registrations of the
//!   same sequence are the same workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::capability::keywords;
use crate::domain::component::{Component, ComponentId, PermissionId};
use crate::domain::stats::UsageStats;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn for_members(members: &[ComponentId]) -> Self {
        let mut hasher = Sha256::new();
        for (index, member) in members.iter().enumerate() {
            if index > 0 {
                hasher.update(b"\n");
            }
            hasher.update(member.as_str().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn parse(value: &str) -> Result<Self, WorkflowError> {
        let value = value.trim().to_lowercase();
        if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WorkflowError::InvalidId(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow Aggregate Root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub component_ids: Vec<ComponentId>,
    /// Union of the members' permissions
    pub permissions: BTreeSet<PermissionId>,
    /// Union of the members' tags
    pub tags: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub stats: UsageStats,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Build a workflow over already resolved members, in order.
    pub fn compose(
        name: &str,
        description: &str,
        members: &[Component],
        now: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::EmptyName);
        }
        if members.is_empty() {
            return Err(WorkflowError::NoMembers);
        }

        let component_ids: Vec<ComponentId> = members.iter().map(|c| c.id.clone()).collect();

        Ok(Self {
            id: WorkflowId::for_members(&component_ids),
            name: name.to_string(),
            description: description.trim().to_string(),
            component_ids,
            permissions: members.iter().flat_map(|c| c.permissions.iter().cloned()).collect(),
            tags: members.iter().flat_map(|c| c.tags.iter().cloned()).collect(),
            languages: members.iter().map(|c| c.language.clone()).collect(),
            stats: UsageStats::new(now),
            created_at: now,
        })
    }

    pub fn keywords(&self) -> BTreeSet<String> {
        let mut words = keywords(&self.name);
        words.extend(keywords(&self.description));
        for tag in &self.tags {
            words.extend(keywords(tag));
        }
        words
    }

    pub fn speaks(&self, language: &str) -> bool {
        self.languages.contains(language)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow name cannot be empty")]
    EmptyName,

    #[error("Workflow must reference at least one component")]
    NoMembers,

    #[error("Invalid workflow id: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{ComponentDraft, Permission};

    fn component(name: &str, source: &str, permission: Option<&str>) -> Component {
        let mut draft = ComponentDraft::new(name, source, "python").with_tags([name]);
        if let Some(spec) = permission {
            draft = draft.with_permission(Permission::parse_spec(spec).unwrap());
        }
        Component::from_draft(draft, Utc::now()).unwrap().component
    }

    #[test]
    fn test_workflow_id_depends_on_order() {
        let a = ComponentId::for_source("a");
        let b = ComponentId::for_source("b");
        assert_eq!(
            WorkflowId::for_members(&[a.clone(), b.clone()]),
            WorkflowId::for_members(&[a.clone(), b.clone()])
        );
        assert_ne!(
            WorkflowId::for_members(&[a.clone(), b.clone()]),
            WorkflowId::for_members(&[b, a])
        );
    }

    #[test]
    fn test_compose_aggregates_member_metadata() {
        let fetch = component("fetch", "fetch()", Some("network-egress:example.com"));
        let store = component("store", "store()", Some("secret-access:db"));
        let workflow = Workflow::compose("ingest", "fetch then store", &[fetch.clone(), store.clone()], Utc::now()).unwrap();

        assert_eq!(workflow.component_ids, vec![fetch.id, store.id]);
        assert_eq!(workflow.permissions.len(), 2);
        assert!(workflow.tags.contains("fetch"));
        assert!(workflow.speaks("python"));
        assert!(workflow.keywords().contains("ingest"));
    }

    #[test]
    fn test_compose_rejects_empty() {
        let fetch = component("fetch", "fetch()", None);
        assert_eq!(Workflow::compose("  ", "", &[fetch], Utc::now()).unwrap_err(), WorkflowError::EmptyName);
        assert_eq!(Workflow::compose("x", "", &[], Utc::now()).unwrap_err(), WorkflowError::NoMembers);
    }
}
