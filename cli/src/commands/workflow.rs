// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow registry commands
//!
//! Commands: register, resolve, expand, list

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use blockyard_core::application::RegistryRuntime;
use blockyard_core::{CapabilityQuery, Workflow, WorkflowId};

use super::component::resolve_component_id;
use super::open_runtime;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register an ordered composition of stored components
    Register {
        /// Unique workflow name
        name: String,

        /// Member component ids (or unique prefixes), in execution order
        #[arg(required = true, value_name = "COMPONENT")]
        components: Vec<String>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Find the best workflow for a capability description (or exact name)
    Resolve {
        query: String,

        #[arg(short, long)]
        language: Option<String>,

        /// Minimum relevance (default: the configured confidence threshold)
        #[arg(long)]
        min_relevance: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Print a workflow's components in order
    Expand {
        /// Workflow name, id or unique id prefix
        workflow: String,

        /// Print member sources as well
        #[arg(long)]
        source: bool,

        #[arg(long)]
        json: bool,
    },

    /// List registered workflows, best ranked first
    List {
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: WorkflowCommand, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = open_runtime(config_path)?;
    let result = run(&runtime, command).await;
    runtime.close().await?;
    result
}

async fn run(runtime: &RegistryRuntime, command: WorkflowCommand) -> Result<()> {
    match command {
        WorkflowCommand::Register {
            name,
            components,
            description,
        } => {
            let mut ids = Vec::with_capacity(components.len());
            for text in &components {
                ids.push(resolve_component_id(runtime, text).await?);
            }
            let id = runtime.workflows.register_described(&name, &description, &ids).await?;
            println!("{}", format!("✓ Workflow registered: {} ({})", name, id).green());
            Ok(())
        }

        WorkflowCommand::Resolve {
            query,
            language,
            min_relevance,
            json,
        } => {
            let threshold = min_relevance.unwrap_or(runtime.config.spec.scoring.confidence_threshold);
            let query = CapabilityQuery::new(query)
                .with_language(language.as_deref())
                .with_min_relevance(threshold);

            let resolved = runtime.workflows.resolve(&query).await?;
            if json {
                let value = resolved.map(|m| {
                    serde_json::json!({
                        "workflow": m.workflow,
                        "relevance": m.relevance,
                        "by_name": m.by_name,
                    })
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            match resolved {
                Some(hit) => {
                    print_row(&hit.workflow);
                    if hit.by_name {
                        println!("      matched by name");
                    } else {
                        println!("      relevance {:.2}", hit.relevance);
                    }
                }
                None => println!("{}", "No workflow matches".dimmed()),
            }
            Ok(())
        }

        WorkflowCommand::Expand { workflow, source, json } => {
            let workflow = lookup(runtime, &workflow).await?;
            let components = runtime.workflows.expand_workflow(&workflow).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&components)?);
                return Ok(());
            }

            println!("{} {}", workflow.name.bold(), workflow.id.short().dimmed());
            for (position, component) in components.iter().enumerate() {
                println!(
                    "  {}. {} [{}] {}",
                    position + 1,
                    component.name,
                    component.language,
                    component.id.short().dimmed()
                );
                if source {
                    println!("{}", component.source);
                    println!();
                }
            }
            Ok(())
        }

        WorkflowCommand::List { json } => {
            let mut workflows = runtime.workflows.list().await?;
            workflows.sort_by(|a, b| a.stats.rank_cmp(&b.stats).then_with(|| a.id.cmp(&b.id)));

            if json {
                println!("{}", serde_json::to_string_pretty(&workflows)?);
                return Ok(());
            }
            if workflows.is_empty() {
                println!("{}", "No workflows registered".dimmed());
            }
            for workflow in &workflows {
                print_row(workflow);
            }
            Ok(())
        }
    }
}

fn print_row(workflow: &Workflow) {
    println!(
        "  {}  {} ({} components) rate {:.3} uses {}",
        workflow.id.short().dimmed(),
        workflow.name.bold(),
        workflow.component_ids.len(),
        workflow.stats.success_rate,
        workflow.stats.usage_count
    );
}

/// Name first, then full id, then unique id prefix.
async fn lookup(runtime: &RegistryRuntime, text: &str) -> Result<Workflow> {
    if let Some(workflow) = runtime.workflows.find_by_name(text).await? {
        return Ok(workflow);
    }
    if let Ok(id) = WorkflowId::parse(text) {
        return runtime
            .workflows
            .get(&id)
            .await?
            .with_context(|| format!("Workflow not found: {}", id));
    }

    let prefix = text.trim().to_lowercase();
    let mut candidates: Vec<Workflow> = runtime
        .workflows
        .list()
        .await?
        .into_iter()
        .filter(|workflow| !prefix.is_empty() && workflow.id.as_str().starts_with(&prefix))
        .collect();
    match candidates.len() {
        0 => bail!("No workflow named or identified by '{}'", text),
        1 => Ok(candidates.remove(0)),
        n => bail!("'{}' is ambiguous: {} workflows match", prefix, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_core::domain::registry_config::RegistryConfigManifest;
    use blockyard_core::ComponentDraft;

    #[tokio::test]
    async fn test_register_and_lookup_by_prefix() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        let read = runtime
            .components
            .put(ComponentDraft::new("read csv", "rows = read(path)", "python"))
            .await
            .unwrap();
        let write = runtime
            .components
            .put(ComponentDraft::new("write json", "dump(rows)", "python"))
            .await
            .unwrap();

        run(
            &runtime,
            WorkflowCommand::Register {
                name: "csv-to-json".to_string(),
                components: vec![read.short().to_string(), write.short().to_string()],
                description: "convert csv to json".to_string(),
            },
        )
        .await
        .unwrap();

        let by_name = lookup(&runtime, "csv-to-json").await.unwrap();
        let by_prefix = lookup(&runtime, &by_name.id.as_str()[..10]).await.unwrap();
        assert_eq!(by_name.id, by_prefix.id);
        assert_eq!(by_name.component_ids, vec![read, write]);
        assert!(lookup(&runtime, "missing").await.is_err());
    }
}
