// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Component store commands
//!
//! Commands: put, find, show, outcome, list

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use blockyard_core::application::RegistryRuntime;
use blockyard_core::{CapabilityQuery, Component, ComponentDraft, ComponentId, ComponentKind, PackageDependency, Permission};

use super::open_runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn succeeded(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[derive(Subcommand)]
pub enum ComponentCommand {
    /// Store a source file as a component (deduplicated by content)
    Put {
        /// Source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Component name (default: file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Language (default: inferred from the file extension)
        #[arg(short, long)]
        language: Option<String>,

        #[arg(short, long, default_value = "")]
        description: String,

        /// function, class, module or snippet
        #[arg(short, long, default_value = "snippet")]
        kind: String,

        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Permission as kind:target, e.g. network-egress:api.example.com
        #[arg(short, long = "permission")]
        permissions: Vec<String>,

        /// Package as ecosystem/name@constraint, e.g. pypi/requests@>=2.31
        #[arg(long = "package")]
        packages: Vec<String>,
    },

    /// Search components by capability text
    Find {
        query: String,

        #[arg(short, long)]
        language: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show one component with its permissions and packages
    Show {
        /// Component id or unique id prefix
        id: String,

        /// Print the source as well
        #[arg(long)]
        source: bool,

        #[arg(long)]
        json: bool,
    },

    /// Record an execution outcome for a component
    Outcome {
        /// Component id or unique id prefix
        id: String,

        #[arg(value_enum)]
        outcome: Outcome,
    },

    /// List all components, best ranked first
    List {
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: ComponentCommand, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = open_runtime(config_path)?;
    let result = run(&runtime, command).await;
    runtime.close().await?;
    result
}

async fn run(runtime: &RegistryRuntime, command: ComponentCommand) -> Result<()> {
    match command {
        ComponentCommand::Put {
            file,
            name,
            language,
            description,
            kind,
            tags,
            permissions,
            packages,
        } => {
            let source =
                std::fs::read_to_string(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
                    .context("Cannot derive a component name from the file name; pass --name")?,
            };
            let language = match language.or_else(|| infer_language(&file).map(str::to_string)) {
                Some(language) => language,
                None => bail!("Cannot infer the language of {:?}; pass --language", file),
            };
            let kind: ComponentKind = kind.parse()?;

            let mut draft = ComponentDraft::new(name, source, language)
                .with_description(description)
                .with_kind(kind)
                .with_tags(tags);
            for spec in &permissions {
                draft = draft.with_permission(Permission::parse_spec(spec)?);
            }
            for spec in &packages {
                draft = draft.with_package(PackageDependency::parse_spec(spec)?);
            }

            let stored = runtime.components.put_with_outcome(draft).await?;
            if stored.created {
                println!("{}", format!("✓ Stored component {}", stored.id).green());
            } else {
                println!("{} {}", "Already stored:".yellow(), stored.id);
            }
            Ok(())
        }

        ComponentCommand::Find {
            query,
            language,
            limit,
            json,
        } => {
            let query = CapabilityQuery::new(query)
                .with_language(language.as_deref())
                .with_limit(limit);
            let matches = runtime.components.find(&query).await?;

            if json {
                let rows: Vec<_> = matches
                    .iter()
                    .map(|m| serde_json::json!({ "relevance": m.relevance, "component": m.component }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if matches.is_empty() {
                println!("{}", "No matching components".dimmed());
                return Ok(());
            }
            for hit in &matches {
                print_row(&hit.component);
                println!("      relevance {:.2}", hit.relevance);
            }
            Ok(())
        }

        ComponentCommand::Show { id, source, json } => {
            let id = resolve_component_id(runtime, &id).await?;
            let component = runtime
                .components
                .get(&id)
                .await?
                .with_context(|| format!("Component not found: {}", id))?;
            let permissions = runtime.components.permissions_of(&component).await?;
            let packages = runtime.components.packages_of(&component).await?;

            if json {
                let value = serde_json::json!({
                    "component": component,
                    "permissions": permissions,
                    "packages": packages,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("{}", component.name.bold());
            println!("  ID: {}", component.id);
            println!("  Language: {}", component.language);
            println!("  Kind: {}", component.kind);
            if !component.description.is_empty() {
                println!("  Description: {}", component.description);
            }
            if !component.tags.is_empty() {
                let tags: Vec<&str> = component.tags.iter().map(String::as_str).collect();
                println!("  Tags: {}", tags.join(", "));
            }
            println!(
                "  Success rate: {:.3} ({} ok / {} failed)",
                component.stats.success_rate, component.stats.success_count, component.stats.failure_count
            );
            println!("  Uses: {}", component.stats.usage_count);
            println!("  Last used: {}", component.stats.last_used.to_rfc3339());
            for permission in &permissions {
                println!("  Permission: {} {}", permission.id, permission.description.dimmed());
            }
            for package in &packages {
                println!("  Package: {}", package.id);
            }
            if source {
                println!();
                println!("{}", component.source);
            }
            Ok(())
        }

        ComponentCommand::Outcome { id, outcome } => {
            let id = resolve_component_id(runtime, &id).await?;
            let updated = runtime.components.record_outcome(&id, outcome.succeeded()).await?;
            println!(
                "{}",
                format!(
                    "✓ {} success rate now {:.3}",
                    updated.id.short(),
                    updated.stats.success_rate
                )
                .green()
            );
            Ok(())
        }

        ComponentCommand::List { json } => {
            let mut components = runtime.components.list().await?;
            components.sort_by(|a, b| a.stats.rank_cmp(&b.stats).then_with(|| a.id.cmp(&b.id)));

            if json {
                println!("{}", serde_json::to_string_pretty(&components)?);
                return Ok(());
            }
            if components.is_empty() {
                println!("{}", "No components stored".dimmed());
            }
            for component in &components {
                print_row(component);
            }
            Ok(())
        }
    }
}

fn print_row(component: &Component) {
    println!(
        "  {}  {} [{}] rate {:.3} uses {}",
        component.id.short().dimmed(),
        component.name.bold(),
        component.language,
        component.stats.success_rate,
        component.stats.usage_count
    );
}

/// Accept a full id or an unambiguous prefix of one.
pub async fn resolve_component_id(runtime: &RegistryRuntime, text: &str) -> Result<ComponentId> {
    if let Ok(id) = ComponentId::parse(text) {
        return Ok(id);
    }

    let prefix = text.trim().to_lowercase();
    if prefix.is_empty() {
        bail!("Component id cannot be empty");
    }
    let mut candidates: Vec<ComponentId> = runtime
        .components
        .list()
        .await?
        .into_iter()
        .map(|component| component.id)
        .filter(|id| id.as_str().starts_with(&prefix))
        .collect();

    match candidates.len() {
        0 => bail!("No component id starts with '{}'", prefix),
        1 => Ok(candidates.remove(0)),
        n => bail!("'{}' is ambiguous: {} components match", prefix, n),
    }
}

/// Language from a file extension, for the common cases.
pub fn infer_language(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let language = match extension.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "sh" | "bash" => "shell",
        "rb" => "ruby",
        "java" => "java",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_core::domain::registry_config::RegistryConfigManifest;

    #[test]
    fn test_infer_language_from_extension() {
        assert_eq!(infer_language(Path::new("dedupe.py")), Some("python"));
        assert_eq!(infer_language(Path::new("src/lib.RS")), Some("rust"));
        assert_eq!(infer_language(Path::new("run.sh")), Some("shell"));
        assert_eq!(infer_language(Path::new("notes.txt")), None);
        assert_eq!(infer_language(Path::new("Makefile")), None);
    }

    #[tokio::test]
    async fn test_resolve_component_id_by_prefix() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        let id = runtime
            .components
            .put(ComponentDraft::new("greet", "print('hi')", "python"))
            .await
            .unwrap();

        let resolved = resolve_component_id(&runtime, &id.as_str()[..6]).await.unwrap();
        assert_eq!(resolved, id);
        assert_eq!(resolve_component_id(&runtime, id.as_str()).await.unwrap(), id);
        assert!(resolve_component_id(&runtime, "zzzz").await.is_err());
    }

    #[tokio::test]
    async fn test_put_twice_keeps_one_component() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("slug.py");
        std::fs::write(&file, "def slug(s):\n    return s.lower()\n").unwrap();
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();

        for _ in 0..2 {
            let command = ComponentCommand::Put {
                file: file.clone(),
                name: None,
                language: None,
                description: "lowercase slug".to_string(),
                kind: "function".to_string(),
                tags: vec!["text".to_string()],
                permissions: Vec::new(),
                packages: vec!["pypi/unidecode@>=1.3".to_string()],
            };
            run(&runtime, command).await.unwrap();
        }

        let components = runtime.components.list().await.unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "slug");
        assert_eq!(components[0].language, "python");
        assert_eq!(components[0].kind, ComponentKind::Function);
        assert_eq!(components[0].stats.usage_count, 1);
    }
}
