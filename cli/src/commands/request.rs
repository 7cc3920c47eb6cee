// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `blockyard request`: run one request through the coordinator and print
//! the assembled components with their combined requirements. With `--watch`
//! the assembly's progress events go to stderr as they happen.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use blockyard_core::application::{OutcomeSummary, RegistryRuntime};
use blockyard_core::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};
use blockyard_core::{Assembly, AssemblyEvent, ExecutionReport, Request};

use super::component::Outcome;
use super::open_runtime;

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// What the code should do
    pub description: String,

    /// Additional capability; repeat for several
    #[arg(short, long = "feature")]
    pub features: Vec<String>,

    #[arg(short, long)]
    pub language: Option<String>,

    /// Bound for each generator call, e.g. 45s or 2m (default: configured)
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Report an execution outcome for the assembly right away
    #[arg(long, value_enum)]
    pub report: Option<Outcome>,

    /// Print the assembly as JSON
    #[arg(long)]
    pub json: bool,

    /// Print member sources
    #[arg(long)]
    pub source: bool,

    /// Print assembly progress to stderr while the request runs
    #[arg(short, long)]
    pub watch: bool,
}

pub fn parse_timeout(text: &str) -> Result<Duration, String> {
    let duration = humantime_serde::re::humantime::parse_duration(text).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

pub async fn handle_command(args: RequestArgs, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = open_runtime(config_path)?;
    let result = run(&runtime, args).await;
    runtime.close().await?;
    result
}

async fn run(runtime: &RegistryRuntime, args: RequestArgs) -> Result<()> {
    let (assembly, summary) = assemble(runtime, &args).await?;

    if args.json {
        let value = serde_json::json!({ "assembly": assembly, "outcome": summary });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_assembly(&assembly, args.source);
    if let Some(summary) = summary {
        print_summary(&summary);
    }
    Ok(())
}

async fn assemble(runtime: &RegistryRuntime, args: &RequestArgs) -> Result<(Assembly, Option<OutcomeSummary>)> {
    let watcher = args.watch.then(|| Watcher::start(&runtime.event_bus));
    let result = assemble_and_report(runtime, args).await;
    if let Some(watcher) = watcher {
        watcher.finish().await;
    }
    result
}

async fn assemble_and_report(
    runtime: &RegistryRuntime,
    args: &RequestArgs,
) -> Result<(Assembly, Option<OutcomeSummary>)> {
    let mut request = Request::new(args.description.clone()).with_features(args.features.iter().cloned());
    if let Some(language) = &args.language {
        request = request.with_language(language.clone());
    }

    let timeout = args.timeout.unwrap_or(runtime.coordinator.settings().generation_timeout);
    let assembly = runtime
        .coordinator
        .handle_with_timeout(request, timeout)
        .await
        .context("Request could not be assembled")?;

    let summary = match args.report {
        Some(outcome) => {
            let report = if outcome.succeeded() {
                ExecutionReport::success()
            } else {
                ExecutionReport::failure(Vec::new())
            };
            Some(runtime.coordinator.report_outcome(assembly.id, report).await?)
        }
        None => None,
    };

    Ok((assembly, summary))
}

/// Prints assembly events to stderr until stopped, then drains what is
/// still buffered.
struct Watcher {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Vec<String>>,
}

impl Watcher {
    fn start(event_bus: &EventBus) -> Self {
        let mut receiver = event_bus.subscribe();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut lines = Vec::new();
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Ok(event) => show(event, &mut lines),
                        Err(EventBusError::Lagged(_)) => {}
                        Err(_) => return lines,
                    },
                    _ = &mut stopped => break,
                }
            }
            loop {
                match receiver.try_recv() {
                    Ok(event) => show(event, &mut lines),
                    Err(EventBusError::Lagged(_)) => {}
                    Err(_) => return lines,
                }
            }
        });

        Self { stop, task }
    }

    /// Stop watching; returns the lines that were printed.
    async fn finish(self) -> Vec<String> {
        let _ = self.stop.send(());
        self.task.await.unwrap_or_default()
    }
}

fn show(event: DomainEvent, lines: &mut Vec<String>) {
    if let DomainEvent::Assembly(event) = event {
        let line = describe_event(&event);
        eprintln!("{} {}", "›".cyan(), line.dimmed());
        lines.push(line);
    }
}

fn describe_event(event: &AssemblyEvent) -> String {
    match event {
        AssemblyEvent::RequestReceived { description, .. } => format!("received '{}'", description),
        AssemblyEvent::StageEntered { stage, .. } => format!("stage {}", stage),
        AssemblyEvent::GenerationDelegated { capability, .. } => format!("generating '{}'", capability),
        AssemblyEvent::GenerationFailed { capability, reason, .. } => {
            format!("generation failed for '{}': {}", capability, reason)
        }
        AssemblyEvent::AssemblyCompleted {
            component_count,
            generated_count,
            ..
        } => format!("completed: {} components, {} generated", component_count, generated_count),
        AssemblyEvent::AssemblyFailed { reason, .. } => format!("failed: {}", reason),
        AssemblyEvent::WorkflowPromoted { workflow_id, .. } => format!("promoted to workflow {}", workflow_id.short()),
    }
}

fn print_assembly(assembly: &Assembly, with_source: bool) {
    println!("{} {}", "Assembly".bold(), assembly.id.to_string().dimmed());
    if let Some(workflow_id) = &assembly.workflow_id {
        println!("  Reused workflow {}", workflow_id.short());
    }
    println!(
        "  {} components: {} reused, {} generated",
        assembly.components.len(),
        assembly.reused.len(),
        assembly.generated.len()
    );

    for (position, component) in assembly.components.iter().enumerate() {
        let origin = if assembly.generated.contains(&component.id) {
            "generated".yellow()
        } else {
            "reused".green()
        };
        println!(
            "  {}. {} [{}] {} {}",
            position + 1,
            component.name,
            component.language,
            component.id.short().dimmed(),
            origin
        );
        if with_source {
            println!("{}", component.source);
            println!();
        }
    }

    if !assembly.permissions.is_empty() {
        println!("{}", "Permissions:".bold());
        for permission in &assembly.permissions {
            println!("  {}", permission.id);
        }
    }
    if !assembly.packages.is_empty() {
        println!("{}", "Packages:".bold());
        for package in &assembly.packages {
            println!("  {}", package.id);
        }
    }
}

fn print_summary(summary: &OutcomeSummary) {
    let verdict = if summary.succeeded { "success".green() } else { "failure".red() };
    println!("Reported {} for {} components", verdict, summary.components_updated);
    if let Some(workflow_id) = &summary.workflow_updated {
        println!("  Updated workflow {}", workflow_id.short());
    }
    if let Some(workflow_id) = &summary.promoted {
        println!("{}", format!("✓ Promoted to workflow {}", workflow_id).green());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_core::domain::registry_config::RegistryConfigManifest;
    use blockyard_core::ComponentDraft;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_timeout("1500ms").unwrap(), Duration::from_millis(1500));
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    fn args(description: &str, report: Option<Outcome>) -> RequestArgs {
        RequestArgs {
            description: description.to_string(),
            features: Vec::new(),
            language: None,
            timeout: None,
            report,
            json: false,
            source: false,
            watch: false,
        }
    }

    #[tokio::test]
    async fn test_request_reuses_stored_component_and_reports() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        let id = runtime
            .components
            .put(
                ComponentDraft::new("sort list", "sorted(items)", "python")
                    .with_description("sort a list of items"),
            )
            .await
            .unwrap();

        let (assembly, summary) = assemble(&runtime, &args("sort a list", Some(Outcome::Success)))
            .await
            .unwrap();

        assert_eq!(assembly.reused, vec![id.clone()]);
        assert!(assembly.generated.is_empty());
        let summary = summary.unwrap();
        assert!(summary.succeeded);
        assert_eq!(summary.components_updated, 1);

        let component = runtime.components.get(&id).await.unwrap().unwrap();
        assert_eq!(component.stats.success_count, 1);
    }

    #[tokio::test]
    async fn test_watch_sees_every_stage_of_the_request() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        runtime
            .components
            .put(ComponentDraft::new("sort list", "sorted(items)", "python").with_description("sort a list of items"))
            .await
            .unwrap();

        let watcher = Watcher::start(&runtime.event_bus);
        assemble_and_report(&runtime, &args("sort a list", Some(Outcome::Success)))
            .await
            .unwrap();
        let lines = watcher.finish().await;

        assert_eq!(lines.first().map(String::as_str), Some("received 'sort a list'"));
        assert!(lines.contains(&"stage searching_components".to_string()));
        assert!(lines.contains(&"completed: 1 components, 0 generated".to_string()));
        assert!(!lines.iter().any(|line| line.starts_with("generating")));
    }

    #[tokio::test]
    async fn test_watch_reports_failed_generation() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        let watcher = Watcher::start(&runtime.event_bus);
        assert!(assemble_and_report(&runtime, &args("parse xml feeds", None)).await.is_err());
        let lines = watcher.finish().await;

        assert!(lines.contains(&"generating 'parse xml feeds'".to_string()));
        assert!(lines.iter().any(|line| line.starts_with("failed: ")));
    }

    #[tokio::test]
    async fn test_request_without_generator_fails_on_gap() {
        let runtime = RegistryRuntime::open(RegistryConfigManifest::in_memory()).unwrap();
        assert!(assemble(&runtime, &args("parse xml feeds", None)).await.is_err());
    }
}
