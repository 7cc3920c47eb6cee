// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Component generator backed by an external command.
//!
//! The command receives the capability as one JSON object on stdin
//! (`{"name": "...", "language": "..."}`) and must print a
//! [`GeneratedComponent`] JSON object on stdout. A non-zero exit, empty
//! output or unparsable output is reported as `CannotGenerate`.
//!
//! The child is spawned with `kill_on_drop`, so a caller that abandons the
//! future (for instance on timeout) also terminates the process.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::application::collaborators::{ComponentGenerator, GeneratedComponent, GenerationError};
use crate::domain::capability::Capability;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` vector; `None` when it is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl ComponentGenerator for CommandGenerator {
    async fn generate(&self, capability: &Capability) -> Result<GeneratedComponent, GenerationError> {
        let input = serde_json::to_vec(capability)
            .map_err(|e| GenerationError::CannotGenerate(format!("cannot encode capability: {}", e)))?;

        debug!(program = %self.program, capability = %capability.name, "Spawning generator");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::CannotGenerate(format!("failed to spawn '{}': {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&input).await {
                // The generator may exit without reading its input
                debug!("Generator closed stdin early: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GenerationError::CannotGenerate(format!("failed to wait for generator: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %self.program,
                status = ?output.status.code(),
                "Generator exited unsuccessfully: {}",
                stderr.trim()
            );
            return Err(GenerationError::CannotGenerate(format!(
                "generator exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let generated: GeneratedComponent = serde_json::from_slice(&output.stdout)
            .map_err(|e| GenerationError::CannotGenerate(format!("invalid generator output: {}", e)))?;

        if generated.source.trim().is_empty() {
            return Err(GenerationError::CannotGenerate("generator returned empty source".to_string()));
        }

        Ok(generated)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandGenerator {
        CommandGenerator::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_reads_component_from_stdout() {
        let generator = shell(
            r#"cat > /dev/null; printf '{"source":"def sort(xs):\\n    return sorted(xs)","language":"python","kind":"function"}'"#,
        );
        let generated = generator
            .generate(&Capability::new("sort a list", Some("python")))
            .await
            .unwrap();

        assert!(generated.source.contains("sorted(xs)"));
        assert_eq!(generated.language.as_deref(), Some("python"));
    }

    #[tokio::test]
    async fn test_receives_capability_on_stdin() {
        let generator = shell(
            r#"input=$(cat); case "$input" in *'"name":"hash file"'*) printf '{"source":"ok"}' ;; *) exit 1 ;; esac"#,
        );
        let generated = generator.generate(&Capability::new("hash file", None)).await.unwrap();
        assert_eq!(generated.source, "ok");
    }

    #[tokio::test]
    async fn test_failure_exit_is_cannot_generate() {
        let generator = shell("echo nope >&2; exit 3");
        let result = generator.generate(&Capability::new("x", None)).await;
        assert!(matches!(result, Err(GenerationError::CannotGenerate(_))));
    }

    #[tokio::test]
    async fn test_garbage_output_is_cannot_generate() {
        let generator = shell("cat > /dev/null; echo not-json");
        let result = generator.generate(&Capability::new("x", None)).await;
        assert!(matches!(result, Err(GenerationError::CannotGenerate(_))));
    }

    #[test]
    fn test_from_empty_command_is_none() {
        assert!(CommandGenerator::from_command(&[]).is_none());
        assert!(CommandGenerator::from_command(&["gen".to_string()]).is_some());
    }
}
