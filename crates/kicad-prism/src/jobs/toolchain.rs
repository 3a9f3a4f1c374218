//! External output-generation toolchain.
//!
//! Argument templates may contain these placeholders, replaced verbatim:
//! `{project_dir}`, `{project_id}`, `{workflow}`, `{output_dir}`, `{author}`.
//! Arguments are passed directly to the program, never through a shell.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::WorkflowSettings;
use crate::jobs::workflow::WorkflowType;

/// Trailing output lines kept as the diagnostic of a failed run.
const DIAGNOSTIC_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Toolchain timed out after {0}s")]
    Timeout(u64),

    #[error("Toolchain exited with {}: {diagnostics}", exit_label(.code))]
    Failed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("Failed to prepare '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// One toolchain invocation.
#[derive(Debug, Clone)]
pub struct ToolchainRequest {
    pub project_id: String,
    pub project_dir: PathBuf,
    pub workflow: WorkflowType,
    pub output_dir: PathBuf,
    pub author: String,
}

#[derive(Debug, Clone, Default)]
pub struct ToolchainOutput {
    pub exit_code: i32,
    /// Trailing lines of the program's output.
    pub log_tail: String,
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn run(&self, request: &ToolchainRequest) -> Result<ToolchainOutput, ToolchainError>;
}

/// Runs a configured program, `kicad-cli` by default.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandToolchain {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self::new(
            settings.program.clone(),
            settings.args.clone(),
            settings.timeout_secs.map(Duration::from_secs),
        )
    }

    fn expand_args(&self, request: &ToolchainRequest) -> Vec<String> {
        let project_dir = request.project_dir.to_string_lossy();
        let output_dir = request.output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{project_dir}", &project_dir)
                    .replace("{project_id}", &request.project_id)
                    .replace("{workflow}", request.workflow.as_str())
                    .replace("{output_dir}", &output_dir)
                    .replace("{author}", &request.author)
            })
            .collect()
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn run(&self, request: &ToolchainRequest) -> Result<ToolchainOutput, ToolchainError> {
        std::fs::create_dir_all(&request.output_dir).map_err(|e| ToolchainError::Io {
            path: request.output_dir.clone(),
            source: e,
        })?;

        let args = self.expand_args(request);
        tracing::debug!(
            program = %self.program,
            workflow = %request.workflow,
            project_id = %request.project_id,
            "Starting toolchain"
        );

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(&request.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolchainError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let output = match self.timeout {
            // Dropping the timed-out future drops the child, which kills it.
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ToolchainError::Timeout(limit.as_secs()))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| ToolchainError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let log_tail = if stderr.trim().is_empty() {
            tail_lines(&stdout, DIAGNOSTIC_LINES)
        } else {
            tail_lines(&stderr, DIAGNOSTIC_LINES)
        };

        if !output.status.success() {
            return Err(ToolchainError::Failed {
                code: output.status.code(),
                diagnostics: log_tail,
            });
        }

        Ok(ToolchainOutput {
            exit_code: output.status.code().unwrap_or(0),
            log_tail,
        })
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(dir: &TempDir) -> ToolchainRequest {
        ToolchainRequest {
            project_id: "board-1".to_string(),
            project_dir: dir.path().to_path_buf(),
            workflow: WorkflowType::Design,
            output_dir: dir.path().join("Design-Outputs"),
            author: "alice".to_string(),
        }
    }

    #[test]
    fn test_expand_args() {
        let dir = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(
            "kicad-cli",
            vec![
                "--job={workflow}".to_string(),
                "{project_dir}/board.kicad_pro".to_string(),
                "--by={author}@{project_id}".to_string(),
            ],
            None,
        );
        let args = toolchain.expand_args(&request(&dir));
        assert_eq!(args[0], "--job=design");
        assert_eq!(
            args[1],
            format!("{}/board.kicad_pro", dir.path().display())
        );
        assert_eq!(args[2], "--by=alice@board-1");
    }

    #[test]
    fn test_tail_lines() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "28\n29\n30");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_keeps_diagnostics() {
        let dir = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'ERC: 3 violations' >&2; exit 2".to_string(),
            ],
            None,
        );

        let err = toolchain.run(&request(&dir)).await.unwrap_err();
        match err {
            ToolchainError::Failed { code, diagnostics } => {
                assert_eq!(code, Some(2));
                assert!(diagnostics.contains("ERC: 3 violations"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
            Some(Duration::from_millis(200)),
        );

        let err = toolchain.run(&request(&dir)).await.unwrap_err();
        assert!(matches!(err, ToolchainError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new("prism-no-such-tool", Vec::new(), None);
        let err = toolchain.run(&request(&dir)).await.unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }
}
