//! Workflow types and the output-generation job.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{PrismError, Result};
use crate::jobs::record::JobResult;
use crate::jobs::runner::JobContext;
use crate::jobs::toolchain::ToolchainRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Design,
    Manufacturing,
    Render,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 3] = [
        WorkflowType::Design,
        WorkflowType::Manufacturing,
        WorkflowType::Render,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Design => "design",
            WorkflowType::Manufacturing => "manufacturing",
            WorkflowType::Render => "render",
        }
    }

    /// Directory, relative to the project root, the toolchain writes into.
    pub fn output_subdir(&self) -> &'static str {
        match self {
            WorkflowType::Design => "Design-Outputs",
            WorkflowType::Manufacturing => "Manufacturing-Outputs",
            WorkflowType::Render => "Design-Outputs/3D",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = PrismError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "design" => Ok(WorkflowType::Design),
            "manufacturing" => Ok(WorkflowType::Manufacturing),
            "render" => Ok(WorkflowType::Render),
            other => Err(PrismError::validation(format!(
                "unknown workflow type '{}', expected one of design, manufacturing, render",
                other
            ))),
        }
    }
}

/// Runs the toolchain for `workflow` against a registered project.
pub(crate) async fn run_workflow(
    ctx: &JobContext,
    project_id: &str,
    workflow: WorkflowType,
    author: &str,
) -> Result<JobResult> {
    let project = ctx.registry.lookup(project_id)?;
    let output_dir = project.path.join(workflow.output_subdir());

    let request = ToolchainRequest {
        project_id: project.id.clone(),
        project_dir: project.path.clone(),
        workflow,
        output_dir: output_dir.clone(),
        author: author.to_string(),
    };
    let output = ctx.toolchain.run(&request).await?;
    tracing::debug!(exit_code = output.exit_code, "Toolchain finished");

    Ok(JobResult::Workflow {
        project_id: project.id,
        workflow,
        author: author.to_string(),
        output_dir: workflow.output_subdir().to_string(),
        outputs: collect_outputs(&output_dir),
    })
}

/// Files under `dir` as sorted, `/`-separated relative paths.
fn collect_outputs(dir: &Path) -> Vec<String> {
    let mut outputs: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path().strip_prefix(dir).ok().map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            })
        })
        .collect();
    outputs.sort();
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_parse_workflow_types() {
        for workflow in WorkflowType::ALL {
            assert_eq!(workflow.as_str().parse::<WorkflowType>().unwrap(), workflow);
        }
    }

    #[test]
    fn test_unknown_workflow_is_validation_error() {
        let err = "Design".parse::<WorkflowType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_render_outputs_nest_under_design() {
        assert_eq!(WorkflowType::Render.output_subdir(), "Design-Outputs/3D");
    }

    #[test]
    fn test_collect_outputs_relative_and_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("gerbers")).unwrap();
        std::fs::write(dir.path().join("gerbers/F_Cu.gbr"), "").unwrap();
        std::fs::write(dir.path().join("bom.csv"), "").unwrap();

        assert_eq!(
            collect_outputs(dir.path()),
            vec!["bom.csv".to_string(), "gerbers/F_Cu.gbr".to_string()]
        );
    }

    #[test]
    fn test_collect_outputs_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(collect_outputs(&dir.path().join("absent")).is_empty());
    }
}
