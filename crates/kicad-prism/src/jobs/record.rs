//! Job records and their lifecycle.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PrismError};
use crate::jobs::workflow::WorkflowType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Import,
    Workflow,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Import => write!(f, "import"),
            JobKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// Status of a job. Only moves forward: pending, running, then one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Validated input of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    Import {
        /// Redacted form; the raw URL only travels with the queued job.
        url: String,
    },
    Workflow {
        project_id: String,
        workflow: WorkflowType,
        author: String,
    },
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Import { .. } => JobKind::Import,
            JobParams::Workflow { .. } => JobKind::Workflow,
        }
    }
}

/// Outcome of a succeeded job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Import {
        project_id: String,
        name: String,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
    Workflow {
        project_id: String,
        workflow: WorkflowType,
        author: String,
        /// Output directory relative to the project root.
        output_dir: String,
        /// Files found under `output_dir`, relative to it.
        outputs: Vec<String>,
    },
}

/// Failure captured in a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PrismError> for JobError {
    fn from(err: &PrismError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Point-in-time state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub params: JobParams,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set iff `status` is `succeeded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Set iff `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: params.kind(),
            status: JobStatus::Pending,
            params,
            created_at: now,
            updated_at: now,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending -> running`. Returns false if the record was not pending.
    pub fn mark_running(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
        true
    }

    /// `running -> succeeded`. Returns false if the record was not running.
    pub fn succeed(&mut self, result: JobResult) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Succeeded;
        self.result = Some(result);
        self.updated_at = now;
        self.finished_at = Some(now);
        true
    }

    /// `running -> failed`. Returns false if the record was not running.
    pub fn fail(&mut self, error: JobError) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = now;
        self.finished_at = Some(now);
        true
    }
}

pub(crate) fn lock_record(record: &Mutex<JobRecord>) -> MutexGuard<'_, JobRecord> {
    match record.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Job record lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
