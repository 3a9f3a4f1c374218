//! Executes queued jobs on worker threads.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tracing::Instrument;

use crate::config::GitSettings;
use crate::error::{ErrorKind, PrismError};
use crate::jobs::events::{JobEvent, JobEventBroadcaster};
use crate::jobs::import::run_import;
use crate::jobs::record::{lock_record, JobError, JobRecord, JobResult};
use crate::jobs::toolchain::Toolchain;
use crate::jobs::workflow::{run_workflow, WorkflowType};
use crate::registry::ProjectRegistry;

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct JobContext {
    pub registry: Arc<dyn ProjectRegistry>,
    pub toolchain: Arc<dyn Toolchain>,
    pub git: GitSettings,
}

/// Work a worker performs, with everything needed to run it.
pub(crate) enum JobTask {
    Import { url: String, destination: PathBuf },
    Workflow {
        project_id: String,
        workflow: WorkflowType,
        author: String,
    },
}

pub(crate) struct QueuedJob {
    pub id: String,
    pub record: Arc<Mutex<JobRecord>>,
    pub task: JobTask,
}

/// Destinations of imports that are queued or running.
pub(crate) type InFlightImports = Arc<Mutex<HashSet<PathBuf>>>;

pub(crate) fn lock_in_flight(
    in_flight: &Mutex<HashSet<PathBuf>>,
) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
    match in_flight.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("In-flight import set was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) struct JobRunner {
    context: JobContext,
    events: JobEventBroadcaster,
    in_flight: InFlightImports,
}

impl JobRunner {
    pub fn new(context: JobContext, events: JobEventBroadcaster, in_flight: InFlightImports) -> Self {
        Self {
            context,
            events,
            in_flight,
        }
    }

    /// Drives one job from `pending` to a terminal state.
    ///
    /// Failures and panics of the delegated operation end in `failed`; they
    /// never escape this function.
    pub async fn execute(&self, job: QueuedJob) {
        let QueuedJob { id, record, task } = job;
        let span = tracing::info_span!("job", job_id = %id);

        async {
            if !self.transition(&record, |r| r.mark_running()) {
                tracing::warn!("Job was not pending, skipping");
                self.release(&task);
                return;
            }
            tracing::info!("Job started");

            let outcome = AssertUnwindSafe(self.perform(&task)).catch_unwind().await;
            self.release(&task);

            let outcome = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!("Job panicked: {}", message);
                    Err(PrismError::Internal(format!("job panicked: {}", message)))
                }
            };

            match outcome {
                Ok(result) => {
                    self.transition(&record, |r| r.succeed(result));
                    tracing::info!("Job succeeded");
                }
                Err(e) => {
                    let error = JobError::from(&e);
                    if error.kind == ErrorKind::Internal {
                        tracing::error!("Job failed: {}", e);
                    } else {
                        tracing::warn!("Job failed: {}", e);
                    }
                    self.transition(&record, |r| r.fail(error));
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fails a job that was accepted but can never run.
    pub fn abandon(&self, job: QueuedJob, reason: &str) {
        let QueuedJob { record, task, .. } = job;
        self.transition(&record, |r| r.mark_running());
        self.transition(&record, |r| {
            r.fail(JobError {
                kind: ErrorKind::Internal,
                message: reason.to_string(),
            })
        });
        self.release(&task);
    }

    async fn perform(&self, task: &JobTask) -> Result<JobResult, PrismError> {
        match task {
            JobTask::Import { url, destination } => {
                run_import(&self.context, url, destination).await
            }
            JobTask::Workflow {
                project_id,
                workflow,
                author,
            } => run_workflow(&self.context, project_id, *workflow, author).await,
        }
    }

    /// Applies `change` under the record lock and publishes the new state.
    fn transition(
        &self,
        record: &Mutex<JobRecord>,
        change: impl FnOnce(&mut JobRecord) -> bool,
    ) -> bool {
        let event = {
            let mut guard = lock_record(record);
            if !change(&mut guard) {
                return false;
            }
            JobEvent::from_record(&guard)
        };
        self.events.send(event);
        true
    }

    fn release(&self, task: &JobTask) {
        if let JobTask::Import { destination, .. } = task {
            lock_in_flight(&self.in_flight).remove(destination);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
