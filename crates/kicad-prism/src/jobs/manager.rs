//! Job registry: submission, polling and retention.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::{ImportSettings, JobSettings};
use crate::error::{PrismError, Resource, Result};
use crate::jobs::events::{JobEvent, JobEventBroadcaster};
use crate::jobs::import::validate_repo_url;
use crate::jobs::pool::{SubmitError, WorkerPool};
use crate::jobs::record::{lock_record, JobParams, JobRecord};
use crate::jobs::runner::{
    lock_in_flight, InFlightImports, JobContext, JobRunner, JobTask, QueuedJob,
};
use crate::jobs::workflow::WorkflowType;
use crate::sanitize;

type RecordMap = HashMap<String, Arc<Mutex<JobRecord>>>;

/// Owns every job record and the workers that run them.
///
/// The map lock is held only to insert, look up or remove an entry; each
/// record has its own lock, so polling one job never waits on another.
pub struct JobManager {
    jobs: RwLock<RecordMap>,
    in_flight: InFlightImports,
    pool: WorkerPool,
    events: JobEventBroadcaster,
    context: JobContext,
    projects_dir: PathBuf,
    import: ImportSettings,
    retention: Duration,
    max_finished: usize,
}

impl JobManager {
    pub fn new(
        context: JobContext,
        projects_dir: impl Into<PathBuf>,
        settings: &JobSettings,
        import: ImportSettings,
    ) -> Result<Self> {
        let events = JobEventBroadcaster::default();
        let in_flight: InFlightImports = Arc::new(Mutex::new(HashSet::new()));
        let runner = Arc::new(JobRunner::new(
            context.clone(),
            events.clone(),
            Arc::clone(&in_flight),
        ));
        let pool = WorkerPool::new(runner, settings.worker_count, settings.queue_capacity)
            .map_err(|e| PrismError::Internal(format!("failed to start job workers: {}", e)))?;

        Ok(Self {
            jobs: RwLock::new(HashMap::new()),
            in_flight,
            pool,
            events,
            context,
            projects_dir: projects_dir.into(),
            import,
            retention: Duration::from_secs(settings.retention_secs),
            max_finished: settings.max_finished,
        })
    }

    /// Validates `url` and queues a clone of it. Returns the job id.
    pub fn submit_import(&self, url: &str) -> Result<String> {
        validate_repo_url(url, &self.import.allowed_schemes)?;

        let destination = self.projects_dir.join(sanitize::import_dir_name(url));
        {
            let mut in_flight = lock_in_flight(&self.in_flight);
            if in_flight.contains(&destination) {
                return Err(PrismError::conflict(format!(
                    "an import into '{}' is already in progress",
                    destination.display()
                )));
            }
            if destination.exists() {
                return Err(PrismError::conflict(format!(
                    "import destination '{}' already exists",
                    destination.display()
                )));
            }
            in_flight.insert(destination.clone());
        }

        let params = JobParams::Import {
            url: sanitize::redact_repo_url(url),
        };
        let task = JobTask::Import {
            url: url.to_string(),
            destination: destination.clone(),
        };
        self.enqueue(params, task).map_err(|e| {
            lock_in_flight(&self.in_flight).remove(&destination);
            e
        })
    }

    /// Validates the workflow type and project, then queues a toolchain run.
    pub fn submit_workflow(&self, project_id: &str, workflow: &str, author: &str) -> Result<String> {
        let workflow: WorkflowType = workflow.parse()?;
        let project = self.context.registry.lookup(project_id)?;

        let author = if author.trim().is_empty() {
            "anonymous".to_string()
        } else {
            author.trim().to_string()
        };
        let params = JobParams::Workflow {
            project_id: project.id.clone(),
            workflow,
            author: author.clone(),
        };
        let task = JobTask::Workflow {
            project_id: project.id,
            workflow,
            author,
        };
        self.enqueue(params, task)
    }

    fn enqueue(&self, params: JobParams, task: JobTask) -> Result<String> {
        self.purge_expired();

        let id = uuid::Uuid::new_v4().to_string();
        let record = JobRecord::new(&id, params);
        let kind = record.kind;
        let record = Arc::new(Mutex::new(record));

        self.write_jobs().insert(id.clone(), Arc::clone(&record));

        // Held until the pending event is out, so a worker cannot publish
        // `running` first.
        let guard = lock_record(&record);
        let queued = QueuedJob {
            id: id.clone(),
            record: Arc::clone(&record),
            task,
        };
        let submitted = self.pool.try_submit(queued);
        if submitted.is_ok() {
            self.events.send(JobEvent::from_record(&guard));
        }
        drop(guard);

        match submitted {
            Ok(()) => {
                tracing::info!(job_id = %id, kind = %kind, "Job submitted");
                Ok(id)
            }
            Err(SubmitError::Full) => {
                self.write_jobs().remove(&id);
                Err(PrismError::conflict("job queue is full, try again later"))
            }
            Err(SubmitError::Closed) => {
                self.write_jobs().remove(&id);
                Err(PrismError::Internal("job manager is shut down".to_string()))
            }
        }
    }

    /// Returns a snapshot of the job.
    pub fn poll(&self, job_id: &str) -> Result<JobRecord> {
        let record = self
            .read_jobs()
            .get(job_id)
            .cloned()
            .ok_or_else(|| PrismError::not_found(Resource::Job, job_id))?;
        let snapshot = lock_record(&record).clone();
        Ok(snapshot)
    }

    /// Snapshots of every retained job, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let records: Vec<_> = self.read_jobs().values().cloned().collect();
        let mut snapshots: Vec<JobRecord> =
            records.iter().map(|r| lock_record(r).clone()).collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        snapshots
    }

    /// Drops finished records past retention, then the oldest finished
    /// records beyond the cap. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - retention;

        let mut jobs = self.write_jobs();
        let mut finished: Vec<(chrono::DateTime<Utc>, String)> = jobs
            .iter()
            .filter_map(|(id, record)| {
                lock_record(record)
                    .finished_at
                    .map(|finished_at| (finished_at, id.clone()))
            })
            .collect();
        finished.sort();

        let excess = finished.len().saturating_sub(self.max_finished);
        let mut removed = 0;
        for (index, (finished_at, id)) in finished.iter().enumerate() {
            if index < excess || *finished_at < cutoff {
                jobs.remove(id);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = jobs.len(), "Purged finished jobs");
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Number of retained records, in any state.
    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuses new submissions and waits for queued and running jobs.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        tracing::debug!(
            receivers = self.events.receiver_count(),
            "Job manager stopped"
        );
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, RecordMap> {
        match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, RecordMap> {
        match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}
