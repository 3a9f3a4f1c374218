//! Application state wired from a [`Config`].

use std::sync::Arc;

use crate::comments::CommentStore;
use crate::config::Config;
use crate::error::Result;
use crate::history::ProjectHistory;
use crate::jobs::{CommandToolchain, JobContext, JobManager, Toolchain};
use crate::locks::KeyedLocks;
use crate::registry::{FileProjectRegistry, ProjectRegistry};
use crate::sync::SyncService;

/// Everything an adapter needs to serve requests.
pub struct Prism {
    pub registry: Arc<dyn ProjectRegistry>,
    pub jobs: JobManager,
    pub sync: SyncService,
    pub comments: CommentStore,
    pub history: ProjectHistory,
}

impl Prism {
    /// Opens the registry under the data directory and starts the job
    /// workers, using the configured `kicad-cli` invocation.
    pub fn from_config(config: &Config) -> Result<Self> {
        let toolchain = Arc::new(CommandToolchain::from_settings(&config.workflow));
        Self::with_toolchain(config, toolchain)
    }

    /// Like [`Prism::from_config`] with a caller-supplied toolchain.
    pub fn with_toolchain(config: &Config, toolchain: Arc<dyn Toolchain>) -> Result<Self> {
        let projects_dir = config.projects_dir();
        std::fs::create_dir_all(&projects_dir)
            .map_err(|e| crate::error::PrismError::persistence(&projects_dir, e))?;

        let registry: Arc<dyn ProjectRegistry> =
            Arc::new(FileProjectRegistry::open(config.registry_file())?);
        let locks = Arc::new(KeyedLocks::new());

        let context = JobContext {
            registry: Arc::clone(&registry),
            toolchain,
            git: config.git.clone(),
        };
        let jobs = JobManager::new(
            context,
            projects_dir.clone(),
            &config.jobs,
            config.import.clone(),
        )?;

        tracing::info!(
            data_directory = %config.data_directory,
            projects = registry.list().len(),
            workers = config.jobs.worker_count,
            "KiCad Prism core ready"
        );

        Ok(Self {
            sync: SyncService::new(
                Arc::clone(&registry),
                config.git.clone(),
                Arc::clone(&locks),
            ),
            comments: CommentStore::new(Arc::clone(&registry), locks),
            history: ProjectHistory::new(Arc::clone(&registry), config.git.clone()),
            jobs,
            registry,
        })
    }

    /// Waits for queued and running jobs, refusing new ones.
    pub fn shutdown(&self) {
        self.jobs.shutdown();
    }
}
