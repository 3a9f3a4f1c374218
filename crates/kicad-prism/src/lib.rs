pub mod app;
pub mod comments;
pub mod config;
pub mod error;
pub mod git;
pub mod history;
pub mod jobs;
pub mod locks;
pub mod registry;
pub mod sanitize;
pub mod storage;
pub mod sync;
pub mod telemetry;

pub use app::Prism;
pub use comments::{Comment, CommentLocation, CommentReply, CommentStore, CommentsFile};
pub use config::{load_config, Config};
pub use error::{ConfigError, ErrorKind, PrismError, Resource, Result};
pub use git::{GitError, GitRepository, SyncOutcome};
pub use history::ProjectHistory;
pub use jobs::{JobEvent, JobKind, JobManager, JobRecord, JobResult, JobStatus, WorkflowType};
pub use registry::{FileProjectRegistry, Project, ProjectRegistry, RegistryError};
pub use sync::{SyncReport, SyncService};
pub use telemetry::init_logging;
