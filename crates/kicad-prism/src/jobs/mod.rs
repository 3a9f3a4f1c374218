//! Background jobs: imports and workflows, run on a bounded worker pool.

pub mod events;
pub mod import;
pub mod manager;
mod pool;
pub mod record;
pub mod runner;
pub mod toolchain;
pub mod workflow;

pub use events::{JobEvent, JobEventBroadcaster};
pub use import::{find_project_name, validate_repo_url};
pub use manager::JobManager;
pub use record::{JobError, JobKind, JobParams, JobRecord, JobResult, JobStatus};
pub use runner::JobContext;
pub use toolchain::{CommandToolchain, Toolchain, ToolchainError, ToolchainOutput, ToolchainRequest};
pub use workflow::WorkflowType;
