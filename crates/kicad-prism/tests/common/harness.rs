//! Test harness for isolated test execution.
//!
//! Every harness owns a temporary directory holding the data directory
//! (registry file and imported projects) and any git remotes a test builds.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tempfile::TempDir;

use kicad_prism::jobs::Toolchain;
use kicad_prism::{Config, JobManager, JobRecord, JobResult, JobStatus, Prism, Project};

/// Upper bound for a job to reach a terminal status in tests.
const JOB_DEADLINE: Duration = Duration::from_secs(60);

/// Runs git in `dir`, panicking with its stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Prism Tester",
            "-c",
            "user.email=tester@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Polls until the job leaves `pending`/`running`.
pub fn wait_for_terminal(jobs: &JobManager, job_id: &str) -> JobRecord {
    let deadline = Instant::now() + JOB_DEADLINE;
    loop {
        let record = jobs.poll(job_id).expect("job should be pollable");
        if record.is_terminal() {
            return record;
        }
        assert!(
            Instant::now() < deadline,
            "job {} did not finish in time (status {})",
            job_id,
            record.status
        );
        thread::sleep(Duration::from_millis(20));
    }
}

/// Isolated environment for integration tests.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Data directory handed to [`Prism`].
    pub data_dir: PathBuf,
    /// Where test remotes are created.
    pub remotes_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        let remotes_dir = temp_dir.path().join("remotes");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");
        std::fs::create_dir_all(&remotes_dir).expect("Failed to create remotes directory");

        Self {
            temp_dir,
            data_dir,
            remotes_dir,
        }
    }

    /// Config accepting `file://` imports, with a shell script standing in
    /// for `kicad-cli`. The script writes `<project_id>.txt` containing the
    /// workflow name into the output directory.
    pub fn config(&self) -> Config {
        let mut config = Config::with_data_directory(self.data_dir.to_string_lossy());
        config.jobs.worker_count = 4;
        config.jobs.queue_capacity = 128;
        config.git.timeout_secs = 60;
        config.import.allowed_schemes = vec!["file".to_string(), "https".to_string()];
        config.workflow.program = "sh".to_string();
        config.workflow.args = vec![
            "-c".to_string(),
            "echo {workflow} by {author} > '{output_dir}/{project_id}.txt'".to_string(),
        ];
        config.workflow.timeout_secs = Some(30);
        config
    }

    /// Builds the application with the shell toolchain from [`Self::config`].
    pub fn prism(&self) -> Prism {
        Prism::from_config(&self.config()).expect("Failed to build Prism")
    }

    pub fn prism_with(&self, config: &Config) -> Prism {
        Prism::from_config(config).expect("Failed to build Prism")
    }

    pub fn prism_with_toolchain(&self, toolchain: Arc<dyn Toolchain>) -> Prism {
        Prism::with_toolchain(&self.config(), toolchain).expect("Failed to build Prism")
    }

    /// Creates a git repository on `main` with one commit holding `files`.
    pub fn create_remote(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.remotes_dir.join(name);
        std::fs::create_dir_all(&path).expect("Failed to create remote directory");
        git(&path, &["init", "--quiet", "--initial-branch=main"]);
        self.commit_to_remote(&path, files, "Initial commit");
        path
    }

    /// Writes `files` into the remote and commits them.
    pub fn commit_to_remote(&self, remote: &Path, files: &[(&str, &str)], message: &str) -> String {
        for (relative, content) in files {
            let file = remote.join(relative);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent directory");
            }
            std::fs::write(&file, content).expect("Failed to write remote file");
        }
        git(remote, &["add", "--all"]);
        git(remote, &["commit", "--quiet", "-m", message]);
        git(remote, &["rev-parse", "HEAD"])
    }

    pub fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    /// Registers a plain directory as a project, bypassing import.
    pub fn register_local_project(&self, prism: &Prism, id: &str) -> Project {
        let path = self.data_dir.join("local").join(id);
        std::fs::create_dir_all(&path).expect("Failed to create project directory");
        let project = Project {
            id: id.to_string(),
            name: id.to_string(),
            path,
            remote_url: None,
            imported_at: Utc::now(),
        };
        prism
            .registry
            .register(project.clone())
            .expect("Failed to register project");
        project
    }

    /// Imports `remote` through the job manager and returns the project id.
    pub fn import(&self, prism: &Prism, remote: &Path) -> String {
        let job_id = prism
            .jobs
            .submit_import(&Self::file_url(remote))
            .expect("import should be accepted");
        let record = wait_for_terminal(&prism.jobs, &job_id);
        assert_eq!(
            record.status,
            JobStatus::Succeeded,
            "import failed: {:?}",
            record.error
        );
        match record.result {
            Some(JobResult::Import { project_id, .. }) => project_id,
            other => panic!("unexpected import result: {:?}", other),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
