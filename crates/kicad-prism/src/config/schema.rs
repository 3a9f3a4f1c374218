use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root for the project registry file and imported repositories.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    /// Where imports are cloned; defaults to `<data_directory>/projects`.
    #[serde(default)]
    pub projects_directory: Option<String>,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub import: ImportSettings,
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Config {
    /// A config with every default applied.
    pub fn with_data_directory(data_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: data_directory.into(),
            projects_directory: None,
            jobs: JobSettings::default(),
            git: GitSettings::default(),
            import: ImportSettings::default(),
            workflow: WorkflowSettings::default(),
            logging: LoggingSettings::default(),
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        match &self.projects_directory {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(&self.data_directory).join("projects"),
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        PathBuf::from(&self.data_directory).join("projects.json")
    }
}

fn default_data_directory() -> String {
    dirs::data_dir()
        .map(|d| d.join("kicad-prism"))
        .unwrap_or_else(|| PathBuf::from(".kicad-prism"))
        .to_string_lossy()
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Jobs accepted but not yet picked up by a worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long finished records stay pollable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Upper bound on finished records kept in memory.
    #[serde(default = "default_max_finished")]
    pub max_finished: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_finished() -> usize {
    1000
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            retention_secs: default_retention_secs(),
            max_finished: default_max_finished(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Upper bound for a clone or a fetch.
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub auth: GitAuthSettings,
}

fn default_git_timeout() -> u64 {
    600
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_git_timeout(),
            remote: default_remote(),
            auth: GitAuthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitAuthSettings {
    #[serde(default, rename = "type")]
    pub auth_type: GitAuthType,
    /// Environment variable containing an access token.
    #[serde(default)]
    pub token_env_var: String,
    /// File containing an access token (Docker secrets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    /// Private key for SSH remotes; defaults to `~/.ssh/id_ed25519`.
    #[serde(default)]
    pub ssh_key_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitAuthType {
    #[default]
    None,
    Token,
    SshKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// URL schemes accepted for imports. scp-style `user@host:path` is
    /// accepted whenever `ssh` is.
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
}

fn default_allowed_schemes() -> Vec<String> {
    ["https", "http", "ssh", "git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_workflow_program")]
    pub program: String,
    /// Argument templates; see [`crate::jobs::toolchain`] for placeholders.
    #[serde(default = "default_workflow_args")]
    pub args: Vec<String>,
    /// `None` lets a workflow run without a bound.
    #[serde(default = "default_workflow_timeout")]
    pub timeout_secs: Option<u64>,
}

fn default_workflow_program() -> String {
    "kicad-cli".to_string()
}

fn default_workflow_args() -> Vec<String> {
    [
        "jobset",
        "run",
        "--file",
        "{project_dir}/.prism/{workflow}.kicad_jobset",
        "{project_dir}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_workflow_timeout() -> Option<u64> {
    Some(30 * 60)
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            program: default_workflow_program(),
            args: default_workflow_args(),
            timeout_secs: default_workflow_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
