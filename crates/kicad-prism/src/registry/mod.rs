//! Project registry: maps project ids to working trees.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{PrismError, Resource};
use crate::storage::write_atomic;

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Absolute path of the working tree.
    pub path: PathBuf,
    /// Remote the project was imported from, credentials redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Project already registered: {0}")]
    Duplicate(String),

    #[error("Failed to read registry '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry '{path}' is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write registry '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<RegistryError> for PrismError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => PrismError::not_found(Resource::Project, id),
            RegistryError::Duplicate(id) => {
                PrismError::conflict(format!("project '{}' is already registered", id))
            }
            RegistryError::Read { path, source } | RegistryError::Write { path, source } => {
                PrismError::persistence(path, source)
            }
            RegistryError::Parse { path, source } => PrismError::persistence(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, source),
            ),
        }
    }
}

/// Lookup and registration of projects.
///
/// Implementations must make a registered project visible to every later
/// `lookup`.
pub trait ProjectRegistry: Send + Sync {
    fn lookup(&self, id: &str) -> Result<Project, RegistryError>;

    fn register(&self, project: Project) -> Result<(), RegistryError>;

    fn list(&self) -> Vec<Project>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    projects: Vec<Project>,
}

/// Registry persisted as a JSON document, cached in memory.
pub struct FileProjectRegistry {
    path: PathBuf,
    projects: RwLock<BTreeMap<String, Project>>,
}

impl FileProjectRegistry {
    /// Opens the registry at `path`; a missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let document = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<RegistryDocument>(&content).map_err(|e| {
                RegistryError::Parse {
                    path: path.clone(),
                    source: e,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDocument::default(),
            Err(e) => return Err(RegistryError::Read { path, source: e }),
        };

        let projects = document
            .projects
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect::<BTreeMap<_, _>>();
        log::debug!("Loaded {} projects from {}", projects.len(), path.display());

        Ok(Self {
            path,
            projects: RwLock::new(projects),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, projects: &BTreeMap<String, Project>) -> Result<(), RegistryError> {
        let document = RegistryDocument {
            projects: projects.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|e| RegistryError::Write {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        write_atomic(&self.path, &json).map_err(|e| RegistryError::Write {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl ProjectRegistry for FileProjectRegistry {
    fn lookup(&self, id: &str) -> Result<Project, RegistryError> {
        let projects = match self.projects.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Project registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        projects
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn register(&self, project: Project) -> Result<(), RegistryError> {
        let mut projects = match self.projects.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Project registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if projects.contains_key(&project.id) {
            return Err(RegistryError::Duplicate(project.id));
        }

        let id = project.id.clone();
        projects.insert(id.clone(), project);
        if let Err(e) = self.persist(&projects) {
            projects.remove(&id);
            return Err(e);
        }

        tracing::info!(project_id = %id, "Registered project");
        Ok(())
    }

    fn list(&self) -> Vec<Project> {
        let projects = match self.projects.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Project registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        projects.values().cloned().collect()
    }
}
