use std::path::Path;

use crate::config::schema::{Config, LogFormat};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

const KNOWN_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "file"];

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.data_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "data_directory must not be empty".to_string(),
        });
    }

    if config.jobs.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.worker_count must be at least 1".to_string(),
        });
    }

    if config.jobs.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.queue_capacity must be at least 1".to_string(),
        });
    }

    if config.git.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "git.timeout_secs must be at least 1".to_string(),
        });
    }

    for scheme in &config.import.allowed_schemes {
        if !KNOWN_SCHEMES.contains(&scheme.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Unknown import scheme: {}", scheme),
            });
        }
    }

    if config.workflow.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "workflow.program must not be empty".to_string(),
        });
    }

    if config.workflow.timeout_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "workflow.timeout_secs must be at least 1 or null".to_string(),
        });
    }

    Ok(())
}

impl Config {
    /// Applies `PRISM_*` environment overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(dir) = env_value("PRISM_DATA_DIR") {
            self.data_directory = dir;
        }

        if let Some(count) = env_value("PRISM_WORKER_COUNT") {
            self.jobs.worker_count = count
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    name: "PRISM_WORKER_COUNT".to_string(),
                    value: count.clone(),
                })?;
        }

        if let Some(level) = env_value("PRISM_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = env_value("PRISM_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "PRISM_LOG_FORMAT".to_string(),
                        value: format,
                    })
                }
            };
        }

        validate_config(self)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
