//! Error types for cdflow.
//!
//! Stage failures and gate timeouts are not errors in this sense: they are
//! recorded in the run result. The types here cover what prevents a run from
//! starting or a process from being spawned at all.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cdflow operations.
#[derive(Debug, Error)]
pub enum CdflowError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The execution environment is missing something the run needs.
    #[error("{0}")]
    Environment(#[from] EnvironmentError),

    /// The configuration file could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The quality gate could not produce a verdict.
    #[error("{0}")]
    Gate(#[from] GateError),

    /// An external process could not be spawned or awaited.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The operator cancelled the run.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdflowError {
    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Returns the error type name recorded in failure summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Environment(_) => "environment",
            Self::Config(_) => "config",
            Self::Gate(_) => "gate",
            Self::Spawn { .. } => "spawn",
            Self::Cancelled(_) => "cancelled",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    #[serde(default)]
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// An unrecoverable problem with the execution environment.
///
/// Always fatal: the run is aborted before (or instead of) any stage logic.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnvironmentError {
    /// A required external tool was not found on `PATH`.
    #[error("Required tool not found: {tool}")]
    MissingTool {
        /// The tool name.
        tool: String,
    },

    /// A required credential environment variable is unset or empty.
    #[error("Required credential not set: {name}")]
    MissingCredential {
        /// The environment variable name.
        name: String,
    },

    /// The working directory does not exist or is not a directory.
    #[error("Working directory unusable: {}", .path.display())]
    Workspace {
        /// The offending path.
        path: PathBuf,
    },
}

impl EnvironmentError {
    /// Creates a missing tool error.
    #[must_use]
    pub fn missing_tool(tool: impl Into<String>) -> Self {
        Self::MissingTool { tool: tool.into() }
    }

    /// Creates a missing credential error.
    #[must_use]
    pub fn missing_credential(name: impl Into<String>) -> Self {
        Self::MissingCredential { name: name.into() }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::MissingTool { tool } => {
                map.insert("type".to_string(), serde_json::json!("MissingTool"));
                map.insert("tool".to_string(), serde_json::json!(tool));
            }
            Self::MissingCredential { name } => {
                map.insert("type".to_string(), serde_json::json!("MissingCredential"));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::Workspace { path } => {
                map.insert("type".to_string(), serde_json::json!("Workspace"));
                map.insert("path".to_string(), serde_json::json!(path));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read config {}: {source}", .path.display())]
    Read {
        /// The config path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        /// The config path.
        path: PathBuf,
        /// The TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is present but unusable.
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from a quality gate that prevent a verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    /// The party holding the signal went away without delivering it.
    #[error("Quality gate signal lost before a verdict was delivered")]
    SignalLost,

    /// The wait was cancelled by the operator.
    #[error("Quality gate wait cancelled")]
    Cancelled,

    /// The analysis service could not be queried.
    #[error("Quality gate service error: {0}")]
    Service(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_with_stages() {
        let err = PipelineValidationError::new("Duplicate stage name 'build'")
            .with_stages(vec!["build".to_string()]);

        assert_eq!(err.to_string(), "Duplicate stage name 'build'");
        assert_eq!(err.stages, vec!["build".to_string()]);
    }

    #[test]
    fn test_environment_error_to_dict() {
        let err = EnvironmentError::missing_tool("trivy");
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "MissingTool");
        assert_eq!(dict.get("tool").unwrap(), "trivy");
        assert_eq!(dict.get("message").unwrap(), "Required tool not found: trivy");
    }

    #[test]
    fn test_cdflow_error_kind() {
        let err: CdflowError = EnvironmentError::missing_credential("KUBE_TOKEN").into();
        assert_eq!(err.kind(), "environment");
        assert!(err.to_string().contains("KUBE_TOKEN"));

        let err = CdflowError::spawn(
            "mvn compile",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.kind(), "spawn");
        assert!(err.to_string().contains("mvn compile"));
    }

    #[test]
    fn test_gate_error_display() {
        assert_eq!(
            GateError::Service("HTTP 503".to_string()).to_string(),
            "Quality gate service error: HTTP 503"
        );
    }
}
