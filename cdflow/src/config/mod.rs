//! TOML configuration for the `cdflow` binary.
//!
//! One file describes the whole run: where it executes, which tools and
//! credentials it needs, and either an explicit `[[stages]]` list or the
//! settings of the built-in DevSecOps pipeline.

pub mod catalog;
mod definition;

pub use definition::StageDefinition;

use crate::errors::{CdflowError, ConfigError};
use crate::gate::QualityGate;
use crate::pipeline::{Credential, Pipeline, RunnerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File name looked up when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "cdflow.toml";

/// Root of `cdflow.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdflowConfig {
    /// Execution environment.
    #[serde(default)]
    pub runner: RunnerSection,
    /// Repository checked out by the built-in pipeline.
    #[serde(default)]
    pub source: SourceSection,
    /// Container image built by the built-in pipeline.
    #[serde(default)]
    pub image: ImageSection,
    /// Cluster deployment settings.
    #[serde(default)]
    pub deploy: DeploySection,
    /// Static analysis server.
    #[serde(default)]
    pub sonar: SonarSection,
    /// Extra plain environment variables for every stage.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Explicit stage list; the built-in pipeline is used when empty.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// `[runner]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Pipeline name.
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Shared working directory.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Default bound on quality gate waits, in seconds.
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_secs: u64,
    /// Tools checked before the run; derived from the stages when empty.
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Environment variables holding secrets.
    #[serde(default)]
    pub credentials: Vec<String>,
}

/// `[source]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Repository URL.
    #[serde(default)]
    pub repository: String,
    /// Branch to build.
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// `[image]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSection {
    /// Image repository, e.g. `example/boardgame`.
    #[serde(default)]
    pub name: String,
    /// Image tag.
    #[serde(default = "default_tag")]
    pub tag: String,
}

/// `[deploy]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    /// Manifest applied to the cluster.
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Target namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Env var holding the control-plane address.
    #[serde(default = "default_server_env")]
    pub server_env: String,
    /// Env var holding the cluster access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

/// `[sonar]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SonarSection {
    /// Server base URL.
    #[serde(default = "default_sonar_host")]
    pub host_url: String,
    /// Project key the analysis is filed under.
    #[serde(default)]
    pub project_key: String,
    /// Env var holding the analysis token.
    #[serde(default = "default_sonar_token_env")]
    pub token_env: String,
    /// Seconds between quality gate status queries.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_pipeline_name() -> String {
    "devsecops".to_string()
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_gate_timeout() -> u64 {
    60 * 60
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_manifest() -> String {
    "deployment-service.yaml".to_string()
}

fn default_namespace() -> String {
    "webapps".to_string()
}

fn default_server_env() -> String {
    "KUBE_SERVER".to_string()
}

fn default_token_env() -> String {
    "KUBE_TOKEN".to_string()
}

fn default_sonar_host() -> String {
    "http://localhost:9000".to_string()
}

fn default_sonar_token_env() -> String {
    "SONAR_TOKEN".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            workspace: default_workspace(),
            gate_timeout_secs: default_gate_timeout(),
            required_tools: Vec::new(),
            credentials: Vec::new(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            repository: String::new(),
            branch: default_branch(),
        }
    }
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            tag: default_tag(),
        }
    }
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            namespace: default_namespace(),
            server_env: default_server_env(),
            token_env: default_token_env(),
        }
    }
}

impl Default for SonarSection {
    fn default() -> Self {
        Self {
            host_url: default_sonar_host(),
            project_key: String::new(),
            token_env: default_sonar_token_env(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_env_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if is_env_name(name) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("'{name}' is not a valid environment variable name"),
        ))
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::invalid(field, "required by the built-in pipeline"))
    } else {
        Ok(())
    }
}

impl CdflowConfig {
    /// Loads and validates a config file.
    ///
    /// A relative `runner.workspace` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text, path)?;

        if config.runner.workspace.is_relative() {
            if let Some(base) = path.parent() {
                config.runner.workspace = base.join(&config.runner.workspace);
            }
        }

        tracing::debug!(path = %path.display(), stages = config.stages.len(), "Loaded config");
        Ok(config)
    }

    /// Parses and validates config text. `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Returns true if the built-in pipeline will be used.
    #[must_use]
    pub fn uses_builtin_pipeline(&self) -> bool {
        self.stages.is_empty()
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.name.trim().is_empty() {
            return Err(ConfigError::invalid("runner.name", "must not be empty"));
        }
        if self.runner.gate_timeout_secs == 0 {
            return Err(ConfigError::invalid("runner.gate_timeout_secs", "must be positive"));
        }
        for name in &self.runner.credentials {
            check_env_name("runner.credentials", name)?;
        }
        for name in self.env.keys() {
            check_env_name("env", name)?;
        }

        if self.uses_builtin_pipeline() {
            require("source.repository", &self.source.repository)?;
            require("source.branch", &self.source.branch)?;
            require("image.name", &self.image.name)?;
            require("image.tag", &self.image.tag)?;
            require("sonar.project_key", &self.sonar.project_key)?;
            require("sonar.host_url", &self.sonar.host_url)?;
            require("deploy.manifest", &self.deploy.manifest)?;
            require("deploy.namespace", &self.deploy.namespace)?;
            check_env_name("deploy.server_env", &self.deploy.server_env)?;
            check_env_name("deploy.token_env", &self.deploy.token_env)?;
        } else {
            for (index, stage) in self.stages.iter().enumerate() {
                stage.validate(index)?;
            }
        }

        Ok(())
    }

    /// Default bound on quality gate waits.
    #[must_use]
    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.gate_timeout_secs)
    }

    /// Builds the pipeline: the explicit `[[stages]]` or the built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage list does not form a valid pipeline.
    pub fn pipeline(&self, gate: Arc<dyn QualityGate>) -> Result<Pipeline, CdflowError> {
        if self.uses_builtin_pipeline() {
            Ok(catalog::devsecops(self, gate)?)
        } else {
            definition::build_pipeline(&self.runner.name, &self.stages, gate, self.gate_timeout())
        }
    }

    /// Builds the runner environment, reading credentials from the process
    /// environment.
    #[must_use]
    pub fn runner_config(&self, pipeline: &Pipeline) -> RunnerConfig {
        let required_tools = if !self.runner.required_tools.is_empty() {
            self.runner.required_tools.clone()
        } else if self.uses_builtin_pipeline() {
            pipeline.tools()
        } else {
            Vec::new()
        };

        let mut config = RunnerConfig::new(&self.runner.workspace).with_required_tools(required_tools);
        for (key, value) in &self.env {
            config = config.with_env(key, value);
        }
        for name in self.credential_names() {
            config = config.with_credential(Credential::from_env(name));
        }
        config
    }

    /// Env vars checked and masked for the run: `runner.credentials`, plus
    /// the cluster address and token the built-in deploy stages read.
    #[must_use]
    pub fn credential_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runner.credentials.iter().map(String::as_str).collect();
        if self.uses_builtin_pipeline() {
            for name in [&self.deploy.server_env, &self.deploy.token_env] {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Builds the quality gate the configured pipeline waits on.
    ///
    /// The gate follows the analysis task `sonar-scanner` records in the
    /// workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[cfg(feature = "sonarqube")]
    pub fn quality_gate(&self) -> Result<Arc<dyn QualityGate>, CdflowError> {
        use crate::gate::{SonarQubeGate, SonarQubeSettings, SCANNER_REPORT_TASK};

        let token = std::env::var(&self.sonar.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(token_env = %self.sonar.token_env, "No SonarQube token; querying anonymously");
        }
        let gate = SonarQubeGate::new(SonarQubeSettings {
            host_url: self.sonar.host_url.clone(),
            project_key: self.sonar.project_key.clone(),
            token,
            report_task: Some(self.runner.workspace.join(SCANNER_REPORT_TASK)),
            poll_interval: Duration::from_secs(self.sonar.poll_interval_secs.max(1)),
            request_timeout: Duration::from_secs(self.sonar.request_timeout_secs.max(1)),
        })?;
        Ok(Arc::new(gate))
    }

    /// Builds the quality gate the configured pipeline waits on.
    ///
    /// Without the `sonarqube` feature nothing can deliver a verdict, so gate
    /// stages record a lost signal.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the `sonarqube` build.
    #[cfg(not(feature = "sonarqube"))]
    pub fn quality_gate(&self) -> Result<Arc<dyn QualityGate>, CdflowError> {
        tracing::warn!("Built without the sonarqube feature; quality gate stages will fail");
        let (gate, _handle) = crate::gate::ChannelGate::new();
        Ok(Arc::new(gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunStatus, StageKind, StageStatus};
    use crate::gate::GateVerdict;
    use crate::pipeline::PipelineRunner;
    use crate::process::MockToolLocator;
    use crate::testing::{ScriptedCommandRunner, ScriptedGate};
    use pretty_assertions::assert_eq;

    const BUILTIN: &str = r#"
[runner]
name = "boardgame"
credentials = ["SONAR_TOKEN"]

[source]
repository = "https://github.com/example/boardgame.git"

[image]
name = "example/boardgame"

[sonar]
host_url = "http://sonarqube:9000"
project_key = "BoardGame"

[env]
MAVEN_OPTS = "-Xmx1g"
"#;

    fn gate() -> Arc<dyn QualityGate> {
        Arc::new(ScriptedGate::verdict(GateVerdict::Passed))
    }

    #[test]
    fn test_defaults() {
        let config = CdflowConfig::parse(BUILTIN, Path::new("cdflow.toml")).unwrap();

        assert_eq!(config.runner.name, "boardgame");
        assert_eq!(config.runner.gate_timeout_secs, 3600);
        assert_eq!(config.source.branch, "main");
        assert_eq!(config.image.tag, "latest");
        assert_eq!(config.deploy.namespace, "webapps");
        assert_eq!(config.deploy.token_env, "KUBE_TOKEN");
        assert_eq!(config.sonar.poll_interval_secs, 5);
        assert!(config.uses_builtin_pipeline());
    }

    #[test]
    fn test_builtin_requires_repository() {
        let err = CdflowConfig::parse("[image]\nname = \"x\"\n", Path::new("c.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "source.repository"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = CdflowConfig::parse("[runner\n", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_invalid_credential_name() {
        let text = "[runner]\ncredentials = [\"BAD-NAME\"]\n[[stages]]\nname = \"a\"\ncommands = [\"true\"]\n";
        let err = CdflowConfig::parse(text, Path::new("c.toml")).unwrap_err();
        assert!(err.to_string().contains("BAD-NAME"));
    }

    #[test]
    fn test_load_resolves_workspace_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, format!("{BUILTIN}\n")).unwrap();

        let config = CdflowConfig::load(&path).unwrap();

        assert_eq!(config.runner.workspace, dir.path().join("."));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CdflowConfig::load(Path::new("/nonexistent/cdflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_runner_config_for_builtin_pipeline() {
        let config = CdflowConfig::parse(BUILTIN, Path::new("cdflow.toml")).unwrap();
        let pipeline = config.pipeline(gate()).unwrap();

        let runner = config.runner_config(&pipeline);

        assert_eq!(
            runner.required_tools,
            vec!["git", "gitleaks", "mvn", "trivy", "sonar-scanner", "docker", "kubectl"]
        );
        assert_eq!(runner.env, vec![("MAVEN_OPTS".to_string(), "-Xmx1g".to_string())]);
        let names: Vec<&str> = runner.credentials.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["SONAR_TOKEN", "KUBE_SERVER", "KUBE_TOKEN"]);
    }

    #[test]
    fn test_quality_gate_builds() {
        let config = CdflowConfig::parse(BUILTIN, Path::new("cdflow.toml")).unwrap();
        assert!(config.quality_gate().is_ok());
    }

    #[test]
    fn test_cluster_credentials_not_duplicated() {
        let text = BUILTIN.replace(
            "credentials = [\"SONAR_TOKEN\"]",
            "credentials = [\"KUBE_TOKEN\", \"SONAR_TOKEN\"]",
        );
        let config = CdflowConfig::parse(&text, Path::new("cdflow.toml")).unwrap();

        assert_eq!(
            config.credential_names(),
            vec!["KUBE_TOKEN", "SONAR_TOKEN", "KUBE_SERVER"]
        );
    }

    #[tokio::test]
    async fn test_builtin_aborts_without_cluster_token() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "{BUILTIN}\n[deploy]\nserver_env = \"CDFLOW_TEST_UNSET_SERVER\"\ntoken_env = \"CDFLOW_TEST_UNSET_TOKEN\"\n"
        );
        let mut config = CdflowConfig::parse(&text, Path::new("cdflow.toml")).unwrap();
        config.runner.workspace = dir.path().to_path_buf();
        config.runner.credentials.clear();
        let pipeline = config.pipeline(gate()).unwrap();

        let mut locator = MockToolLocator::new();
        locator
            .expect_locate()
            .returning(|tool| Some(PathBuf::from("/usr/bin").join(tool)));
        let commands = Arc::new(ScriptedCommandRunner::new().respond("kubectl", 1, "", "Unauthorized"));
        let runner = PipelineRunner::new(config.runner_config(&pipeline), commands.clone())
            .with_locator(Arc::new(locator));

        let result = runner.run(&pipeline).await;

        assert_eq!(result.status, RunStatus::Aborted);
        assert!(commands.invocations().is_empty());
        assert!(result.stages.iter().all(|s| s.status == StageStatus::Skipped));
        assert!(result
            .halt_reason
            .as_deref()
            .unwrap()
            .contains("CDFLOW_TEST_UNSET_SERVER"));
    }

    #[test]
    fn test_custom_stages_pipeline() {
        let text = r#"
[runner]
name = "custom"
gate_timeout_secs = 120

[[stages]]
name = "compile"
commands = ["mvn compile"]

[[stages]]
name = "secret-scan"
commands = ["gitleaks detect --source ."]
continue_on_failure = true
reports = ["gitleaks-report.json"]

[[stages]]
name = "gate"
kind = "quality_gate"
continue_on_failure = true
"#;
        let config = CdflowConfig::parse(text, Path::new("c.toml")).unwrap();
        let pipeline = config.pipeline(gate()).unwrap();

        assert_eq!(pipeline.name(), "custom");
        assert_eq!(pipeline.stage_names(), vec!["compile", "secret-scan", "gate"]);
        assert!(pipeline.stages()[1].policy.is_tolerant());
        assert_eq!(pipeline.stages()[2].kind(), StageKind::QualityGate);
        assert_eq!(
            pipeline.stages()[2].runner.describe(),
            vec!["wait for quality gate verdict (timeout 120s)".to_string()]
        );
        assert!(config.runner_config(&pipeline).required_tools.is_empty());
    }
}
