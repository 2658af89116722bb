//! Gate that waits for a SonarQube analysis and reads its quality gate status.

use super::{GateVerdict, QualityGate};
use crate::cancellation::CancellationToken;
use crate::errors::GateError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where `sonar-scanner` records the background task it submitted, relative
/// to the directory it ran in.
pub const SCANNER_REPORT_TASK: &str = ".scannerwork/report-task.txt";

/// Connection settings for [`SonarQubeGate`].
#[derive(Debug, Clone)]
pub struct SonarQubeSettings {
    /// Server base URL, e.g. `http://sonarqube:9000`.
    pub host_url: String,
    /// Project key the analysis was submitted under.
    pub project_key: String,
    /// User token; sent as the basic-auth user name.
    pub token: Option<String>,
    /// Scanner report naming the analysis task of this run. When unset the
    /// project's latest completed analysis is queried instead.
    pub report_task: Option<PathBuf>,
    /// Delay between status queries.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatusResponse {
    project_status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
struct ProjectStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    task: CeTask,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CeTask {
    status: String,
    #[serde(default)]
    analysis_id: Option<String>,
}

/// Which analysis the quality gate status is read for.
#[derive(Debug)]
enum StatusTarget {
    Analysis(String),
    LatestOfProject,
}

/// Waits for the submitted analysis task, then reads the gate status of that
/// analysis.
///
/// The task is polled on `api/ce/task` until it reaches `SUCCESS`; `FAILED`
/// and `CANCELED` are service errors. The status of the resulting analysis
/// comes from `api/qualitygates/project_status`: `OK` is a pass and `ERROR`
/// is a fail. Other statuses and transient transport errors keep the poll
/// going; the caller's timeout bounds it.
#[derive(Debug)]
pub struct SonarQubeGate {
    settings: SonarQubeSettings,
    client: reqwest::Client,
}

impl SonarQubeGate {
    /// Creates a gate for the given server and project.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Service`] if the HTTP client cannot be built.
    pub fn new(settings: SonarQubeSettings) -> Result<Self, GateError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GateError::Service(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.host_url.trim_end_matches('/'))
    }

    /// One GET. `Ok(None)` means try again later.
    async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<R>, GateError> {
        let mut request = self.client.get(self.url(path)).query(query);
        if let Some(token) = &self.settings.token {
            request = request.basic_auth(token, Some(""));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%path, error = %e, "SonarQube request failed; will retry");
                return Ok(None);
            }
        };

        let status = response.status();
        if status.is_client_error() {
            return Err(GateError::Service(format!(
                "SonarQube rejected {path} for '{}': HTTP {status}",
                self.settings.project_key
            )));
        }
        if !status.is_success() {
            warn!(%path, %status, "SonarQube query unsuccessful; will retry");
            return Ok(None);
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| GateError::Service(format!("unreadable SonarQube response: {e}")))
    }

    async fn task_analysis(&self, task_id: &str) -> Result<Option<String>, GateError> {
        let Some(body) = self.get::<TaskResponse>("api/ce/task", &[("id", task_id)]).await? else {
            return Ok(None);
        };
        analysis_from_task(task_id, body.task)
    }

    async fn gate_status(&self, target: &StatusTarget) -> Result<Option<GateVerdict>, GateError> {
        let query = match target {
            StatusTarget::Analysis(id) => ("analysisId", id.as_str()),
            StatusTarget::LatestOfProject => ("projectKey", self.settings.project_key.as_str()),
        };
        let body = self
            .get::<ProjectStatusResponse>("api/qualitygates/project_status", &[query])
            .await?;
        Ok(body.and_then(|b| verdict_from_status(&b.project_status.status)))
    }

    /// Repeats `step` every poll interval until it yields a value.
    async fn poll<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        waiting_for: &str,
        mut step: F,
    ) -> Result<T, GateError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, GateError>> + Send,
        T: Send,
    {
        loop {
            let polled = tokio::select! {
                polled = step() => polled?,
                () = cancel.cancelled() => return Err(GateError::Cancelled),
            };

            if let Some(value) = polled {
                return Ok(value);
            }
            debug!(project_key = %self.settings.project_key, %waiting_for, "Not settled yet");

            tokio::select! {
                () = tokio::time::sleep(self.settings.poll_interval) => {}
                () = cancel.cancelled() => return Err(GateError::Cancelled),
            }
        }
    }
}

/// Reads `ceTaskId` from a scanner report-task file.
async fn read_task_id(path: &Path) -> Result<String, GateError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        GateError::Service(format!("cannot read scanner report {}: {e}", path.display()))
    })?;
    task_id_from_report(&text).ok_or_else(|| {
        GateError::Service(format!("no ceTaskId in scanner report {}", path.display()))
    })
}

fn task_id_from_report(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("ceTaskId="))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(ToString::to_string)
}

fn analysis_from_task(task_id: &str, task: CeTask) -> Result<Option<String>, GateError> {
    match task.status.as_str() {
        "SUCCESS" => task.analysis_id.map(Some).ok_or_else(|| {
            GateError::Service(format!("analysis task {task_id} succeeded without an analysis id"))
        }),
        "FAILED" | "CANCELED" => Err(GateError::Service(format!(
            "analysis task {task_id} ended {}",
            task.status
        ))),
        _ => Ok(None),
    }
}

fn verdict_from_status(status: &str) -> Option<GateVerdict> {
    match status {
        "OK" => Some(GateVerdict::Passed),
        "ERROR" => Some(GateVerdict::Failed),
        _ => None,
    }
}

#[async_trait]
impl QualityGate for SonarQubeGate {
    async fn wait(&self, cancel: &CancellationToken) -> Result<GateVerdict, GateError> {
        let target = match &self.settings.report_task {
            Some(report) => {
                let task_id = read_task_id(report).await?;
                info!(%task_id, "Waiting for SonarQube analysis task");
                let analysis = self
                    .poll(cancel, "analysis task", || self.task_analysis(&task_id))
                    .await?;
                StatusTarget::Analysis(analysis)
            }
            None => StatusTarget::LatestOfProject,
        };

        self.poll(cancel, "quality gate", || self.gate_status(&target))
            .await
    }
}
