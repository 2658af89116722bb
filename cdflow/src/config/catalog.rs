//! The built-in DevSecOps pipeline.
//!
//! Checkout, secret scan, compile, test, filesystem scan, static analysis,
//! quality gate, package, publish, image build, image scan, push, deploy and
//! verify. Secret scan and the quality gate tolerate failure; every other
//! stage halts the run.

use super::CdflowConfig;
use crate::errors::PipelineValidationError;
use crate::gate::QualityGate;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::process::shell_quote;
use crate::stages::{CommandStage, QualityGateStage};
use std::sync::Arc;

/// Report written by the secret scan.
pub const SECRET_SCAN_REPORT: &str = "gitleaks-report.json";
/// Report written by the filesystem scan.
pub const FS_SCAN_REPORT: &str = "trivy-fs-report.html";
/// Report written by the image scan.
pub const IMAGE_SCAN_REPORT: &str = "trivy-image-report.html";

fn kubectl(config: &CdflowConfig, args: &str) -> String {
    format!(
        "kubectl --server \"${}\" --token \"${}\" {args}",
        config.deploy.server_env, config.deploy.token_env
    )
}

/// Builds the fourteen-stage pipeline from `config`.
///
/// # Errors
///
/// Returns an error only if the resulting pipeline is invalid, which the
/// config validation rules out.
pub fn devsecops(
    config: &CdflowConfig,
    gate: Arc<dyn QualityGate>,
) -> Result<Pipeline, PipelineValidationError> {
    let image = format!("{}:{}", config.image.name, config.image.tag);
    let image = shell_quote(&image);
    let namespace = shell_quote(&config.deploy.namespace);
    let sonar_key = format!("-Dsonar.projectKey={}", config.sonar.project_key);
    let sonar_host = format!("-Dsonar.host.url={}", config.sonar.host_url);

    PipelineBuilder::new(&config.runner.name)
        .stage(Arc::new(CommandStage::new(
            "git-checkout",
            [
                "git init".to_string(),
                format!(
                    "git fetch --depth 1 {} {}",
                    shell_quote(&config.source.repository),
                    shell_quote(&config.source.branch)
                ),
                "git checkout FETCH_HEAD".to_string(),
            ],
        )))?
        .tolerant_stage(Arc::new(
            CommandStage::new(
                "secret-scan",
                [format!(
                    "gitleaks detect --source . --redact --report-path {SECRET_SCAN_REPORT}"
                )],
            )
            .with_reports([SECRET_SCAN_REPORT]),
        ))?
        .stage(Arc::new(CommandStage::new("compile", ["mvn compile"])))?
        .stage(Arc::new(CommandStage::new("test", ["mvn test"])))?
        .stage(Arc::new(
            CommandStage::new(
                "filesystem-scan",
                [format!("trivy fs --format table -o {FS_SCAN_REPORT} .")],
            )
            .with_reports([FS_SCAN_REPORT]),
        ))?
        .stage(Arc::new(CommandStage::new(
            "sonarqube-analysis",
            [format!(
                "sonar-scanner {} {} -Dsonar.java.binaries=.",
                shell_quote(&sonar_key),
                shell_quote(&sonar_host)
            )],
        )))?
        .tolerant_stage(Arc::new(
            QualityGateStage::new("quality-gate", gate).with_timeout(config.gate_timeout()),
        ))?
        .stage(Arc::new(CommandStage::new("build", ["mvn package"])))?
        .stage(Arc::new(CommandStage::new("publish-artifacts", ["mvn deploy"])))?
        .stage(Arc::new(CommandStage::new(
            "docker-build",
            [format!("docker build -t {image} .")],
        )))?
        .stage(Arc::new(
            CommandStage::new(
                "image-scan",
                [format!("trivy image --format table -o {IMAGE_SCAN_REPORT} {image}")],
            )
            .with_reports([IMAGE_SCAN_REPORT]),
        ))?
        .stage(Arc::new(CommandStage::new(
            "docker-push",
            [format!("docker push {image}")],
        )))?
        .stage(Arc::new(CommandStage::new(
            "deploy",
            [kubectl(
                config,
                &format!(
                    "apply -n {namespace} -f {}",
                    shell_quote(&config.deploy.manifest)
                ),
            )],
        )))?
        .stage(Arc::new(CommandStage::new(
            "verify-deployment",
            [
                kubectl(config, &format!("get pods -n {namespace}")),
                kubectl(config, &format!("get svc -n {namespace}")),
            ],
        )))?
        .build()
}
