//! Report artifacts declared by stages.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file a stage is expected to leave in the working directory.
///
/// The runner records the path and whether it exists once the stage has
/// finished. Contents are left to downstream tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageArtifact {
    /// The type of artifact (e.g., "report").
    #[serde(rename = "type")]
    pub artifact_type: String,

    /// Path relative to the working directory.
    pub path: PathBuf,

    /// Whether the file was present after the stage ran.
    pub exists: bool,

    /// Size in bytes, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl StageArtifact {
    /// Creates a report artifact by inspecting `workspace/relative`.
    #[must_use]
    pub fn report(workspace: &Path, relative: impl Into<PathBuf>) -> Self {
        let path = relative.into();
        let metadata = std::fs::metadata(workspace.join(&path))
            .ok()
            .filter(std::fs::Metadata::is_file);

        Self {
            artifact_type: "report".to_string(),
            path,
            exists: metadata.is_some(),
            size_bytes: metadata.map(|m| m.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trivy-fs-report.html"), "<table></table>").unwrap();

        let artifact = StageArtifact::report(dir.path(), "trivy-fs-report.html");

        assert_eq!(artifact.artifact_type, "report");
        assert!(artifact.exists);
        assert_eq!(artifact.size_bytes, Some(15));
    }

    #[test]
    fn test_report_missing() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = StageArtifact::report(dir.path(), "gitleaks-report.json");

        assert!(!artifact.exists);
        assert!(artifact.size_bytes.is_none());
    }

    #[test]
    fn test_directory_is_not_a_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();

        let artifact = StageArtifact::report(dir.path(), "target");
        assert!(!artifact.exists);
    }
}
