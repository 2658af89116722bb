//! Lookup of required tools before a run starts.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Capability to find an external tool.
#[cfg_attr(test, mockall::automock)]
pub trait ToolLocator: Send + Sync {
    /// Returns the resolved path of `tool`, or `None` if it is unavailable.
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Finds tools by searching the directories on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct PathLocator {
    /// Search path override; the process `PATH` when `None`.
    path: Option<OsString>,
}

impl PathLocator {
    /// Creates a locator over the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a locator over an explicit search path.
    #[must_use]
    pub fn with_search_path(path: impl Into<OsString>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        if tool.contains(std::path::MAIN_SEPARATOR) {
            let candidate = PathBuf::from(tool);
            return is_executable(&candidate).then_some(candidate);
        }

        let search = self.path.clone().or_else(|| std::env::var_os("PATH"))?;
        std::env::split_paths(&search)
            .flat_map(|dir| candidates(&dir, tool))
            .find(|candidate| is_executable(candidate))
    }
}

fn candidates(dir: &Path, tool: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        ["", ".exe", ".cmd", ".bat"]
            .iter()
            .map(|ext| dir.join(format!("{tool}{ext}")))
            .collect()
    } else {
        vec![dir.join(tool)]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
