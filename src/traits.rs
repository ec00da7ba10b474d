use crate::analysis::constraints::LockGraph;
use crate::model::{
    CentralManifest, Package, ProjectInfo, ResolvedDependencyReport, RestoreWarning,
    VulnerabilityDbEntry,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("dotnet CLI not found: {0}")]
    Unavailable(String),
    #[error("No parseable JSON in resolver output")]
    NoParseableOutput,
    #[error("Failed to parse resolver output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum LockFileError {
    #[error("Lock file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse lock file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP request failed with status {status}: {url}")]
    Status { status: u16, url: String },
    #[error("Failed to parse advisory feed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only view of the central package manifest and the projects using it.
pub trait ManifestSource: Send + Sync {
    fn get_all_packages(&self) -> Vec<Package>;

    fn get_all_projects(&self) -> Vec<ProjectInfo>;

    fn get_workspace_root(&self) -> Option<PathBuf>;

    fn get_solution_path(&self) -> Option<PathBuf>;
}

impl ManifestSource for CentralManifest {
    fn get_all_packages(&self) -> Vec<Package> {
        self.packages.clone()
    }

    fn get_all_projects(&self) -> Vec<ProjectInfo> {
        self.projects.clone()
    }

    fn get_workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.clone()
    }

    fn get_solution_path(&self) -> Option<PathBuf> {
        self.solution_path.clone()
    }
}

/// The external dependency resolver (the `dotnet` CLI).
///
/// `target` narrows an invocation to one project or solution; `None` runs
/// against `root`.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn list_transitive_packages(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<ResolvedDependencyReport, ResolverError>;

    async fn list_vulnerable_packages(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<ResolvedDependencyReport, ResolverError>;

    async fn restore_and_get_warnings(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<Vec<RestoreWarning>, ResolverError>;
}

/// Loads the per-project dependency lock graph.
#[async_trait]
pub trait LockFileReader: Send + Sync {
    async fn read_lock_graph(&self, project: &ProjectInfo) -> Result<LockGraph, LockFileError>;
}

/// Source of vulnerability advisories, keyed by lowercase package id.
#[async_trait]
pub trait AdvisoryFeed: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<String, Vec<VulnerabilityDbEntry>>, AdvisoryError>;
}
