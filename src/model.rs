use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

// ============================================================================
// Central manifest
// ============================================================================

/// A package version declared in `Directory.Packages.props`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub category: Option<String>, // label of the ItemGroup it was declared in
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            category: None,
        }
    }
}

/// A project file discovered in the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub path: PathBuf,
    pub name: String,
    pub declared_package_names: BTreeSet<String>,
    /// Packages that carry a local `Version` attribute despite CPM.
    pub versioned_overrides: HashMap<String, String>,
}

impl ProjectInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = project_name_from_path(&path);
        Self {
            path,
            name,
            ..Default::default()
        }
    }
}

/// In-memory central manifest, usable wherever a manifest source is expected.
#[derive(Debug, Clone, Default)]
pub struct CentralManifest {
    pub packages: Vec<Package>,
    pub projects: Vec<ProjectInfo>,
    pub workspace_root: Option<PathBuf>,
    pub solution_path: Option<PathBuf>,
}

/// Display name of a project: the file stem of its path.
pub fn project_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Resolver output
// ============================================================================

/// Output of `dotnet list package --format json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedDependencyReport {
    #[serde(default)]
    pub projects: Vec<ProjectReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub path: String,
    #[serde(default)]
    pub frameworks: Vec<FrameworkReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkReport {
    pub framework: String,
    #[serde(default)]
    pub top_level_packages: Vec<ReportedPackage>,
    #[serde(default)]
    pub transitive_packages: Vec<ReportedPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedPackage {
    pub id: String,
    pub resolved_version: String,
    #[serde(default)]
    pub vulnerabilities: Vec<Advisory>,
}

/// One advisory attached to a resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub severity: String, // "Low", "Moderate", "High", "Critical"
    #[serde(rename = "advisoryurl", alias = "advisoryUrl")]
    pub advisory_url: String,
}

/// One diagnostic line emitted during `dotnet restore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestoreWarning {
    pub code: String, // e.g. "NU1608"
    pub message: String,
    pub project_path: PathBuf,
}

// ============================================================================
// Analysis records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitiveConflict {
    pub package_id: String,
    pub central_version: String,
    pub transitive_version: String,
    pub transitive_parents: Vec<String>,
    pub projects: Vec<String>,
    /// `None` for conflicts recovered from restore warnings, which carry no framework.
    pub framework: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitiveConstraint {
    pub package_id: String,
    pub required_version: String,
    pub version_range: String,
    pub is_exact: bool,
    pub required_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerablePackageInfo {
    pub package_id: String,
    pub resolved_version: String,
    pub is_transitive: bool,
    pub vulnerabilities: Vec<Advisory>,
    pub projects: Vec<String>,
    pub framework: String,
}

/// Advisory entry loaded from the remote vulnerability feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDbEntry {
    pub severity_rank: u8, // 0 = low .. 3 = critical
    pub advisory_url: String,
    pub affected_range: String,
}

/// A project pinning a version locally instead of using the central one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionOverride {
    pub project: String,
    pub package_id: String,
    pub local_version: String,
    pub central_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub transitive_conflicts: Vec<TransitiveConflict>,
    pub vulnerable_packages: Vec<VulnerablePackageInfo>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_from_path() {
        assert_eq!(
            project_name_from_path(Path::new("/src/Api/Api.csproj")),
            "Api"
        );
        assert_eq!(project_name_from_path(Path::new("Web.fsproj")), "Web");
    }

    #[test]
    fn test_report_deserialization() {
        let json = r#"{
            "version": 1,
            "projects": [
                { "path": "/src/Empty/Empty.csproj" },
                {
                    "path": "/src/Api/Api.csproj",
                    "frameworks": [{
                        "framework": "net8.0",
                        "topLevelPackages": [
                            { "id": "Serilog", "requestedVersion": "3.0.0", "resolvedVersion": "3.0.0" }
                        ],
                        "transitivePackages": [{
                            "id": "System.Text.Json",
                            "resolvedVersion": "6.0.0",
                            "vulnerabilities": [
                                { "severity": "High", "advisoryurl": "https://github.com/advisories/GHSA-1" }
                            ]
                        }]
                    }]
                }
            ]
        }"#;

        let report: ResolvedDependencyReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.projects.len(), 2);
        assert!(report.projects[0].frameworks.is_empty());

        let framework = &report.projects[1].frameworks[0];
        assert_eq!(framework.top_level_packages[0].id, "Serilog");
        assert!(framework.top_level_packages[0].vulnerabilities.is_empty());
        assert_eq!(
            framework.transitive_packages[0].vulnerabilities[0].advisory_url,
            "https://github.com/advisories/GHSA-1"
        );
    }
}
