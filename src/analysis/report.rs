//! Resolved-dependency report parsing and conflict detection from it.

use super::version::compare_versions;
use crate::model::{
    project_name_from_path, Package, ResolvedDependencyReport, TransitiveConflict,
    VulnerablePackageInfo,
};
use crate::traits::ResolverError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

/// Parses raw `dotnet list package --format json` output.
///
/// The tool may print informational lines before the JSON body, so parsing
/// starts at the first `{`.
pub fn parse_report(raw: &str) -> Result<ResolvedDependencyReport, ResolverError> {
    let start = raw.find('{').ok_or(ResolverError::NoParseableOutput)?;
    Ok(serde_json::from_str(&raw[start..])?)
}

/// Central versions keyed by lowercase package name.
pub(crate) fn central_index(packages: &[Package]) -> HashMap<String, &Package> {
    packages
        .iter()
        .map(|p| (p.name.to_lowercase(), p))
        .collect()
}

/// Finds transitive packages resolved above their central version.
///
/// A central version equal to or above the resolved one satisfies a minimum
/// requirement and is not reported here; exact-pin violations come from
/// restore warnings instead.
pub fn detect_conflicts(
    report: &ResolvedDependencyReport,
    packages: &[Package],
    max_parents: usize,
) -> Vec<TransitiveConflict> {
    let central = central_index(packages);
    let mut conflicts: Vec<TransitiveConflict> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for project in &report.projects {
        let project_name = project_name_from_path(Path::new(&project.path));

        for framework in &project.frameworks {
            for transitive in &framework.transitive_packages {
                let id_lower = transitive.id.to_lowercase();
                let Some(declared) = central.get(&id_lower) else {
                    continue;
                };

                if compare_versions(&declared.version, &transitive.resolved_version)
                    != Ordering::Less
                {
                    continue;
                }

                let key = (id_lower.clone(), framework.framework.clone());
                if let Some(&i) = index.get(&key) {
                    let existing = &mut conflicts[i];
                    if !existing.projects.contains(&project_name) {
                        existing.projects.push(project_name.clone());
                    }
                    continue;
                }

                let parents = framework
                    .top_level_packages
                    .iter()
                    .filter(|p| {
                        let lower = p.id.to_lowercase();
                        lower != id_lower && !central.contains_key(&lower)
                    })
                    .take(max_parents)
                    .map(|p| p.id.clone())
                    .collect();

                index.insert(key, conflicts.len());
                conflicts.push(TransitiveConflict {
                    package_id: transitive.id.clone(),
                    central_version: declared.version.clone(),
                    transitive_version: transitive.resolved_version.clone(),
                    transitive_parents: parents,
                    projects: vec![project_name.clone()],
                    framework: Some(framework.framework.clone()),
                });
            }
        }
    }

    conflicts
}

/// Collects packages carrying advisories, merged by id and resolved version.
pub fn collect_vulnerabilities(report: &ResolvedDependencyReport) -> Vec<VulnerablePackageInfo> {
    let mut found: Vec<VulnerablePackageInfo> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for project in &report.projects {
        let project_name = project_name_from_path(Path::new(&project.path));

        for framework in &project.frameworks {
            let top_level = framework.top_level_packages.iter().map(|p| (p, false));
            let transitive = framework.transitive_packages.iter().map(|p| (p, true));

            for (package, is_transitive) in top_level.chain(transitive) {
                if package.vulnerabilities.is_empty() {
                    continue;
                }

                let key = (package.id.to_lowercase(), package.resolved_version.clone());
                if let Some(&i) = index.get(&key) {
                    let existing = &mut found[i];
                    if !existing.projects.contains(&project_name) {
                        existing.projects.push(project_name.clone());
                    }
                    continue;
                }

                index.insert(key, found.len());
                found.push(VulnerablePackageInfo {
                    package_id: package.id.clone(),
                    resolved_version: package.resolved_version.clone(),
                    is_transitive,
                    vulnerabilities: package.vulnerabilities.clone(),
                    projects: vec![project_name.clone()],
                    framework: framework.framework.clone(),
                });
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> ResolvedDependencyReport {
        parse_report(json).unwrap()
    }

    fn single_transitive(project: &str, id: &str, resolved: &str) -> String {
        format!(
            r#"{{ "path": "/src/{project}/{project}.csproj", "frameworks": [{{
                "framework": "net8.0",
                "topLevelPackages": [
                    {{ "id": "Azure.Identity", "resolvedVersion": "1.10.0" }},
                    {{ "id": "Newtonsoft.Json", "resolvedVersion": "13.0.3" }}
                ],
                "transitivePackages": [{{ "id": "{id}", "resolvedVersion": "{resolved}" }}]
            }}] }}"#
        )
    }

    #[test]
    fn test_parse_skips_preamble() {
        let raw = "info: restoring\nwarn: something\n{ \"version\": 1, \"projects\": [] }";
        let parsed = parse_report(raw).unwrap();
        assert!(parsed.projects.is_empty());
    }

    #[test]
    fn test_parse_without_json_is_error() {
        let err = parse_report("error: unknown option --format").unwrap_err();
        assert!(matches!(err, ResolverError::NoParseableOutput));

        let err = parse_report("{ not json").unwrap_err();
        assert!(matches!(err, ResolverError::Json(_)));
    }

    #[test]
    fn test_central_lower_than_transitive_is_flagged() {
        let json = format!(
            r#"{{ "projects": [{}] }}"#,
            single_transitive("Api", "System.Memory", "2.0.0")
        );
        let packages = vec![
            Package::new("system.memory", "1.0.0"),
            Package::new("Newtonsoft.Json", "13.0.3"),
        ];

        let conflicts = detect_conflicts(&report(&json), &packages, 5);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.package_id, "System.Memory");
        assert_eq!(conflict.central_version, "1.0.0");
        assert_eq!(conflict.transitive_version, "2.0.0");
        assert_eq!(conflict.framework.as_deref(), Some("net8.0"));
        // centrally managed top-level packages are not listed as parents
        assert_eq!(conflict.transitive_parents, vec!["Azure.Identity"]);
        assert_eq!(conflict.projects, vec!["Api"]);
    }

    #[test]
    fn test_central_at_or_above_transitive_is_not_flagged() {
        let json = format!(
            r#"{{ "projects": [{}, {}] }}"#,
            single_transitive("Api", "Microsoft.Extensions.Logging", "9.0.10"),
            single_transitive("Web", "Polly", "8.0.0")
        );
        let packages = vec![
            Package::new("Microsoft.Extensions.Logging", "10.0.2"),
            Package::new("Polly", "8.0.0"),
        ];

        assert!(detect_conflicts(&report(&json), &packages, 5).is_empty());
    }

    #[test]
    fn test_same_conflict_in_two_projects_merges() {
        let json = format!(
            r#"{{ "projects": [{}, {}, {}] }}"#,
            single_transitive("Api", "System.Memory", "2.0.0"),
            single_transitive("Web", "System.Memory", "2.0.0"),
            single_transitive("Api", "System.Memory", "2.0.0")
        );
        let packages = vec![Package::new("System.Memory", "1.0.0")];

        let conflicts = detect_conflicts(&report(&json), &packages, 5);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].projects, vec!["Api", "Web"]);
    }

    #[test]
    fn test_unmanaged_transitive_packages_are_ignored() {
        let json = format!(
            r#"{{ "projects": [{}] }}"#,
            single_transitive("Api", "System.Buffers", "4.5.1")
        );
        let packages = vec![Package::new("System.Memory", "1.0.0")];
        assert!(detect_conflicts(&report(&json), &packages, 5).is_empty());
    }

    #[test]
    fn test_collect_vulnerabilities_merges_projects() {
        let project = |name: &str| {
            format!(
                r#"{{ "path": "/src/{name}/{name}.csproj", "frameworks": [{{
                    "framework": "net8.0",
                    "topLevelPackages": [{{
                        "id": "Newtonsoft.Json", "resolvedVersion": "12.0.1",
                        "vulnerabilities": [{{ "severity": "High", "advisoryurl": "https://github.com/advisories/GHSA-5crp-9r3c-p9vr" }}]
                    }}],
                    "transitivePackages": [
                        {{ "id": "System.Net.Http", "resolvedVersion": "4.3.0",
                           "vulnerabilities": [{{ "severity": "Moderate", "advisoryurl": "https://github.com/advisories/GHSA-7jgj-8wvc-jh57" }}] }},
                        {{ "id": "System.Memory", "resolvedVersion": "4.5.5" }}
                    ]
                }}] }}"#
            )
        };
        let json = format!(r#"{{ "projects": [{}, {}] }}"#, project("Api"), project("Web"));

        let found = collect_vulnerabilities(&report(&json));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].package_id, "Newtonsoft.Json");
        assert!(!found[0].is_transitive);
        assert_eq!(found[0].projects, vec!["Api", "Web"]);
        assert_eq!(found[1].package_id, "System.Net.Http");
        assert!(found[1].is_transitive);
        assert_eq!(found[1].vulnerabilities[0].severity, "Moderate");
    }
}
