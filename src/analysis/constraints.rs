//! Transitive version constraints discovered in per-project lock graphs.

use super::reconcile::cap_list;
use super::report::central_index;
use super::version::parse_version_range;
use crate::model::{Package, ProjectInfo, TransitiveConstraint};
use crate::traits::{LockFileError, LockFileReader};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

// ============================================================================
// Lock graph
// ============================================================================

/// Resolved dependency graph of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockGraph {
    pub nodes: Vec<LockNode>,
}

/// A resolved package (id + version) and its outgoing dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockNode {
    pub id: String,
    pub version: String,
    pub dependencies: Vec<DependencyEdge>,
}

/// A dependency declared by a node, with the version range it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub id: String,
    pub range: String,
}

#[derive(Debug, Deserialize)]
struct AssetsFile {
    #[serde(default)]
    targets: BTreeMap<String, BTreeMap<String, AssetsTarget>>,
}

#[derive(Debug, Deserialize)]
struct AssetsTarget {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

impl LockGraph {
    /// Reads the `targets` section of a `project.assets.json` document.
    ///
    /// Node keys have the form `"Name/Version"`; every target framework
    /// contributes its nodes to the same graph.
    pub fn from_assets_json(content: &str) -> Result<Self, LockFileError> {
        let assets: AssetsFile = serde_json::from_str(content)?;

        let nodes = assets
            .targets
            .into_values()
            .flat_map(|target| target.into_iter())
            .map(|(key, entry)| {
                let (id, version) = key.split_once('/').unwrap_or((key.as_str(), ""));
                LockNode {
                    id: id.to_string(),
                    version: version.to_string(),
                    dependencies: entry
                        .dependencies
                        .into_iter()
                        .map(|(id, range)| DependencyEdge { id, range })
                        .collect(),
                }
            })
            .collect();

        Ok(Self { nodes })
    }
}

/// Reads `project.assets.json` (or another configured path) next to each project file.
pub struct FsLockFileReader {
    relative_path: PathBuf,
}

impl FsLockFileReader {
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
        }
    }
}

impl Default for FsLockFileReader {
    fn default() -> Self {
        Self::new("obj/project.assets.json")
    }
}

#[async_trait]
impl LockFileReader for FsLockFileReader {
    async fn read_lock_graph(&self, project: &ProjectInfo) -> Result<LockGraph, LockFileError> {
        let dir = project
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let path = dir.join(&self.relative_path);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockFileError::NotFound(path))
            }
            Err(e) => return Err(e.into()),
        };

        LockGraph::from_assets_json(&content)
    }
}

/// Reads every project's lock graph concurrently.
///
/// Missing or unreadable lock files contribute nothing.
pub async fn collect_lock_graphs<R>(reader: &R, projects: &[ProjectInfo]) -> Vec<LockGraph>
where
    R: LockFileReader + ?Sized,
{
    let reads = projects.iter().map(|project| async move {
        match reader.read_lock_graph(project).await {
            Ok(graph) => Some(graph),
            Err(e) => {
                debug!(project = %project.name, error = %e, "Skipping lock file");
                None
            }
        }
    });

    join_all(reads).await.into_iter().flatten().collect()
}

// ============================================================================
// Constraint index
// ============================================================================

/// Strictest transitive requirement per centrally managed package.
#[derive(Debug, Clone, Default)]
pub struct ConstraintIndex {
    entries: HashMap<String, TransitiveConstraint>,
}

impl ConstraintIndex {
    /// Builds the index from scratch.
    ///
    /// Exact requirements replace minimum ones, never the reverse; otherwise
    /// the first requirement seen is kept.
    pub fn build(graphs: &[LockGraph], packages: &[Package], cap: usize, keep: usize) -> Self {
        let central = central_index(packages);
        let mut entries: HashMap<String, TransitiveConstraint> = HashMap::new();

        for graph in graphs {
            for node in &graph.nodes {
                let parent_lower = node.id.to_lowercase();

                for edge in &node.dependencies {
                    let dep_lower = edge.id.to_lowercase();
                    if dep_lower == parent_lower {
                        continue;
                    }
                    let Some(declared) = central.get(&dep_lower) else {
                        continue;
                    };
                    let Some(requirement) = parse_version_range(&edge.range) else {
                        continue;
                    };

                    match entries.entry(dep_lower) {
                        Entry::Occupied(mut occupied) => {
                            let existing = occupied.get_mut();
                            if !existing.required_by.contains(&node.id) {
                                existing.required_by.push(node.id.clone());
                            }
                            if requirement.is_exact && !existing.is_exact {
                                existing.required_version = requirement.version;
                                existing.version_range = edge.range.trim().to_string();
                                existing.is_exact = true;
                            }
                        }
                        Entry::Vacant(vacant) => {
                            vacant.insert(TransitiveConstraint {
                                package_id: declared.name.clone(),
                                required_version: requirement.version,
                                version_range: edge.range.trim().to_string(),
                                is_exact: requirement.is_exact,
                                required_by: vec![node.id.clone()],
                            });
                        }
                    }
                }
            }
        }

        for constraint in entries.values_mut() {
            cap_list(&mut constraint.required_by, cap, keep);
        }

        Self { entries }
    }

    pub fn get(&self, package: &str) -> Option<&TransitiveConstraint> {
        self.entries.get(&package.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransitiveConstraint> {
        self.entries.values()
    }
}
