//! Analysis orchestrator.
//!
//! This module provides the [`AnalysisService`] coordinator that owns the cached
//! [`AnalysisResult`] and the transitive constraint index:
//! - Full and per-project analysis passes via `tokio`
//! - A three-state lifecycle (`Idle` → `Running` → `Ready`) guarding the cache
//! - Structured logging via `tracing`
//! - Push notifications of every state change via a `watch` channel

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::constraints::{collect_lock_graphs, ConstraintIndex, FsLockFileReader};
use super::reconcile::{merge_conflicts, merge_project_results};
use super::report::{collect_vulnerabilities, detect_conflicts};
use super::warnings::conflicts_from_warnings;
use crate::config::AnalysisConfig;
use crate::executor::DotnetExecutor;
use crate::model::{
    project_name_from_path, AnalysisResult, Package, TransitiveConflict, TransitiveConstraint,
    VersionOverride, VulnerablePackageInfo,
};
use crate::traits::{DependencyResolver, LockFileReader, ManifestSource, ResolverError};

// ============================================================================
// Errors
// ============================================================================

/// Causes surfaced in [`AnalysisResult::error`].
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// The manifest has no workspace root to run the resolver in
    #[error("No workspace root available")]
    NoWorkspace,

    /// The resolver executable could not be found or started
    #[error("dotnet CLI is not available")]
    ResolverUnavailable,

    /// A resolver invocation failed
    #[error("Conflict analysis failed: {0}")]
    Resolver(#[from] ResolverError),
}

impl AnalysisError {
    /// Output the resolver could not produce in a parseable shape is not
    /// reported; older SDKs emit plain text for some flags.
    fn from_resolver(error: ResolverError) -> Option<Self> {
        match error {
            ResolverError::NoParseableOutput => {
                debug!("Suppressing unparseable resolver output");
                None
            }
            ResolverError::Unavailable(_) => Some(Self::ResolverUnavailable),
            other => Some(Self::Resolver(other)),
        }
    }
}

fn join_errors(errors: &[AnalysisError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle of the cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    /// No result yet, or the cache was cleared
    Idle,

    /// A pass is in flight
    Running,

    /// A result is available, possibly carrying an error
    Ready,
}

struct ServiceState {
    phase: AnalysisPhase,
    result: AnalysisResult,
    /// When the last full pass finished; drives the cache TTL.
    full_run_at: Option<Instant>,
}

impl ServiceState {
    fn idle() -> Self {
        Self {
            phase: AnalysisPhase::Idle,
            result: AnalysisResult::default(),
            full_run_at: None,
        }
    }
}

/// What one conflict analysis produced, before it is committed.
#[derive(Default)]
struct ConflictOutcome {
    conflicts: Vec<TransitiveConflict>,
    errors: Vec<AnalysisError>,
}

// ============================================================================
// Service
// ============================================================================

/// Coordinates analysis passes and answers per-package queries.
///
/// Only one pass runs at a time. Triggering a pass while another is in flight
/// returns the current snapshot instead of queuing. Work done by a pass becomes
/// visible only when the pass commits.
///
/// # Example
///
/// ```ignore
/// use cpm_analyzer::{AnalysisConfig, AnalysisService, CentralManifest};
///
/// #[tokio::main]
/// async fn main() {
///     let service = AnalysisService::dotnet(manifest, AnalysisConfig::default());
///     let result = service.run_full(false).await;
///     for conflict in service.conflicts_for_package("Humanizer.Core").await {
///         println!("{} pinned by {:?}", conflict.package_id, conflict.transitive_parents);
///     }
/// }
/// ```
pub struct AnalysisService<M, R, L>
where
    M: ManifestSource,
    R: DependencyResolver,
    L: LockFileReader,
{
    manifest: M,
    resolver: R,
    lock_reader: L,
    config: AnalysisConfig,
    state: Mutex<ServiceState>,
    constraints: RwLock<ConstraintIndex>,
    updates: watch::Sender<AnalysisResult>,
}

impl<M> AnalysisService<M, DotnetExecutor, FsLockFileReader>
where
    M: ManifestSource,
{
    /// Creates a service backed by the `dotnet` CLI and on-disk lock files.
    pub fn dotnet(manifest: M, config: AnalysisConfig) -> Self {
        let resolver = DotnetExecutor::from_config(&config);
        let lock_reader = FsLockFileReader::new(config.lock_file_path.clone());
        Self::new(manifest, resolver, lock_reader).with_config(config)
    }
}

impl<M, R, L> AnalysisService<M, R, L>
where
    M: ManifestSource,
    R: DependencyResolver,
    L: LockFileReader,
{
    /// Creates a service in the `Idle` state with the default configuration.
    pub fn new(manifest: M, resolver: R, lock_reader: L) -> Self {
        let (updates, _) = watch::channel(AnalysisResult::default());
        Self {
            manifest,
            resolver,
            lock_reader,
            config: AnalysisConfig::default(),
            state: Mutex::new(ServiceState::idle()),
            constraints: RwLock::new(ConstraintIndex::default()),
            updates,
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Receives the result after every state change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisResult> {
        self.updates.subscribe()
    }

    fn publish(&self, result: &AnalysisResult) {
        self.updates.send_replace(result.clone());
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    /// Analyzes the whole workspace.
    ///
    /// Without `force`, a result younger than the cache TTL is returned as-is.
    /// While another pass runs, its current snapshot is returned.
    #[instrument(skip(self))]
    pub async fn run_full(&self, force: bool) -> AnalysisResult {
        {
            let mut state = self.state.lock().await;
            if state.phase == AnalysisPhase::Running {
                debug!("Analysis already running");
                return state.result.clone();
            }
            if !force && state.phase == AnalysisPhase::Ready {
                if let Some(at) = state.full_run_at {
                    if at.elapsed() < self.config.cache_ttl() {
                        debug!("Using cached analysis result");
                        return state.result.clone();
                    }
                }
            }
            state.phase = AnalysisPhase::Running;
            state.result.is_running = true;
            self.publish(&state.result);
        }

        info!("Starting full analysis");
        let start = Instant::now();
        let packages = self.manifest.get_all_packages();

        let (conflicts, vulnerabilities) = match self.resolver_root().await {
            Ok(root) => {
                let target = self.manifest.get_solution_path();
                tokio::join!(
                    self.analyze_conflicts(&root, target.as_deref(), &packages),
                    self.scan_vulnerabilities(&root, target.as_deref()),
                )
            }
            Err(e) => (
                ConflictOutcome {
                    conflicts: Vec::new(),
                    errors: vec![e],
                },
                Vec::new(),
            ),
        };

        let index = self.build_constraints(&packages).await;

        let mut state = self.state.lock().await;
        *self.constraints.write().await = index;
        state.result = AnalysisResult {
            transitive_conflicts: conflicts.conflicts,
            vulnerable_packages: vulnerabilities,
            last_updated: Some(Utc::now()),
            is_running: false,
            error: join_errors(&conflicts.errors),
        };
        state.phase = AnalysisPhase::Ready;
        state.full_run_at = Some(Instant::now());
        self.publish(&state.result);

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            conflicts = state.result.transitive_conflicts.len(),
            vulnerabilities = state.result.vulnerable_packages.len(),
            failed = state.result.error.is_some(),
            "Full analysis completed"
        );
        state.result.clone()
    }

    /// Re-analyzes only the given project files and merges the outcome into
    /// the cached result.
    ///
    /// Vulnerabilities are not rescanned; they refresh on the next full pass.
    /// Without a prior full pass this runs a forced full pass instead.
    #[instrument(skip(self, affected), fields(projects = affected.len()))]
    pub async fn run_incremental(&self, affected: &[PathBuf]) -> AnalysisResult {
        {
            let mut state = self.state.lock().await;
            if state.phase == AnalysisPhase::Running {
                debug!("Analysis already running");
                return state.result.clone();
            }
            if state.full_run_at.is_none() {
                drop(state);
                return self.run_full(true).await;
            }
            state.phase = AnalysisPhase::Running;
            state.result.is_running = true;
            self.publish(&state.result);
        }

        info!("Starting incremental analysis");
        let start = Instant::now();
        let packages = self.manifest.get_all_packages();
        let affected_names: Vec<String> = affected
            .iter()
            .map(|path| project_name_from_path(path))
            .collect();

        let mut fresh = ConflictOutcome::default();
        match self.resolver_root().await {
            Ok(root) => {
                for project in affected {
                    let outcome = self
                        .analyze_conflicts(&root, Some(project.as_path()), &packages)
                        .await;
                    fresh.conflicts.extend(outcome.conflicts);
                    fresh.errors.extend(outcome.errors);
                }
            }
            Err(e) => fresh.errors.push(e),
        }

        let index = self.build_constraints(&packages).await;

        let mut state = self.state.lock().await;
        *self.constraints.write().await = index;
        let existing = std::mem::take(&mut state.result.transitive_conflicts);
        state.result.transitive_conflicts = if fresh.errors.is_empty() {
            merge_project_results(existing, fresh.conflicts, &affected_names)
        } else {
            // keep the previous attribution when the affected projects could not be analyzed
            existing
        };
        state.result.last_updated = Some(Utc::now());
        state.result.is_running = false;
        state.result.error = join_errors(&fresh.errors);
        state.phase = AnalysisPhase::Ready;
        self.publish(&state.result);

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            conflicts = state.result.transitive_conflicts.len(),
            "Incremental analysis completed"
        );
        state.result.clone()
    }

    /// Resets the cached result and the constraint index to the `Idle` state.
    pub async fn clear_cache(&self) {
        let mut state = self.state.lock().await;
        *state = ServiceState::idle();
        *self.constraints.write().await = ConstraintIndex::default();
        self.publish(&state.result);
        info!("Analysis cache cleared");
    }

    async fn resolver_root(&self) -> Result<PathBuf, AnalysisError> {
        let root = self
            .manifest
            .get_workspace_root()
            .ok_or(AnalysisError::NoWorkspace)?;
        if !self.resolver.is_available().await {
            warn!("dotnet CLI not found");
            return Err(AnalysisError::ResolverUnavailable);
        }
        Ok(root)
    }

    /// Restore warnings first (they are authoritative for exact pins), then
    /// the resolved report for conflicts above central versions.
    async fn analyze_conflicts(
        &self,
        root: &Path,
        target: Option<&Path>,
        packages: &[Package],
    ) -> ConflictOutcome {
        let mut errors = Vec::new();

        let warning_conflicts = match self.resolver.restore_and_get_warnings(root, target).await {
            Ok(warnings) => {
                conflicts_from_warnings(&warnings, self.config.list_cap, self.config.list_keep)
            }
            Err(e) => {
                warn!(error = %e, "Restore failed");
                errors.extend(AnalysisError::from_resolver(e));
                Vec::new()
            }
        };

        let report_conflicts = match self.resolver.list_transitive_packages(root, target).await {
            Ok(report) => detect_conflicts(&report, packages, self.config.max_parent_names),
            Err(e) => {
                warn!(error = %e, "Listing transitive packages failed");
                errors.extend(AnalysisError::from_resolver(e));
                Vec::new()
            }
        };

        ConflictOutcome {
            conflicts: merge_conflicts(warning_conflicts, report_conflicts),
            errors,
        }
    }

    /// Failures here never reach the surfaced error; some SDKs cannot scan.
    async fn scan_vulnerabilities(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Vec<VulnerablePackageInfo> {
        match self.resolver.list_vulnerable_packages(root, target).await {
            Ok(report) => collect_vulnerabilities(&report),
            Err(e) => {
                warn!(error = %e, "Vulnerability scan failed, assuming none");
                Vec::new()
            }
        }
    }

    async fn build_constraints(&self, packages: &[Package]) -> ConstraintIndex {
        let projects = self.manifest.get_all_projects();
        let graphs = collect_lock_graphs(&self.lock_reader, &projects).await;
        let index = ConstraintIndex::build(
            &graphs,
            packages,
            self.config.list_cap,
            self.config.list_keep,
        );
        debug!(
            lock_files = graphs.len(),
            constraints = index.len(),
            "Constraint index rebuilt"
        );
        index
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn phase(&self) -> AnalysisPhase {
        self.state.lock().await.phase
    }

    pub async fn result(&self) -> AnalysisResult {
        self.state.lock().await.result.clone()
    }

    pub async fn conflicts_for_package(&self, name: &str) -> Vec<TransitiveConflict> {
        let state = self.state.lock().await;
        state
            .result
            .transitive_conflicts
            .iter()
            .filter(|c| c.package_id.eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }

    pub async fn vulnerabilities_for_package(&self, name: &str) -> Vec<VulnerablePackageInfo> {
        let state = self.state.lock().await;
        state
            .result
            .vulnerable_packages
            .iter()
            .filter(|v| v.package_id.eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }

    pub async fn constraint_for_package(&self, name: &str) -> Option<TransitiveConstraint> {
        self.constraints.read().await.get(name).cloned()
    }

    /// Local `Version` attributes in projects, which bypass central management.
    pub fn version_overrides(&self) -> Vec<VersionOverride> {
        let packages = self.manifest.get_all_packages();
        let mut overrides: Vec<VersionOverride> = self
            .manifest
            .get_all_projects()
            .into_iter()
            .flat_map(|project| {
                let packages = &packages;
                project
                    .versioned_overrides
                    .into_iter()
                    .map(move |(package_id, local_version)| {
                        let central_version = packages
                            .iter()
                            .find(|p| p.name.eq_ignore_ascii_case(&package_id))
                            .map(|p| p.version.clone());
                        VersionOverride {
                            project: project.name.clone(),
                            package_id,
                            local_version,
                            central_version,
                        }
                    })
            })
            .collect();

        overrides.sort_by(|a, b| {
            (a.project.as_str(), a.package_id.as_str())
                .cmp(&(b.project.as_str(), b.package_id.as_str()))
        });
        overrides
    }
}
