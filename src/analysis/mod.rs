//! Analysis module - dependency conflict and constraint analysis for CPM workspaces.
//!
//! This module provides the core of the analyzer:
//! - **Versions**: ordering and interval ranges via [`version`]
//! - **Parsers**: resolver reports ([`report`]) and restore diagnostics ([`warnings`])
//! - **Reconciliation**: merging conflict sources and per-project results via [`reconcile`]
//! - **Constraints**: transitive requirements from lock graphs via [`constraints`]
//! - **Advisories**: the vulnerability database via [`advisory`]
//! - **Orchestration**: cached full and incremental passes via [`pipeline::AnalysisService`]

pub mod advisory;
pub mod constraints;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod version;
pub mod warnings;

// Re-export commonly used types
pub use advisory::{AdvisoryDatabase, NugetAdvisoryFeed};
pub use constraints::{ConstraintIndex, DependencyEdge, FsLockFileReader, LockGraph, LockNode};
pub use pipeline::{AnalysisError, AnalysisPhase, AnalysisService};
pub use reconcile::{cap_list, merge_conflicts, merge_project_results, ProjectScoped};
pub use report::{collect_vulnerabilities, detect_conflicts, parse_report};
pub use version::{compare_versions, in_range, parse_version_range, VersionRequirement};
pub use warnings::{conflicts_from_warnings, parse_violation, ConstraintViolation};
