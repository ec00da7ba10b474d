//! Structured conflict data recovered from restore diagnostics.
//!
//! NU1608 ("package version outside of dependency constraint") is the only
//! code that carries an exact-pin violation. Its wording belongs to the
//! toolchain and may change between SDK versions; lines that do not match the
//! known shape yield no data rather than an error.

use super::reconcile::cap_list;
use crate::model::{project_name_from_path, RestoreWarning, TransitiveConflict};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Diagnostic code for a dependency constraint violation.
pub const CONSTRAINT_VIOLATION_CODE: &str = "NU1608";

static CONSTRAINT_VIOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\S+)\s+\S+\s+requires\s+(\S+)\s+\(([^)]*)\)\s+but\s+version\s+\S+\s+(\S+?)\.?\s+was\s+resolved",
    )
    .expect("valid NU1608 regex")
});

/// One constraint violation parsed out of a NU1608 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    /// Package whose dependency declaration was violated.
    pub constrainer: String,
    pub package_id: String,
    /// Version the constrainer asks for.
    pub required_version: String,
    /// Version restore actually picked.
    pub resolved_version: String,
}

/// Parses `"<constrainer> <v> requires <pkg> (= <req>) but version <pkg> <resolved> was resolved"`.
pub fn parse_violation(message: &str) -> Option<ConstraintViolation> {
    let caps = CONSTRAINT_VIOLATION.captures(message)?;
    let required = caps[3].trim().trim_start_matches('=').trim();

    Some(ConstraintViolation {
        constrainer: caps[1].to_string(),
        package_id: caps[2].to_string(),
        required_version: required.to_string(),
        resolved_version: caps[4].to_string(),
    })
}

/// Builds conflicts from restore warnings, one record per package id.
///
/// Constrainer names and projects are unioned across warnings; the constrainer
/// list is capped once all warnings are merged.
pub fn conflicts_from_warnings(
    warnings: &[RestoreWarning],
    cap: usize,
    keep: usize,
) -> Vec<TransitiveConflict> {
    let mut conflicts: Vec<TransitiveConflict> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for warning in warnings {
        if !warning.code.eq_ignore_ascii_case(CONSTRAINT_VIOLATION_CODE) {
            continue;
        }
        let Some(violation) = parse_violation(&warning.message) else {
            continue;
        };

        let project = project_name_from_path(&warning.project_path);
        let key = violation.package_id.to_lowercase();

        if let Some(&i) = index.get(&key) {
            let existing = &mut conflicts[i];
            if !existing.transitive_parents.contains(&violation.constrainer) {
                existing.transitive_parents.push(violation.constrainer);
            }
            if !existing.projects.contains(&project) {
                existing.projects.push(project);
            }
            continue;
        }

        index.insert(key, conflicts.len());
        conflicts.push(TransitiveConflict {
            package_id: violation.package_id,
            central_version: violation.resolved_version,
            transitive_version: violation.required_version,
            transitive_parents: vec![violation.constrainer],
            projects: vec![project],
            framework: None,
        });
    }

    for conflict in &mut conflicts {
        cap_list(&mut conflict.transitive_parents, cap, keep);
    }

    conflicts
}
