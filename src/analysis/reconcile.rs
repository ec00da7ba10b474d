//! Merging conflict sources and incremental per-project results.

use crate::model::{TransitiveConflict, VulnerablePackageInfo};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Truncates `list` to `keep` entries plus an `"and N more"` sentinel once it
/// grows past `cap`.
pub fn cap_list(list: &mut Vec<String>, cap: usize, keep: usize) {
    if list.len() <= cap {
        return;
    }
    let keep = keep.min(cap);
    let hidden = list.len() - keep;
    list.truncate(keep);
    list.push(format!("and {hidden} more"));
}

/// Merges warning-derived conflicts (`primary`) with report-derived ones.
///
/// Secondary entries are kept only for package ids absent from `primary`,
/// compared case-insensitively, and appended after it in their own order.
pub fn merge_conflicts(
    primary: Vec<TransitiveConflict>,
    secondary: Vec<TransitiveConflict>,
) -> Vec<TransitiveConflict> {
    let known: HashSet<String> = primary
        .iter()
        .map(|c| c.package_id.to_lowercase())
        .collect();

    let mut merged = primary;
    merged.extend(
        secondary
            .into_iter()
            .filter(|c| !known.contains(&c.package_id.to_lowercase())),
    );
    merged
}

/// A record attributed to a list of projects, mergeable by identity key.
pub trait ProjectScoped {
    type Key: Eq + Hash;

    fn merge_key(&self) -> Self::Key;

    fn projects_mut(&mut self) -> &mut Vec<String>;
}

impl ProjectScoped for TransitiveConflict {
    type Key = (String, Option<String>);

    fn merge_key(&self) -> Self::Key {
        (self.package_id.to_lowercase(), self.framework.clone())
    }

    fn projects_mut(&mut self) -> &mut Vec<String> {
        &mut self.projects
    }
}

impl ProjectScoped for VulnerablePackageInfo {
    type Key = (String, String);

    fn merge_key(&self) -> Self::Key {
        (self.package_id.to_lowercase(), self.resolved_version.clone())
    }

    fn projects_mut(&mut self) -> &mut Vec<String> {
        &mut self.projects
    }
}

/// Replaces the attribution of `affected` projects in `existing` with `fresh`.
///
/// Affected project names are stripped from every existing record and records
/// left without projects are dropped. Fresh records then join a surviving
/// record with the same key, or are appended as-is.
pub fn merge_project_results<T: ProjectScoped>(
    existing: Vec<T>,
    fresh: Vec<T>,
    affected: &[String],
) -> Vec<T> {
    let affected: HashSet<&str> = affected.iter().map(String::as_str).collect();

    let mut merged: Vec<T> = existing
        .into_iter()
        .filter_map(|mut record| {
            let projects = record.projects_mut();
            projects.retain(|p| !affected.contains(p.as_str()));
            (!projects.is_empty()).then_some(record)
        })
        .collect();

    let mut index: HashMap<T::Key, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, record)| (record.merge_key(), i))
        .collect();

    for mut record in fresh {
        let key = record.merge_key();
        match index.get(&key).copied() {
            Some(i) => {
                let target = merged[i].projects_mut();
                for project in std::mem::take(record.projects_mut()) {
                    if !target.contains(&project) {
                        target.push(project);
                    }
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }

    merged
}
