//! Dependency Resolver: turns `LAYERDEPENDS` / `LAYERRECOMMENDS` into edges.

use crate::error::{ErrorKind, Result};
use crate::vercmp::{CompareOp, vercmp};
use exn::ResultExt;
use layersync_extract::models::LayerConf;
use layersync_index::Snapshot;
use layersync_index::models::{DependencyCandidate, LayerBranch};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// A version requirement attached to a dependency, e.g. `(>= 3)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: CompareOp,
    pub version: String,
}
impl VersionConstraint {
    /// Parse `"<op> <version>"`.
    pub fn parse(constraint: &str) -> Result<Self> {
        let mut words = constraint.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some(op), Some(version), None) => match CompareOp::parse(op) {
                Some(op) => Ok(Self { op, version: version.to_string() }),
                None => exn::bail!(ErrorKind::InvalidDependency(format!("unsupported operator {op:?}"))),
            },
            _ => exn::bail!(ErrorKind::InvalidDependency(format!("malformed constraint {constraint:?}"))),
        }
    }

    pub fn accepts(&self, version: &str) -> bool {
        self.op.holds(vercmp(version, &self.version))
    }
}

/// Split a dependency list such as `core (>= 12) openembedded-layer` into
/// names and their raw `"<op> <version>"` constraints, sorted by name.
pub fn explode_dep_versions(value: &str) -> Result<BTreeMap<String, Vec<String>>> {
    const TWO_CHAR_OPS: [&str; 8] = ["<=", "=<", "<<", "==", "!=", ">=", "=>", ">>"];
    let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut last_dep: Option<String> = None;
    let (mut last_op, mut last_version) = (String::new(), String::new());
    let (mut in_compare, mut in_version) = (false, false);

    for word in value.replace(',', "").split_whitespace() {
        let mut word = word;
        if let Some(rest) = word.strip_prefix('(') {
            in_compare = true;
            word = rest.trim();
            if word.is_empty() {
                continue;
            }
        }
        if in_compare {
            in_compare = false;
            in_version = true;
            let op_len = if TWO_CHAR_OPS.iter().any(|op| word.starts_with(op)) {
                2
            } else if word.starts_with(['<', '>', '=']) {
                1
            } else {
                exn::bail!(ErrorKind::InvalidDependency(format!("invalid or missing operator in \"({word}\"")));
            };
            last_op = word[..op_len].to_string();
            word = &word[op_len..];
            if word.is_empty() {
                continue;
            }
        }
        if in_version {
            if let Some(rest) = word.strip_suffix(')') {
                word = rest;
                in_version = false;
                if !last_version.is_empty() && !word.is_empty() {
                    last_version.push(' ');
                }
            }
            if !word.is_empty() {
                last_version.push_str(word);
                let Some(dep) = &last_dep else {
                    exn::bail!(ErrorKind::InvalidDependency(format!("version without a name in {value:?}")));
                };
                deps.entry(dep.clone()).or_default().push(format!("{last_op} {last_version}"));
            }
            continue;
        }
        last_dep = Some(word.to_string());
        last_op.clear();
        last_version.clear();
        deps.entry(word.to_string()).or_default();
    }
    Ok(deps)
}

/// Refresh the collection name and version declared by the layer configuration.
pub fn refresh_collection(layerbranch: &mut LayerBranch, conf: &LayerConf) {
    layerbranch.collection = conf.collection().unwrap_or_default().to_string();
    if conf.collection().is_some() {
        layerbranch.version = conf.version().unwrap_or_default().to_string();
    }
}

/// Counts of dependency edges handled for one layer branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyStats {
    pub added: usize,
    pub existing: usize,
    pub unresolved: usize,
}

/// Add missing dependency edges for `layerbranch`. Existing edges are kept.
pub async fn resolve_dependencies(
    snapshot: &mut Snapshot,
    layerbranch: &LayerBranch,
    layer_name: &str,
    conf: &LayerConf,
) -> Result<DependencyStats> {
    let key = if layerbranch.collection.is_empty() { layer_name } else { layerbranch.collection.as_str() };
    let mut stats = DependencyStats::default();
    for (variable, required) in [("LAYERDEPENDS", true), ("LAYERRECOMMENDS", false)] {
        let variable = format!("{variable}_{key}");
        let Some(value) = conf.get(&variable) else { continue };
        let deps = match explode_dep_versions(value) {
            Ok(deps) => deps,
            Err(err) => {
                debug!(layer = layer_name, variable = %variable, error = ?err, "unable to parse dependency list");
                continue;
            },
        };
        for (name, constraints) in deps {
            let constraint = match constraints.first().map(|c| VersionConstraint::parse(c)).transpose() {
                Ok(constraint) => constraint,
                Err(err) => {
                    error!(layer = layer_name, dependency = %name, error = ?err, "invalid dependency version");
                    continue;
                },
            };
            let candidates = snapshot
                .dependency_candidates(layerbranch.branch_id, &name)
                .await
                .or_raise(|| ErrorKind::Storage)?;
            let Some(found) = pick_candidate(candidates, constraint.as_ref()) else {
                error!(
                    layer = layer_name,
                    dependency = %name,
                    constraint = ?constraints.first(),
                    required,
                    "cannot resolve layer dependency"
                );
                stats.unresolved += 1;
                continue;
            };
            if snapshot.has_dependency(layerbranch.id, found.layer_id).await.or_raise(|| ErrorKind::Storage)? {
                debug!(layer = layer_name, dependency = %found.layer_name, "already a dependency");
                stats.existing += 1;
                continue;
            }
            debug!(layer = layer_name, dependency = %found.layer_name, required, "adding layer dependency");
            snapshot
                .add_dependency(layerbranch.id, found.layer_id, required)
                .await
                .or_raise(|| ErrorKind::Storage)?;
            stats.added += 1;
        }
    }
    Ok(stats)
}

/// The first candidate satisfying the constraint. Candidates without a
/// declared version never satisfy one.
fn pick_candidate(
    candidates: Vec<DependencyCandidate>,
    constraint: Option<&VersionConstraint>,
) -> Option<DependencyCandidate> {
    candidates.into_iter().find(|candidate| match constraint {
        None => true,
        Some(constraint) => !candidate.version.is_empty() && constraint.accepts(&candidate.version),
    })
}
