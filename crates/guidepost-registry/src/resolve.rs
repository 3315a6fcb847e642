//! Dependency graph resolution.
//!
//! Builds a directed graph from module dependency declarations, detects
//! cycles with a depth-first walk over an explicit recursion stack, and
//! checks version ranges against the versions actually discovered. Cycles
//! poison only their member nodes; conflicting range requirements on a
//! shared dependency are reported as warnings, not failures.

use crate::types::Module;
use guidepost_common_core::ModuleId;
use guidepost_version::{Version, VersionRange};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Resolution outcome for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    /// Every dependency resolved within its declared range.
    Resolved,
    /// At least one dependency problem; the module keeps all its reasons.
    Unresolved {
        /// Why the module did not resolve.
        reasons: Vec<String>,
    },
}

impl ResolutionStatus {
    /// Is this the resolved state?
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

/// Two or more dependents whose ranges on one dependency disagree about
/// the discovered version.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    /// The contested dependency.
    pub dependency: ModuleId,
    /// The version discovery actually found.
    pub discovered: Version,
    /// Every dependent and its declared range, in id order.
    pub requirements: Vec<(ModuleId, VersionRange)>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflicting requirements on {}@{}: ",
            self.dependency, self.discovered
        )?;
        for (i, (dependent, range)) in self.requirements.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dependent} requires {range}")?;
        }
        Ok(())
    }
}

/// Full output of a resolution pass.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    statuses: BTreeMap<ModuleId, ResolutionStatus>,
    /// Detected cycles, each as the full chain with the entry node
    /// repeated at the end (`a, b, c, a`).
    pub cycles: Vec<Vec<ModuleId>>,
    /// Range disagreements that did not block resolution.
    pub conflicts: Vec<VersionConflict>,
}

impl ResolutionReport {
    /// Status for a module id, if it was part of the pass.
    pub fn status(&self, id: &ModuleId) -> Option<&ResolutionStatus> {
        self.statuses.get(id)
    }

    /// Did this module resolve?
    pub fn is_resolved(&self, id: &ModuleId) -> bool {
        matches!(self.statuses.get(id), Some(ResolutionStatus::Resolved))
    }

    /// All statuses in id order.
    pub fn statuses(&self) -> impl Iterator<Item = (&ModuleId, &ResolutionStatus)> {
        self.statuses.iter()
    }

    /// Unresolved modules with their reasons, in id order.
    pub fn unresolved(&self) -> impl Iterator<Item = (&ModuleId, &[String])> {
        self.statuses.iter().filter_map(|(id, status)| match status {
            ResolutionStatus::Unresolved { reasons } => Some((id, reasons.as_slice())),
            ResolutionStatus::Resolved => None,
        })
    }

    /// Render a cycle chain as `a → b → c → a`.
    pub fn chain_display(cycle: &[ModuleId]) -> String {
        cycle
            .iter()
            .map(ModuleId::to_string)
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Resolve the dependency graph of a discovered module set.
pub fn resolve_dependencies(modules: &[Module]) -> ResolutionReport {
    let index: BTreeMap<&ModuleId, &Module> = modules.iter().map(|m| (&m.id, m)).collect();

    let cycles = find_cycles(modules, &index);
    let cycle_members: BTreeSet<&ModuleId> = cycles.iter().flatten().collect();

    let mut report = ResolutionReport {
        cycles: cycles.clone(),
        ..Default::default()
    };

    for module in modules {
        let mut reasons = Vec::new();

        if cycle_members.contains(&module.id) {
            // Name the full chain so the report is actionable.
            if let Some(cycle) = cycles.iter().find(|c| c.contains(&module.id)) {
                reasons.push(format!(
                    "member of dependency cycle: {}",
                    ResolutionReport::chain_display(cycle)
                ));
            }
        }

        for dep in &module.dependencies {
            match index.get(&dep.module) {
                None => reasons.push(format!("depends on unknown module: {}", dep.module)),
                Some(target) if !dep.range.satisfies(&target.version) => {
                    reasons.push(format!(
                        "requires {}@{} but discovered version is {}",
                        dep.module, dep.range, target.version
                    ));
                }
                Some(_) => {}
            }
        }

        let status = if reasons.is_empty() {
            ResolutionStatus::Resolved
        } else {
            ResolutionStatus::Unresolved { reasons }
        };
        report.statuses.insert(module.id.clone(), status);
    }

    report.conflicts = find_conflicts(modules, &index);
    debug!(
        modules = modules.len(),
        cycles = report.cycles.len(),
        conflicts = report.conflicts.len(),
        "dependency resolution complete"
    );
    report
}

/// Depth-first cycle search with an explicit recursion stack.
fn find_cycles(modules: &[Module], index: &BTreeMap<&ModuleId, &Module>) -> Vec<Vec<ModuleId>> {
    let mut visited: BTreeSet<&ModuleId> = BTreeSet::new();
    let mut stack: Vec<&ModuleId> = Vec::new();
    let mut cycles: Vec<Vec<ModuleId>> = Vec::new();

    for module in modules {
        if !visited.contains(&module.id) {
            visit(&module.id, index, &mut visited, &mut stack, &mut cycles);
        }
    }

    // One back edge yields one cycle; dedupe by member set in case two
    // entry points reach the same loop.
    let mut seen: BTreeSet<BTreeSet<ModuleId>> = BTreeSet::new();
    cycles.retain(|chain| seen.insert(chain.iter().cloned().collect()));
    cycles
}

fn visit<'a>(
    id: &'a ModuleId,
    index: &BTreeMap<&ModuleId, &'a Module>,
    visited: &mut BTreeSet<&'a ModuleId>,
    stack: &mut Vec<&'a ModuleId>,
    cycles: &mut Vec<Vec<ModuleId>>,
) {
    visited.insert(id);
    stack.push(id);

    if let Some(module) = index.get(id) {
        for dep in &module.dependencies {
            let Some(target) = index.get(&dep.module) else {
                continue; // unknown targets are reported elsewhere
            };
            let target_id = &target.id;
            if let Some(pos) = stack.iter().position(|s| *s == target_id) {
                let mut chain: Vec<ModuleId> = stack[pos..].iter().map(|s| (*s).clone()).collect();
                chain.push(target_id.clone());
                cycles.push(chain);
            } else if !visited.contains(target_id) {
                visit(target_id, index, visited, stack, cycles);
            }
        }
    }

    stack.pop();
}

/// Group declared ranges per dependency; when the discovered version
/// satisfies some dependents but not others, that is a conflict.
fn find_conflicts(
    modules: &[Module],
    index: &BTreeMap<&ModuleId, &Module>,
) -> Vec<VersionConflict> {
    let mut requirements: BTreeMap<&ModuleId, Vec<(ModuleId, VersionRange)>> = BTreeMap::new();
    for module in modules {
        for dep in &module.dependencies {
            if dep.range.is_any() || !index.contains_key(&dep.module) {
                continue;
            }
            requirements
                .entry(&dep.module)
                .or_default()
                .push((module.id.clone(), dep.range.clone()));
        }
    }

    let mut conflicts = Vec::new();
    for (dependency, mut reqs) in requirements {
        let Some(target) = index.get(dependency) else {
            continue;
        };
        let satisfied = reqs
            .iter()
            .filter(|(_, range)| range.satisfies(&target.version))
            .count();
        if satisfied > 0 && satisfied < reqs.len() {
            reqs.sort_by(|a, b| a.0.cmp(&b.0));
            conflicts.push(VersionConflict {
                dependency: (*dependency).clone(),
                discovered: target.version.clone(),
                requirements: reqs,
            });
        }
    }
    conflicts
}
