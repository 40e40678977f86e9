//! Dependency assembly: the normalized per-manifest view, and transitive
//! closure over a registry.
//!
//! Assembly calls the metadata-accessor chain's `dependencies` operation
//! once and normalizes whatever categories that version's shape returned
//! into the canonical set — categories unknown to older schemas come back
//! empty rather than erroring.
//!
//! The closure walk is breadth-first with a visited set keyed by
//! `(name, resolved version)`. Cycle detection tracks the path each queue
//! entry took: revisiting a package already on the current path reports the
//! full cycle instead of looping. Depth is bounded so traversal terminates
//! even on pathological graphs.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::chain::PackageAccessor;
use crate::error::{AssembleError, ChainError, GraphError};
use crate::registry::RegistryService;
use crate::types::{DependencyCategory, DependencyView, Document, ValidationContext};
use crate::version::{Constraint, VersionId};

/// A resolved `(package, version)` node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageRef {
    pub name: String,
    pub version: VersionId,
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Bounds for closure traversal.
#[derive(Debug, Clone)]
pub struct ClosureOptions {
    /// Maximum path length (edges from the start) before the walk fails
    /// with `DependencyGraphTooDeep`.
    pub max_depth: usize,
}

impl Default for ClosureOptions {
    fn default() -> Self {
        ClosureOptions {
            max_depth: ValidationContext::DEFAULT_MAX_GRAPH_DEPTH,
        }
    }
}

/// Build the normalized dependency view for one manifest.
///
/// One call through the accessor chain, then normalization: every
/// canonical category present, in declaration order, empty when the
/// manifest's schema version has no such category.
///
/// # Errors
///
/// Only chain defects: a well-built chain always answers.
pub fn assemble(
    accessor: &dyn PackageAccessor,
    doc: &Document,
) -> Result<DependencyView, ChainError> {
    let raw = accessor.dependencies(doc)?;
    let mut view = DependencyView::default();
    for (category, deps) in raw {
        *view.get_mut(category) = deps;
    }
    Ok(view)
}

/// Every package reachable from `name`@`version` through platform-package
/// dependencies, in breadth-first order. The start node itself is not
/// included.
///
/// # Errors
///
/// `CircularDependency` with the full cycle path when the walk re-enters a
/// package already on its current path; `DependencyGraphTooDeep` when a
/// path exceeds `options.max_depth`; resolution errors when a dependency
/// cannot be satisfied from the registry.
pub fn transitive_closure(
    registry: &RegistryService,
    name: &str,
    version: &VersionId,
    options: &ClosureOptions,
) -> Result<Vec<PackageRef>, AssembleError> {
    let deps = registry.package_dependencies(name, version)?;
    let seeds = seeds_from(deps.get(&DependencyCategory::PlatformPackage))?;
    closure_from_seeds(registry, name, seeds, options)
}

/// Closure walk seeded from an explicit dependency list, for callers whose
/// start node is not itself published in the registry (a manifest under
/// validation). `root` labels the start node in cycle paths.
pub(crate) fn closure_from_seeds(
    registry: &RegistryService,
    root: &str,
    seeds: Vec<(String, Option<Constraint>)>,
    options: &ClosureOptions,
) -> Result<Vec<PackageRef>, AssembleError> {
    let mut queue: VecDeque<(String, Option<Constraint>, Vec<String>)> = seeds
        .into_iter()
        .map(|(name, constraint)| (name, constraint, vec![root.to_string()]))
        .collect();

    let mut visited: HashSet<PackageRef> = HashSet::new();
    let mut order: Vec<PackageRef> = Vec::new();

    while let Some((name, constraint, path)) = queue.pop_front() {
        if path.iter().any(|p| p == &name) {
            let mut cycle = path;
            cycle.push(name);
            return Err(GraphError::CircularDependency { cycle }.into());
        }
        if path.len() >= options.max_depth {
            return Err(GraphError::DependencyGraphTooDeep {
                max_depth: options.max_depth,
            }
            .into());
        }

        let resolved = match &constraint {
            Some(constraint) => registry.find_compatible_version(&name, constraint)?,
            None => registry.latest_version(&name)?,
        };
        let node = PackageRef {
            name: name.clone(),
            version: resolved,
        };
        if !visited.insert(node.clone()) {
            continue;
        }

        let deps = registry.package_dependencies(&node.name, &node.version)?;
        let children = seeds_from(deps.get(&DependencyCategory::PlatformPackage))?;

        let mut child_path = path;
        child_path.push(name);
        for (child, child_constraint) in children {
            queue.push_back((child, child_constraint, child_path.clone()));
        }

        order.push(node);
    }

    Ok(order)
}

/// Parse declared constraints for traversal. Registry metadata with a
/// malformed constraint aborts resolution — this is the installation path,
/// not the validation path.
fn seeds_from(
    deps: Option<&Vec<crate::types::Dependency>>,
) -> Result<Vec<(String, Option<Constraint>)>, AssembleError> {
    let mut seeds = Vec::new();
    for dep in deps.map(Vec::as_slice).unwrap_or_default() {
        let constraint = match dep.constraint.as_deref() {
            Some(raw) => Some(Constraint::parse(raw)?),
            None => None,
        };
        seeds.push((dep.name.clone(), constraint));
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::VersionRegistry;
    use crate::error::ResolveError;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn service(value: Value) -> RegistryService {
        let registry = VersionRegistry::builtin();
        RegistryService::new(doc(value), &registry).unwrap()
    }

    fn pkg(name: &str, versions: Value) -> Value {
        json!({"name": name, "versions": versions})
    }

    #[test]
    fn assemble_normalizes_unified_shape_unchanged() {
        let registry = VersionRegistry::builtin();
        let accessor = registry
            .accessor_chain(&VersionId::new(1, 2, 0))
            .unwrap();

        let manifest = doc(json!({
            "package_schema_version": "1.2.0",
            "dependencies": {
                "platform-package": [],
                "language-package": [{"name": "x", "constraint": ">=1.0.0"}]
            }
        }));

        let view = assemble(accessor.as_ref(), &manifest).unwrap();
        assert!(view.platform.is_empty());
        assert_eq!(view.language.len(), 1);
        assert_eq!(view.language[0].name, "x");
        // Categories the manifest omits come back empty.
        assert!(view.system.is_empty());
        assert!(view.container.is_empty());
    }

    #[test]
    fn assemble_fills_categories_legacy_shape_lacks() {
        let registry = VersionRegistry::builtin();
        let accessor = registry
            .accessor_chain(&VersionId::new(1, 1, 0))
            .unwrap();

        let manifest = doc(json!({
            "package_schema_version": "1.1.0",
            "platform_dependencies": [{"name": "base-toolkit"}],
            "language_dependencies": [{"name": "requests"}]
        }));

        let view = assemble(accessor.as_ref(), &manifest).unwrap();
        assert_eq!(view.platform[0].name, "base-toolkit");
        assert_eq!(view.language[0].name, "requests");
        assert!(view.system.is_empty());
        assert!(view.container.is_empty());
    }

    #[test]
    fn closure_collects_reachable_packages() {
        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": [
                pkg("a", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [
                        {"name": "b", "constraint": ">=1.0.0"},
                        {"name": "c"}
                    ]}
                }])),
                pkg("b", json!([
                    {"version": "1.0.0"},
                    {"version": "1.5.0", "dependencies": {"platform-package": [{"name": "d"}]}}
                ])),
                pkg("c", json!([{"version": "2.0.0"}])),
                pkg("d", json!([{"version": "0.1.0"}]))
            ]}]
        }));

        let closure = transitive_closure(
            &registry,
            "a",
            &VersionId::new(1, 0, 0),
            &ClosureOptions::default(),
        )
        .unwrap();

        let names: Vec<String> = closure.iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["b@1.5.0", "c@2.0.0", "d@0.1.0"]);
    }

    #[test]
    fn diamond_dependency_visited_once() {
        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": [
                pkg("a", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "b"}, {"name": "c"}]}
                }])),
                pkg("b", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "d"}]}
                }])),
                pkg("c", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "d"}]}
                }])),
                pkg("d", json!([{"version": "1.0.0"}]))
            ]}]
        }));

        let closure = transitive_closure(
            &registry,
            "a",
            &VersionId::new(1, 0, 0),
            &ClosureOptions::default(),
        )
        .unwrap();
        assert_eq!(
            closure.iter().filter(|r| r.name == "d").count(),
            1,
            "diamond node expanded once"
        );
    }

    #[test]
    fn two_node_cycle_reports_full_path() {
        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": [
                pkg("a", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "b"}]}
                }])),
                pkg("b", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "a"}]}
                }]))
            ]}]
        }));

        match transitive_closure(
            &registry,
            "a",
            &VersionId::new(1, 0, 0),
            &ClosureOptions::default(),
        ) {
            Err(AssembleError::Graph(GraphError::CircularDependency { cycle })) => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": [
                pkg("a", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "a"}]}
                }]))
            ]}]
        }));

        match transitive_closure(
            &registry,
            "a",
            &VersionId::new(1, 0, 0),
            &ClosureOptions::default(),
        ) {
            Err(AssembleError::Graph(GraphError::CircularDependency { cycle })) => {
                assert_eq!(cycle, vec!["a", "a"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn depth_bound_terminates_long_chains() {
        // a -> p0 -> p1 -> ... deep linear chain.
        let mut packages = vec![pkg(
            "a",
            json!([{
                "version": "1.0.0",
                "dependencies": {"platform-package": [{"name": "p0"}]}
            }]),
        )];
        for i in 0..10 {
            packages.push(pkg(
                &format!("p{i}"),
                json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": format!("p{}", i + 1)}]}
                }]),
            ));
        }
        packages.push(pkg("p10", json!([{"version": "1.0.0"}])));

        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": packages}]
        }));

        let options = ClosureOptions { max_depth: 4 };
        match transitive_closure(&registry, "a", &VersionId::new(1, 0, 0), &options) {
            Err(AssembleError::Graph(GraphError::DependencyGraphTooDeep { max_depth })) => {
                assert_eq!(max_depth, 4);
            }
            other => panic!("expected DependencyGraphTooDeep, got {other:?}"),
        }
    }

    #[test]
    fn unsatisfiable_constraint_aborts_resolution() {
        let registry = service(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [{"name": "main", "packages": [
                pkg("a", json!([{
                    "version": "1.0.0",
                    "dependencies": {"platform-package": [{"name": "b", "constraint": ">=9.0.0"}]}
                }])),
                pkg("b", json!([{"version": "1.0.0"}]))
            ]}]
        }));

        assert!(matches!(
            transitive_closure(
                &registry,
                "a",
                &VersionId::new(1, 0, 0),
                &ClosureOptions::default(),
            ),
            Err(AssembleError::Resolve(
                ResolveError::NoCompatibleVersion { .. }
            ))
        ));
    }
}
