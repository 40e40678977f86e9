//! Registry-index accessor for schema version 1.1.0.
//!
//! Index shape: `repositories` → `packages` → `versions`. Version entries
//! store their dependency sets differentially: an entry either carries a
//! full `dependencies` object or a `base_version` pointer plus
//! `dependencies_added` / `dependencies_removed` deltas, and the accessor
//! reconstructs the effective set by replaying the base chain oldest to
//! newest.

use serde_json::{Map, Value};

use crate::chain::{RawDependencies, RegistryAccessor, RegistryOp};
use crate::error::{AssembleError, ChainError, GraphError, ResolveError};
use crate::types::{Dependency, DependencyCategory, Document};
use crate::version::{find_compatible, Constraint, VersionId};

fn version() -> VersionId {
    VersionId::new(1, 1, 0)
}

/// Constructor registered with the version registry.
pub fn accessor(next: Option<Box<dyn RegistryAccessor>>) -> Box<dyn RegistryAccessor> {
    Box::new(Accessor {
        version: version(),
        next,
    })
}

/// Terminal registry accessor: implements the full contract.
struct Accessor {
    version: VersionId,
    next: Option<Box<dyn RegistryAccessor>>,
}

impl RegistryAccessor for Accessor {
    fn version(&self) -> &VersionId {
        &self.version
    }

    fn next(&self) -> Option<&dyn RegistryAccessor> {
        self.next.as_deref()
    }

    fn implemented_ops(&self) -> &'static [RegistryOp] {
        &RegistryOp::ALL
    }

    fn repositories(&self, registry: &Document) -> Result<Vec<String>, ChainError> {
        Ok(repositories_of(registry)
            .filter_map(|repo| repo.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect())
    }

    fn package_names(&self, registry: &Document) -> Result<Vec<String>, ChainError> {
        let mut names: Vec<String> = Vec::new();
        for (_, package) in packages_of(registry, None) {
            if let Some(name) = package.get("name").and_then(Value::as_str) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn package_exists(
        &self,
        registry: &Document,
        name: &str,
        repo: Option<&str>,
    ) -> Result<bool, ChainError> {
        Ok(find_package(registry, name, repo).is_some())
    }

    fn package_versions(
        &self,
        registry: &Document,
        name: &str,
    ) -> Result<Vec<VersionId>, AssembleError> {
        let (_, package) = find_package(registry, name, None).ok_or_else(|| {
            ResolveError::PackageNotFound {
                name: name.to_string(),
            }
        })?;

        version_entries(package)
            .map(|entry| parse_entry_version(name, entry))
            .collect()
    }

    fn package_dependencies(
        &self,
        registry: &Document,
        name: &str,
        version: &VersionId,
    ) -> Result<RawDependencies, AssembleError> {
        let (_, package) = find_package(registry, name, None).ok_or_else(|| {
            ResolveError::PackageNotFound {
                name: name.to_string(),
            }
        })?;

        let target = find_version_entry(package, name, version)?;
        reconstruct_dependencies(package, name, target)
    }

    fn package_uri(
        &self,
        registry: &Document,
        name: &str,
        version: &VersionId,
    ) -> Result<String, AssembleError> {
        let (repo, package) = find_package(registry, name, None).ok_or_else(|| {
            ResolveError::PackageNotFound {
                name: name.to_string(),
            }
        })?;

        let entry = find_version_entry(package, name, version)?;
        match entry.get("uri").and_then(Value::as_str) {
            Some(uri) => Ok(uri.to_string()),
            // Indexes may omit per-release locations; the layout is then
            // repository-relative.
            None => Ok(format!("{repo}/{name}/{version}")),
        }
    }

    fn find_compatible_version(
        &self,
        registry: &Document,
        name: &str,
        constraint: &Constraint,
    ) -> Result<VersionId, AssembleError> {
        let candidates = self.package_versions(registry, name)?;
        Ok(find_compatible(&candidates, constraint)?)
    }
}

fn repositories_of(registry: &Document) -> impl Iterator<Item = &Map<String, Value>> {
    registry
        .get("repositories")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_object)
}

/// All `(repository name, package)` pairs, optionally restricted to one
/// repository.
fn packages_of<'a>(
    registry: &'a Document,
    repo: Option<&'a str>,
) -> impl Iterator<Item = (&'a str, &'a Map<String, Value>)> {
    repositories_of(registry)
        .filter(move |r| match repo {
            Some(wanted) => r.get("name").and_then(Value::as_str) == Some(wanted),
            None => true,
        })
        .flat_map(|r| {
            let repo_name = r.get("name").and_then(Value::as_str).unwrap_or("");
            r.get("packages")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_object)
                .map(move |p| (repo_name, p))
        })
}

fn find_package<'a>(
    registry: &'a Document,
    name: &str,
    repo: Option<&'a str>,
) -> Option<(&'a str, &'a Map<String, Value>)> {
    packages_of(registry, repo)
        .find(|(_, package)| package.get("name").and_then(Value::as_str) == Some(name))
}

fn version_entries(package: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    package
        .get("versions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_object)
}

fn parse_entry_version(
    name: &str,
    entry: &Map<String, Value>,
) -> Result<VersionId, AssembleError> {
    let raw = entry
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| ResolveError::VersionNotFound {
            name: name.to_string(),
            version: "<missing>".to_string(),
        })?;
    Ok(VersionId::parse(raw)?)
}

fn find_version_entry<'a>(
    package: &'a Map<String, Value>,
    name: &str,
    version: &VersionId,
) -> Result<&'a Map<String, Value>, AssembleError> {
    for entry in version_entries(package) {
        if &parse_entry_version(name, entry)? == version {
            return Ok(entry);
        }
    }
    Err(ResolveError::VersionNotFound {
        name: name.to_string(),
        version: version.to_string(),
    }
    .into())
}

/// Replay the differential storage chain for one version entry.
///
/// The chain is collected target→base, then applied base→target: a full
/// `dependencies` object replaces the working set, `dependencies_added`
/// upserts entries by name, `dependencies_removed` deletes by name.
fn reconstruct_dependencies(
    package: &Map<String, Value>,
    name: &str,
    target: &Map<String, Value>,
) -> Result<RawDependencies, AssembleError> {
    let mut chain = vec![target];
    let mut seen = vec![target
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()];

    let mut current = target;
    while let Some(base) = current.get("base_version").and_then(Value::as_str) {
        let base_version = VersionId::parse(base)?;
        let entry = find_version_entry(package, name, &base_version)?;

        let label = base_version.to_string();
        if seen.contains(&label) {
            let mut cycle: Vec<String> =
                seen.iter().map(|v| format!("{name}@{v}")).collect();
            cycle.push(format!("{name}@{label}"));
            return Err(GraphError::CircularDependency { cycle }.into());
        }
        seen.push(label);
        chain.push(entry);
        current = entry;
    }

    let mut deps = RawDependencies::new();
    for entry in chain.iter().rev() {
        if let Some(full) = entry.get("dependencies").and_then(Value::as_object) {
            deps = parse_dependency_block(full);
        }
        if let Some(added) = entry.get("dependencies_added").and_then(Value::as_object) {
            for (category, list) in parse_dependency_block(added) {
                let slot = deps.entry(category).or_default();
                for dep in list {
                    match slot.iter_mut().find(|d| d.name == dep.name) {
                        Some(existing) => *existing = dep,
                        None => slot.push(dep),
                    }
                }
            }
        }
        if let Some(removed) = entry
            .get("dependencies_removed")
            .and_then(Value::as_object)
        {
            for (key, names) in removed {
                let Some(category) = DependencyCategory::parse(key) else {
                    continue;
                };
                let Some(slot) = deps.get_mut(&category) else {
                    continue;
                };
                let remove: Vec<&str> = names
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                slot.retain(|d| !remove.contains(&d.name.as_str()));
            }
        }
    }
    Ok(deps)
}

fn parse_dependency_block(block: &Map<String, Value>) -> RawDependencies {
    let mut deps = RawDependencies::new();
    for (key, value) in block {
        let Some(category) = DependencyCategory::parse(key) else {
            continue;
        };
        let entries: Vec<Dependency> = value
            .as_array()
            .map(|list| list.iter().filter_map(Dependency::from_value).collect())
            .unwrap_or_default();
        deps.insert(category, entries);
    }
    deps
}
