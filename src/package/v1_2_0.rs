//! Handlers for package schema version 1.2.0.
//!
//! This version restructured dependency declarations: the split arrays of
//! 1.1.0 were replaced by a unified `dependencies` object keyed by
//! canonical category, and local dependencies became path-shaped names
//! instead of a `source` marker. Entry-point and tools handling did not
//! change, so those operations delegate down the chain.

use serde_json::Value;

use crate::chain::{AccessorOp, PackageAccessor, RawDependencies, ValidatorHandler};
use crate::error::{ChainError, ValidateError};
use crate::types::{
    json_type_name, Concern, ConcernResult, Dependency, DependencyCategory, Document,
    ValidationContext,
};
use crate::version::VersionId;

use super::{
    check_dependency_cycles, check_platform_dependency, package_label, parse_declared_constraint,
    read_dependency_list, SchemaConformance,
};

fn version() -> VersionId {
    VersionId::new(1, 2, 0)
}

/// Constructor registered with the version registry.
pub fn validator(next: Option<Box<dyn ValidatorHandler>>) -> Box<dyn ValidatorHandler> {
    Box::new(Validator {
        version: version(),
        schema: SchemaConformance::package(version()),
        dependencies: UnifiedDependencyCheck,
        next,
    })
}

/// Constructor registered with the version registry.
pub fn accessor(next: Option<Box<dyn PackageAccessor>>) -> Box<dyn PackageAccessor> {
    Box::new(Accessor {
        version: version(),
        next,
    })
}

/// Validator for v1.2.0 manifests: owns schema conformance and the new
/// unified dependency structure; entry-point and tools checks forward to
/// v1.1.0.
struct Validator {
    version: VersionId,
    schema: SchemaConformance,
    dependencies: UnifiedDependencyCheck,
    next: Option<Box<dyn ValidatorHandler>>,
}

impl ValidatorHandler for Validator {
    fn version(&self) -> &VersionId {
        &self.version
    }

    fn next(&self) -> Option<&dyn ValidatorHandler> {
        self.next.as_deref()
    }

    fn owned_concerns(&self) -> &'static [Concern] {
        &[Concern::Schema, Concern::Dependencies]
    }

    fn check_schema(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        self.schema.check(doc, ctx)
    }

    fn check_dependencies(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        self.dependencies.check(doc, ctx)
    }
}

/// Dependency strategy for the unified category-keyed block.
struct UnifiedDependencyCheck;

impl UnifiedDependencyCheck {
    fn check(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        let mut errors = Vec::new();

        let Some(block) = doc.get("dependencies") else {
            return Ok(ConcernResult::passed(Concern::Dependencies));
        };
        let Some(block) = block.as_object() else {
            errors.push(format!(
                "dependencies must be an object, got {}",
                json_type_name(doc.get("dependencies").unwrap_or(&Value::Null))
            ));
            return Ok(ConcernResult::from_errors(Concern::Dependencies, errors));
        };

        let mut seeds = Vec::new();
        for (key, value) in block {
            let Some(category) = DependencyCategory::parse(key) else {
                errors.push(format!("unknown dependency category \"{key}\""));
                continue;
            };

            let label = format!("dependencies.{key}");
            for dep in read_dependency_list(value, &label, &mut errors) {
                let constraint = parse_declared_constraint(&dep, &mut errors);

                if category != DependencyCategory::PlatformPackage {
                    continue;
                }

                if is_path_shaped(&dep.name) {
                    if !ctx.allow_local_dependencies {
                        errors.push(format!(
                            "local dependency \"{}\" not permitted in this context",
                            dep.name
                        ));
                    }
                    continue;
                }

                if let Some(registry) = ctx.registry {
                    if let Some(seed) =
                        check_platform_dependency(&dep, constraint, registry, &mut errors)?
                    {
                        seeds.push(seed);
                    }
                }
            }
        }

        check_dependency_cycles(&package_label(doc), seeds, ctx, &mut errors)?;

        Ok(ConcernResult::from_errors(Concern::Dependencies, errors))
    }
}

/// From 1.2.0, a platform dependency resolves locally when its name is a
/// filesystem path rather than a registry name.
fn is_path_shaped(name: &str) -> bool {
    name.starts_with("./")
        || name.starts_with("../")
        || name.starts_with('/')
        || name.starts_with("file:")
}

/// Metadata accessor for v1.2.0 manifests: overrides dependency access and
/// local-dependency detection; everything else forwards to v1.1.0.
struct Accessor {
    version: VersionId,
    next: Option<Box<dyn PackageAccessor>>,
}

impl PackageAccessor for Accessor {
    fn version(&self) -> &VersionId {
        &self.version
    }

    fn next(&self) -> Option<&dyn PackageAccessor> {
        self.next.as_deref()
    }

    fn implemented_ops(&self) -> &'static [AccessorOp] {
        &[AccessorOp::Dependencies, AccessorOp::LocalResolution]
    }

    fn dependencies(&self, doc: &Document) -> Result<RawDependencies, ChainError> {
        let mut deps = RawDependencies::new();
        let Some(block) = doc.get("dependencies").and_then(Value::as_object) else {
            return Ok(deps);
        };

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
        Ok(deps)
    }

    fn is_local(&self, dep: &Dependency) -> Result<bool, ChainError> {
        Ok(is_path_shaped(&dep.name))
    }
}
