//! Package-manifest handlers: per-version validators and metadata
//! accessors, plus the version-independent `PackageService` facade.
//!
//! Each schema version's module registers two handlers (a validator and an
//! accessor) that implement only what changed in that version:
//!
//! - `v1_1_0` — terminal: split dependency arrays, single string entry
//!   point, named tool list. Implements every operation.
//! - `v1_2_0` — unified `dependencies` block keyed by canonical category;
//!   local dependencies are path-shaped names.
//! - `v1_2_1` — dual entry point (`server` + `wrapper`), server-bound
//!   tools.

pub mod v1_1_0;
pub mod v1_2_0;
pub mod v1_2_1;

use serde_json::Value;

use crate::assembler;
use crate::builder::VersionRegistry;
use crate::chain::PackageAccessor;
use crate::error::{AssembleError, ChainError, ValidateError};
use crate::provider::SchemaKind;
use crate::registry::RegistryService;
use crate::types::{
    declared_version, default_schema_version, Concern, ConcernResult, Dependency, DependencyView,
    Document, EntryPoints, ValidationContext, PACKAGE_SCHEMA_VERSION_FIELD,
};
use crate::version::{Constraint, VersionId};

/// Schema-conformance strategy, shared by every version's validator.
///
/// The concern's logic is identical across versions; only the schema
/// document differs, so the strategy is parameterized by (kind, version)
/// instead of being re-implemented per version.
pub(crate) struct SchemaConformance {
    kind: SchemaKind,
    version: VersionId,
}

impl SchemaConformance {
    pub(crate) fn package(version: VersionId) -> Self {
        SchemaConformance {
            kind: SchemaKind::Package,
            version,
        }
    }

    pub(crate) fn check(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        let schema = ctx.schemas.get_schema(self.kind, &self.version)?;
        let violations = ctx.checker.check(&Value::Object(doc.clone()), &schema);
        Ok(ConcernResult::from_errors(Concern::Schema, violations))
    }
}

/// Read a dependency array field, reporting malformed entries.
pub(crate) fn read_dependency_list(
    value: &Value,
    label: &str,
    errors: &mut Vec<String>,
) -> Vec<Dependency> {
    let Some(entries) = value.as_array() else {
        errors.push(format!("{label} must be an array"));
        return Vec::new();
    };

    let mut deps = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match Dependency::from_value(entry) {
            Some(dep) => deps.push(dep),
            None => errors.push(format!(
                "{label}[{index}] is malformed: expected an object with a string \"name\""
            )),
        }
    }
    deps
}

/// Parse a dependency's constraint, reporting malformed syntax as a
/// finding. A malformed constraint in a document is bad data, not a
/// misconfigured system.
pub(crate) fn parse_declared_constraint(
    dep: &Dependency,
    errors: &mut Vec<String>,
) -> Option<Constraint> {
    let raw = dep.constraint.as_deref()?;
    match Constraint::parse(raw) {
        Ok(constraint) => Some(constraint),
        Err(e) => {
            errors.push(format!("dependency \"{}\": {e}", dep.name));
            None
        }
    }
}

/// Split a fallible registry lookup into the two propagation channels:
/// chain defects abort, resolution dead-ends become findings.
pub(crate) fn recover_lookup<T>(
    result: Result<T, AssembleError>,
    errors: &mut Vec<String>,
) -> Result<Option<T>, ValidateError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AssembleError::Chain(e)) => Err(e.into()),
        Err(e) => {
            errors.push(e.to_string());
            Ok(None)
        }
    }
}

/// Registry-backed checks for one platform dependency: existence and
/// constraint satisfiability. Returns the parsed constraint when the
/// dependency should seed the cycle walk.
pub(crate) fn check_platform_dependency(
    dep: &Dependency,
    constraint: Option<Constraint>,
    registry: &RegistryService,
    errors: &mut Vec<String>,
) -> Result<Option<(String, Option<Constraint>)>, ValidateError> {
    match registry.package_exists(&dep.name, None) {
        Ok(true) => {}
        Ok(false) => {
            errors.push(format!(
                "platform package \"{}\" not found in registry",
                dep.name
            ));
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(constraint) = &constraint {
        let resolved = recover_lookup(
            registry.find_compatible_version(&dep.name, constraint),
            errors,
        )?;
        // An unsatisfiable dependency was already reported; don't walk it.
        if resolved.is_none() {
            return Ok(None);
        }
    }

    Ok(Some((dep.name.clone(), constraint)))
}

/// Walk the registry graph from the validated package's declared platform
/// dependencies, reporting cycles and runaway depth as findings.
pub(crate) fn check_dependency_cycles(
    package: &str,
    seeds: Vec<(String, Option<Constraint>)>,
    ctx: &ValidationContext<'_>,
    errors: &mut Vec<String>,
) -> Result<(), ValidateError> {
    let Some(registry) = ctx.registry else {
        return Ok(());
    };
    if seeds.is_empty() {
        return Ok(());
    }

    let options = assembler::ClosureOptions {
        max_depth: ctx.max_graph_depth,
    };
    match assembler::closure_from_seeds(registry, package, seeds, &options) {
        Ok(_) => Ok(()),
        Err(AssembleError::Chain(e)) => Err(e.into()),
        Err(e) => {
            errors.push(e.to_string());
            Ok(())
        }
    }
}

/// The validated package's own name, for labeling graph findings.
pub(crate) fn package_label(doc: &Document) -> String {
    doc.get("name")
        .and_then(Value::as_str)
        .unwrap_or("<package>")
        .to_string()
}

/// Version-independent access to one manifest document.
///
/// Binds the document to the accessor chain for its declared schema
/// version, so callers read fields and dependencies without branching on
/// version strings.
pub struct PackageService {
    doc: Document,
    accessor: Box<dyn PackageAccessor>,
}

impl PackageService {
    /// Bind `doc` to the accessor chain for its declared version.
    ///
    /// # Errors
    ///
    /// `InvalidVersionFormat` for a malformed declaration, `UnknownVersion`
    /// when no accessor is registered for it.
    pub fn new(doc: Document, registry: &VersionRegistry) -> Result<Self, ValidateError> {
        let version = declared_version(&doc, PACKAGE_SCHEMA_VERSION_FIELD)?
            .unwrap_or_else(default_schema_version);
        let accessor = registry.accessor_chain(&version)?;
        Ok(PackageService { doc, accessor })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Read a top-level field. `Ok(None)` when absent.
    pub fn field(&self, name: &str) -> Result<Option<Value>, ChainError> {
        self.accessor.field(&self.doc, name)
    }

    /// The package name, when declared as a string.
    pub fn name(&self) -> Result<Option<String>, ChainError> {
        Ok(self
            .field("name")?
            .as_ref()
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// The normalized dependency view across all canonical categories.
    pub fn dependencies(&self) -> Result<DependencyView, ChainError> {
        assembler::assemble(self.accessor.as_ref(), &self.doc)
    }

    /// The normalized entry-point declaration.
    pub fn entry_points(&self) -> Result<EntryPoints, ChainError> {
        self.accessor.entry_points(&self.doc)
    }

    /// Whether `dep` resolves locally under this document's schema
    /// version.
    pub fn is_local(&self, dep: &Dependency) -> Result<bool, ChainError> {
        self.accessor.is_local(dep)
    }
}
