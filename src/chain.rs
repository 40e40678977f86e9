//! Delegation-handler contracts for the three handler families.
//!
//! A chain is a newest-to-oldest linked sequence of version handlers. Each
//! handler implements only the operations that changed in its version;
//! every other operation has a provided default that forwards unchanged to
//! the next-older handler. A forward that falls off the end of the chain is
//! an `UnsupportedOperation` configuration defect: the oldest handler must
//! implement the family's full contract, and the chain builder enforces
//! that at construction time.
//!
//! Delegation is tail-position. For any operation and input, exactly one
//! handler in the chain produces the final value or error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{AssembleError, ChainError, ValidateError};
use crate::types::{
    declared_version, Concern, ConcernResult, Dependency, DependencyCategory, Document,
    EntryPoints, Outcome, ValidationContext, PACKAGE_SCHEMA_VERSION_FIELD,
};
use crate::version::{Constraint, VersionId};

/// Per-version shape of dependency declarations, keyed by canonical
/// category. Categories a schema version does not know are simply absent;
/// the assembler fills them in.
pub type RawDependencies = BTreeMap<DependencyCategory, Vec<Dependency>>;

/// Operations in the metadata-accessor contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorOp {
    Field,
    Dependencies,
    EntryPoints,
    LocalResolution,
}

impl AccessorOp {
    pub const ALL: [AccessorOp; 4] = [
        AccessorOp::Field,
        AccessorOp::Dependencies,
        AccessorOp::EntryPoints,
        AccessorOp::LocalResolution,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AccessorOp::Field => "field",
            AccessorOp::Dependencies => "dependencies",
            AccessorOp::EntryPoints => "entry-points",
            AccessorOp::LocalResolution => "local-resolution",
        }
    }
}

/// Operations in the registry-accessor contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOp {
    Repositories,
    PackageNames,
    PackageExists,
    PackageVersions,
    PackageDependencies,
    PackageUri,
    FindCompatibleVersion,
}

impl RegistryOp {
    pub const ALL: [RegistryOp; 7] = [
        RegistryOp::Repositories,
        RegistryOp::PackageNames,
        RegistryOp::PackageExists,
        RegistryOp::PackageVersions,
        RegistryOp::PackageDependencies,
        RegistryOp::PackageUri,
        RegistryOp::FindCompatibleVersion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RegistryOp::Repositories => "repositories",
            RegistryOp::PackageNames => "package-names",
            RegistryOp::PackageExists => "package-exists",
            RegistryOp::PackageVersions => "package-versions",
            RegistryOp::PackageDependencies => "package-dependencies",
            RegistryOp::PackageUri => "package-uri",
            RegistryOp::FindCompatibleVersion => "find-compatible-version",
        }
    }
}

/// Document validator for one schema version.
///
/// `validate` is provided and identical for every version: run each concern
/// in fixed order, using this handler's own check where the concern changed
/// in this version and the chain's default forwarding otherwise. Which
/// concerns a version owns is a structural fact exposed by
/// `owned_concerns`.
pub trait ValidatorHandler: Send + Sync {
    /// The schema version this handler was registered for.
    fn version(&self) -> &VersionId;

    /// Pure predicate: can this handler validate documents declaring
    /// `version`? No side effects.
    fn can_handle(&self, version: &VersionId) -> bool {
        version == self.version()
    }

    /// The next-older handler, if any.
    fn next(&self) -> Option<&dyn ValidatorHandler>;

    /// Concerns whose checks this version implements directly (without
    /// forwarding). The terminal handler must own every concern.
    fn owned_concerns(&self) -> &'static [Concern];

    /// True when some handler in this chain can handle `version`.
    fn supports(&self, version: &VersionId) -> bool {
        self.can_handle(version) || self.next().is_some_and(|n| n.supports(version))
    }

    /// Versions in this chain, newest first.
    fn chain_versions(&self) -> Vec<VersionId> {
        let mut versions = vec![self.version().clone()];
        if let Some(next) = self.next() {
            versions.extend(next.chain_versions());
        }
        versions
    }

    /// Validate a whole document, aggregating every concern.
    ///
    /// A handler whose `can_handle` rejects the document's declared version
    /// forwards the entire call to its predecessor (the chain may be built
    /// one version newer than the document declares).
    ///
    /// # Errors
    ///
    /// `UnknownVersion` when no handler in the chain accepts the declared
    /// version, `InvalidVersionFormat` for a malformed declaration, and any
    /// structural or schema-availability error raised by a concern check.
    /// Data-quality findings never abort: they land in the outcome's error
    /// lists.
    fn validate(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<Outcome, ValidateError> {
        let declared = declared_version(doc, PACKAGE_SCHEMA_VERSION_FIELD)?
            .unwrap_or_else(|| ctx.default_version.clone());

        if !self.can_handle(&declared) {
            return match self.next() {
                Some(next) => next.validate(doc, ctx),
                // Only reachable when a chain is invoked directly with a
                // document older than its terminal version; the builder
                // reports the full supported set for its own lookups.
                None => Err(ChainError::UnknownVersion {
                    version: declared.to_string(),
                    supported: vec![self.version().to_string()],
                }
                .into()),
            };
        }

        let mut results = Vec::with_capacity(Concern::ALL.len());
        for concern in Concern::ALL {
            let result = match concern {
                Concern::Schema => self.check_schema(doc, ctx)?,
                Concern::Dependencies => self.check_dependencies(doc, ctx)?,
                Concern::EntryPoint => self.check_entry_point(doc, ctx)?,
                Concern::Tools => self.check_tools(doc, ctx)?,
            };
            results.push(result);
        }
        Ok(Outcome::from_concerns(results))
    }

    /// Check schema conformance for this version.
    fn check_schema(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        match self.next() {
            Some(next) => next.check_schema(doc, ctx),
            None => Err(self.unsupported(Concern::Schema).into()),
        }
    }

    /// Check dependency declarations for this version.
    fn check_dependencies(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        match self.next() {
            Some(next) => next.check_dependencies(doc, ctx),
            None => Err(self.unsupported(Concern::Dependencies).into()),
        }
    }

    /// Check the entry-point declaration for this version.
    fn check_entry_point(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        match self.next() {
            Some(next) => next.check_entry_point(doc, ctx),
            None => Err(self.unsupported(Concern::EntryPoint).into()),
        }
    }

    /// Check tool declarations for this version.
    fn check_tools(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        match self.next() {
            Some(next) => next.check_tools(doc, ctx),
            None => Err(self.unsupported(Concern::Tools).into()),
        }
    }

    #[doc(hidden)]
    fn unsupported(&self, concern: Concern) -> ChainError {
        ChainError::UnsupportedOperation {
            version: self.version().clone(),
            operation: concern.as_str(),
        }
    }
}

/// Version-aware read access to manifest documents.
///
/// Adapts field layout differences between schema versions so callers
/// never branch on version strings.
pub trait PackageAccessor: Send + Sync {
    fn version(&self) -> &VersionId;

    fn can_handle(&self, version: &VersionId) -> bool {
        version == self.version()
    }

    fn next(&self) -> Option<&dyn PackageAccessor>;

    /// Operations this version implements directly.
    fn implemented_ops(&self) -> &'static [AccessorOp];

    fn supports(&self, version: &VersionId) -> bool {
        self.can_handle(version) || self.next().is_some_and(|n| n.supports(version))
    }

    fn chain_versions(&self) -> Vec<VersionId> {
        let mut versions = vec![self.version().clone()];
        if let Some(next) = self.next() {
            versions.extend(next.chain_versions());
        }
        versions
    }

    /// Read a top-level field. `Ok(None)` when absent.
    fn field(&self, doc: &Document, name: &str) -> Result<Option<Value>, ChainError> {
        match self.next() {
            Some(next) => next.field(doc, name),
            None => Err(self.unsupported(AccessorOp::Field)),
        }
    }

    /// Dependency declarations in this version's shape, keyed by canonical
    /// category.
    fn dependencies(&self, doc: &Document) -> Result<RawDependencies, ChainError> {
        match self.next() {
            Some(next) => next.dependencies(doc),
            None => Err(self.unsupported(AccessorOp::Dependencies)),
        }
    }

    /// The normalized entry-point declaration.
    fn entry_points(&self, doc: &Document) -> Result<EntryPoints, ChainError> {
        match self.next() {
            Some(next) => next.entry_points(doc),
            None => Err(self.unsupported(AccessorOp::EntryPoints)),
        }
    }

    /// Whether a dependency resolves locally (filesystem) rather than
    /// through a registry.
    fn is_local(&self, dep: &Dependency) -> Result<bool, ChainError> {
        match self.next() {
            Some(next) => next.is_local(dep),
            None => Err(self.unsupported(AccessorOp::LocalResolution)),
        }
    }

    #[doc(hidden)]
    fn unsupported(&self, op: AccessorOp) -> ChainError {
        ChainError::UnsupportedOperation {
            version: self.version().clone(),
            operation: op.name(),
        }
    }
}

/// Version-aware read access to registry-index documents.
pub trait RegistryAccessor: Send + Sync {
    fn version(&self) -> &VersionId;

    /// Registry indexes rev their patch version without structural change,
    /// so the probe matches on major.minor.
    fn can_handle(&self, version: &VersionId) -> bool {
        version.same_minor(self.version())
    }

    fn next(&self) -> Option<&dyn RegistryAccessor>;

    /// Operations this version implements directly.
    fn implemented_ops(&self) -> &'static [RegistryOp];

    fn supports(&self, version: &VersionId) -> bool {
        self.can_handle(version) || self.next().is_some_and(|n| n.supports(version))
    }

    /// Repository names in the index.
    fn repositories(&self, registry: &Document) -> Result<Vec<String>, ChainError> {
        match self.next() {
            Some(next) => next.repositories(registry),
            None => Err(self.unsupported(RegistryOp::Repositories)),
        }
    }

    /// All package names, across repositories, first occurrence order.
    fn package_names(&self, registry: &Document) -> Result<Vec<String>, ChainError> {
        match self.next() {
            Some(next) => next.package_names(registry),
            None => Err(self.unsupported(RegistryOp::PackageNames)),
        }
    }

    /// Whether `name` exists, optionally restricted to one repository.
    fn package_exists(
        &self,
        registry: &Document,
        name: &str,
        repo: Option<&str>,
    ) -> Result<bool, ChainError> {
        match self.next() {
            Some(next) => next.package_exists(registry, name, repo),
            None => Err(self.unsupported(RegistryOp::PackageExists)),
        }
    }

    /// Published versions of `name`, unordered.
    fn package_versions(
        &self,
        registry: &Document,
        name: &str,
    ) -> Result<Vec<VersionId>, AssembleError> {
        match self.next() {
            Some(next) => next.package_versions(registry, name),
            None => Err(self.unsupported(RegistryOp::PackageVersions).into()),
        }
    }

    /// Effective dependency set of `name` at `version`, reconstructed from
    /// the index's storage format.
    fn package_dependencies(
        &self,
        registry: &Document,
        name: &str,
        version: &VersionId,
    ) -> Result<RawDependencies, AssembleError> {
        match self.next() {
            Some(next) => next.package_dependencies(registry, name, version),
            None => Err(self.unsupported(RegistryOp::PackageDependencies).into()),
        }
    }

    /// Download location of `name` at `version`.
    fn package_uri(
        &self,
        registry: &Document,
        name: &str,
        version: &VersionId,
    ) -> Result<String, AssembleError> {
        match self.next() {
            Some(next) => next.package_uri(registry, name, version),
            None => Err(self.unsupported(RegistryOp::PackageUri).into()),
        }
    }

    /// Highest published version of `name` satisfying `constraint`.
    fn find_compatible_version(
        &self,
        registry: &Document,
        name: &str,
        constraint: &Constraint,
    ) -> Result<VersionId, AssembleError> {
        match self.next() {
            Some(next) => next.find_compatible_version(registry, name, constraint),
            None => Err(self.unsupported(RegistryOp::FindCompatibleVersion).into()),
        }
    }

    #[doc(hidden)]
    fn unsupported(&self, op: RegistryOp) -> ChainError {
        ChainError::UnsupportedOperation {
            version: self.version().clone(),
            operation: op.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Terminal accessor implementing the full contract.
    struct Oldest {
        version: VersionId,
    }

    impl PackageAccessor for Oldest {
        fn version(&self) -> &VersionId {
            &self.version
        }

        fn next(&self) -> Option<&dyn PackageAccessor> {
            None
        }

        fn implemented_ops(&self) -> &'static [AccessorOp] {
            &AccessorOp::ALL
        }

        fn field(&self, doc: &Document, name: &str) -> Result<Option<Value>, ChainError> {
            Ok(doc.get(name).cloned())
        }

        fn dependencies(&self, _doc: &Document) -> Result<RawDependencies, ChainError> {
            Ok(RawDependencies::new())
        }

        fn entry_points(&self, _doc: &Document) -> Result<EntryPoints, ChainError> {
            Ok(EntryPoints {
                server: Some("old.py".into()),
                wrapper: None,
            })
        }

        fn is_local(&self, _dep: &Dependency) -> Result<bool, ChainError> {
            Ok(false)
        }
    }

    /// Newer accessor overriding only the entry-point shape.
    struct Newer {
        version: VersionId,
        next: Oldest,
    }

    impl PackageAccessor for Newer {
        fn version(&self) -> &VersionId {
            &self.version
        }

        fn next(&self) -> Option<&dyn PackageAccessor> {
            Some(&self.next)
        }

        fn implemented_ops(&self) -> &'static [AccessorOp] {
            &[AccessorOp::EntryPoints]
        }

        fn entry_points(&self, _doc: &Document) -> Result<EntryPoints, ChainError> {
            Ok(EntryPoints {
                server: Some("new.py".into()),
                wrapper: Some("wrapper.py".into()),
            })
        }
    }

    /// Incomplete terminal: implements nothing.
    struct Hollow {
        version: VersionId,
    }

    impl PackageAccessor for Hollow {
        fn version(&self) -> &VersionId {
            &self.version
        }

        fn next(&self) -> Option<&dyn PackageAccessor> {
            None
        }

        fn implemented_ops(&self) -> &'static [AccessorOp] {
            &[]
        }
    }

    fn two_node_chain() -> Newer {
        Newer {
            version: VersionId::new(1, 2, 0),
            next: Oldest {
                version: VersionId::new(1, 1, 0),
            },
        }
    }

    #[test]
    fn overridden_operation_answers_at_head() {
        let chain = two_node_chain();
        let eps = chain.entry_points(&Document::new()).unwrap();
        assert_eq!(eps.server.as_deref(), Some("new.py"));
        assert_eq!(eps.wrapper.as_deref(), Some("wrapper.py"));
    }

    #[test]
    fn unowned_operation_forwards_to_terminal() {
        let chain = two_node_chain();
        let mut doc = Document::new();
        doc.insert("name".into(), Value::String("pkg".into()));
        let value = chain.field(&doc, "name").unwrap();
        assert_eq!(value, Some(Value::String("pkg".into())));
    }

    #[test]
    fn same_operation_from_inner_node_gives_inner_result() {
        // Delegation ordering: invoking the overridden operation directly
        // on the older node bypasses the newer override.
        let chain = two_node_chain();
        let eps = chain.next.entry_points(&Document::new()).unwrap();
        assert_eq!(eps.server.as_deref(), Some("old.py"));
        assert_eq!(eps.wrapper, None);
    }

    #[test]
    fn terminal_without_operation_is_a_defect() {
        let hollow = Hollow {
            version: VersionId::new(1, 0, 0),
        };
        let err = hollow.dependencies(&Document::new()).unwrap_err();
        match err {
            ChainError::UnsupportedOperation { version, operation } => {
                assert_eq!(version, VersionId::new(1, 0, 0));
                assert_eq!(operation, "dependencies");
            }
            other => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }

    #[test]
    fn supports_probes_whole_chain() {
        let chain = two_node_chain();
        assert!(chain.supports(&VersionId::new(1, 2, 0)));
        assert!(chain.supports(&VersionId::new(1, 1, 0)));
        assert!(!chain.supports(&VersionId::new(1, 3, 0)));
    }

    #[test]
    fn chain_versions_newest_first() {
        let chain = two_node_chain();
        assert_eq!(
            chain.chain_versions(),
            vec![VersionId::new(1, 2, 0), VersionId::new(1, 1, 0)]
        );
    }
}
