//! Handler registry and chain construction.
//!
//! A `VersionRegistry` is an explicit value mapping schema versions to
//! handler constructors for each of the three handler families. Chains are
//! built from it on demand: one handler per version from the target down to
//! the oldest registered version, linked newest to oldest. Construction is
//! pure — building the same (family, version) twice yields independent,
//! behaviorally identical chains — and fails fast when the registry is
//! misconfigured.

use crate::chain::{AccessorOp, PackageAccessor, RegistryAccessor, RegistryOp, ValidatorHandler};
use crate::error::ChainError;
use crate::package;
use crate::registry as registry_index;
use crate::types::Concern;
use crate::version::VersionId;

/// Constructor for one family handler: receives the already-built
/// next-older handler and returns the new chain head.
pub type ValidatorCtor = fn(Option<Box<dyn ValidatorHandler>>) -> Box<dyn ValidatorHandler>;
pub type AccessorCtor = fn(Option<Box<dyn PackageAccessor>>) -> Box<dyn PackageAccessor>;
pub type RegistryAccessorCtor = fn(Option<Box<dyn RegistryAccessor>>) -> Box<dyn RegistryAccessor>;

/// A registered `(version, constructor)` pair. Immutable once registered.
struct Descriptor<C> {
    version: VersionId,
    ctor: C,
}

/// Ordered catalog of handler constructors for the three families.
///
/// Constructed once at startup and passed by reference into chain builds;
/// there is no process-global registry, so tests can assemble arbitrary
/// version sets in isolation.
pub struct VersionRegistry {
    validators: Vec<Descriptor<ValidatorCtor>>,
    accessors: Vec<Descriptor<AccessorCtor>>,
    registry_accessors: Vec<Descriptor<RegistryAccessorCtor>>,
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VersionRegistry {
    /// An empty registry. Useful for tests that exercise specific version
    /// sets.
    pub fn empty() -> Self {
        VersionRegistry {
            validators: Vec::new(),
            accessors: Vec::new(),
            registry_accessors: Vec::new(),
        }
    }

    /// The registry with every version this crate ships handlers for.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_validator(VersionId::new(1, 1, 0), package::v1_1_0::validator);
        registry.register_validator(VersionId::new(1, 2, 0), package::v1_2_0::validator);
        registry.register_validator(VersionId::new(1, 2, 1), package::v1_2_1::validator);
        registry.register_accessor(VersionId::new(1, 1, 0), package::v1_1_0::accessor);
        registry.register_accessor(VersionId::new(1, 2, 0), package::v1_2_0::accessor);
        registry.register_accessor(VersionId::new(1, 2, 1), package::v1_2_1::accessor);
        registry.register_registry_accessor(
            VersionId::new(1, 1, 0),
            registry_index::v1_1_0::accessor,
        );
        registry
    }

    pub fn register_validator(&mut self, version: VersionId, ctor: ValidatorCtor) {
        insert_descending(&mut self.validators, version, ctor);
    }

    pub fn register_accessor(&mut self, version: VersionId, ctor: AccessorCtor) {
        insert_descending(&mut self.accessors, version, ctor);
    }

    pub fn register_registry_accessor(&mut self, version: VersionId, ctor: RegistryAccessorCtor) {
        insert_descending(&mut self.registry_accessors, version, ctor);
    }

    /// Registered validator versions, newest first.
    pub fn validator_versions(&self) -> Vec<VersionId> {
        self.validators.iter().map(|d| d.version.clone()).collect()
    }

    /// Registered metadata-accessor versions, newest first.
    pub fn accessor_versions(&self) -> Vec<VersionId> {
        self.accessors.iter().map(|d| d.version.clone()).collect()
    }

    /// Registered registry-accessor versions, newest first.
    pub fn registry_accessor_versions(&self) -> Vec<VersionId> {
        self.registry_accessors
            .iter()
            .map(|d| d.version.clone())
            .collect()
    }

    /// Build a validator chain for `target`.
    ///
    /// # Errors
    ///
    /// `UnknownVersion` when `target` is not registered, `EmptyRegistry`
    /// when the family has no registrations, and `UnsupportedOperation`
    /// when the terminal handler does not own the full concern contract.
    pub fn validator_chain(
        &self,
        target: &VersionId,
    ) -> Result<Box<dyn ValidatorHandler>, ChainError> {
        let head = build_chain(&self.validators, target, "validator")?;

        let mut terminal: &dyn ValidatorHandler = head.as_ref();
        while let Some(older) = terminal.next() {
            terminal = older;
        }
        for concern in Concern::ALL {
            if !terminal.owned_concerns().contains(&concern) {
                return Err(ChainError::UnsupportedOperation {
                    version: terminal.version().clone(),
                    operation: concern.as_str(),
                });
            }
        }
        Ok(head)
    }

    /// Build a metadata-accessor chain for `target`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`VersionRegistry::validator_chain`], against the
    /// accessor operation contract.
    pub fn accessor_chain(
        &self,
        target: &VersionId,
    ) -> Result<Box<dyn PackageAccessor>, ChainError> {
        let head = build_chain(&self.accessors, target, "metadata accessor")?;

        let mut terminal: &dyn PackageAccessor = head.as_ref();
        while let Some(older) = terminal.next() {
            terminal = older;
        }
        for op in AccessorOp::ALL {
            if !terminal.implemented_ops().contains(&op) {
                return Err(ChainError::UnsupportedOperation {
                    version: terminal.version().clone(),
                    operation: op.name(),
                });
            }
        }
        Ok(head)
    }

    /// Build a registry-accessor chain for `target`.
    ///
    /// The registry family matches loosely (major.minor), so the target is
    /// located by the handlers' own `can_handle` probe rather than exact
    /// equality.
    ///
    /// # Errors
    ///
    /// Same conditions as [`VersionRegistry::validator_chain`], against the
    /// registry operation contract.
    pub fn registry_accessor_chain(
        &self,
        target: &VersionId,
    ) -> Result<Box<dyn RegistryAccessor>, ChainError> {
        if self.registry_accessors.is_empty() {
            return Err(ChainError::EmptyRegistry {
                family: "registry accessor",
            });
        }

        // Loose matching: find the newest registered version whose
        // major.minor equals the target's.
        let position = self
            .registry_accessors
            .iter()
            .position(|d| d.version.same_minor(target))
            .ok_or_else(|| ChainError::UnknownVersion {
                version: target.to_string(),
                supported: self
                    .registry_accessors
                    .iter()
                    .map(|d| d.version.to_string())
                    .collect(),
            })?;

        let head = link_from(&self.registry_accessors[position..]);

        let mut terminal: &dyn RegistryAccessor = head.as_ref();
        while let Some(older) = terminal.next() {
            terminal = older;
        }
        for op in RegistryOp::ALL {
            if !terminal.implemented_ops().contains(&op) {
                return Err(ChainError::UnsupportedOperation {
                    version: terminal.version().clone(),
                    operation: op.name(),
                });
            }
        }
        Ok(head)
    }
}

/// Keep descriptor tables sorted newest first; re-registering a version
/// replaces its constructor.
fn insert_descending<C>(table: &mut Vec<Descriptor<C>>, version: VersionId, ctor: C) {
    if let Some(existing) = table.iter_mut().find(|d| d.version == version) {
        existing.ctor = ctor;
        return;
    }
    let position = table
        .iter()
        .position(|d| d.version < version)
        .unwrap_or(table.len());
    table.insert(position, Descriptor { version, ctor });
}

/// Slice the descending table from `target` to the oldest version and link
/// one handler per version, oldest first.
fn build_chain<H: ?Sized>(
    table: &[Descriptor<fn(Option<Box<H>>) -> Box<H>>],
    target: &VersionId,
    family: &'static str,
) -> Result<Box<H>, ChainError> {
    if table.is_empty() {
        return Err(ChainError::EmptyRegistry { family });
    }

    let position = table
        .iter()
        .position(|d| &d.version == target)
        .ok_or_else(|| ChainError::UnknownVersion {
            version: target.to_string(),
            supported: table.iter().map(|d| d.version.to_string()).collect(),
        })?;

    Ok(link_from(&table[position..]))
}

/// Link handlers for a descending descriptor slice; newer-than-target
/// versions are never instantiated because the slice starts at the target.
fn link_from<H: ?Sized>(slice: &[Descriptor<fn(Option<Box<H>>) -> Box<H>>]) -> Box<H> {
    let mut next: Option<Box<H>> = None;
    for descriptor in slice.iter().rev() {
        next = Some((descriptor.ctor)(next));
    }
    next.expect("slice is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RawDependencies;
    use crate::types::Document;

    fn v(s: &str) -> VersionId {
        VersionId::parse(s).unwrap()
    }

    #[test]
    fn builtin_versions_are_descending() {
        let registry = VersionRegistry::builtin();
        assert_eq!(
            registry.validator_versions(),
            vec![v("1.2.1"), v("1.2.0"), v("1.1.0")]
        );
        assert_eq!(
            registry.accessor_versions(),
            vec![v("1.2.1"), v("1.2.0"), v("1.1.0")]
        );
        assert_eq!(registry.registry_accessor_versions(), vec![v("1.1.0")]);
    }

    #[test]
    fn chain_for_newest_spans_all_versions() {
        let registry = VersionRegistry::builtin();
        let chain = registry.validator_chain(&v("1.2.1")).unwrap();
        assert_eq!(
            chain.chain_versions(),
            vec![v("1.2.1"), v("1.2.0"), v("1.1.0")]
        );
    }

    #[test]
    fn chain_for_middle_version_excludes_newer() {
        let registry = VersionRegistry::builtin();
        let chain = registry.validator_chain(&v("1.2.0")).unwrap();
        assert_eq!(chain.chain_versions(), vec![v("1.2.0"), v("1.1.0")]);
    }

    #[test]
    fn chain_for_oldest_is_single_node() {
        let registry = VersionRegistry::builtin();
        let chain = registry.validator_chain(&v("1.1.0")).unwrap();
        assert_eq!(chain.chain_versions(), vec![v("1.1.0")]);
        assert!(chain.next().is_none());
    }

    #[test]
    fn unknown_target_names_supported_versions() {
        let registry = VersionRegistry::builtin();
        match registry.validator_chain(&v("2.0.0")) {
            Err(ChainError::UnknownVersion { version, supported }) => {
                assert_eq!(version, "2.0.0");
                assert_eq!(supported, vec!["1.2.1", "1.2.0", "1.1.0"]);
            }
            Ok(_) => panic!("expected UnknownVersion, got Ok"),
            Err(other) => panic!("expected UnknownVersion, got {other:?}"),
        }
    }

    #[test]
    fn normalized_target_matches() {
        let registry = VersionRegistry::builtin();
        assert!(registry.validator_chain(&v("v1.2.0")).is_ok());
    }

    #[test]
    fn empty_family_is_reported() {
        let registry = VersionRegistry::empty();
        assert!(matches!(
            registry.validator_chain(&v("1.1.0")),
            Err(ChainError::EmptyRegistry { .. })
        ));
    }

    #[test]
    fn construction_is_idempotent() {
        let registry = VersionRegistry::builtin();
        let a = registry.accessor_chain(&v("1.2.1")).unwrap();
        let b = registry.accessor_chain(&v("1.2.1")).unwrap();

        let mut doc = Document::new();
        doc.insert("name".into(), serde_json::Value::String("pkg".into()));
        assert_eq!(a.field(&doc, "name").unwrap(), b.field(&doc, "name").unwrap());
        assert_eq!(a.chain_versions(), b.chain_versions());
    }

    #[test]
    fn registry_family_matches_on_minor() {
        let registry = VersionRegistry::builtin();
        // 1.1.3 is not registered, but the 1.1.0 accessor handles 1.1.*.
        assert!(registry.registry_accessor_chain(&v("1.1.3")).is_ok());
        assert!(matches!(
            registry.registry_accessor_chain(&v("1.2.0")),
            Err(ChainError::UnknownVersion { .. })
        ));
    }

    /// Terminal accessor that implements nothing: building any chain that
    /// ends at it must fail fast.
    struct HollowAccessor {
        version: VersionId,
        next: Option<Box<dyn PackageAccessor>>,
    }

    impl PackageAccessor for HollowAccessor {
        fn version(&self) -> &VersionId {
            &self.version
        }

        fn next(&self) -> Option<&dyn PackageAccessor> {
            self.next.as_deref()
        }

        fn implemented_ops(&self) -> &'static [AccessorOp] {
            &[]
        }
    }

    fn hollow_accessor(next: Option<Box<dyn PackageAccessor>>) -> Box<dyn PackageAccessor> {
        Box::new(HollowAccessor {
            version: VersionId::new(0, 9, 0),
            next,
        })
    }

    #[test]
    fn incomplete_terminal_fails_at_build_time() {
        let mut registry = VersionRegistry::empty();
        registry.register_accessor(v("0.9.0"), hollow_accessor);

        match registry.accessor_chain(&v("0.9.0")) {
            Err(ChainError::UnsupportedOperation { version, operation }) => {
                assert_eq!(version, v("0.9.0"));
                assert_eq!(operation, "field");
            }
            Ok(_) => panic!("expected UnsupportedOperation, got Ok"),
            Err(other) => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }

    #[test]
    fn complete_terminal_below_hollow_head_builds() {
        // A hollow handler is fine anywhere but the terminal position.
        let mut registry = VersionRegistry::empty();
        registry.register_accessor(v("1.1.0"), crate::package::v1_1_0::accessor);
        registry.register_accessor(v("1.1.5"), hollow_accessor_at_1_1_5);

        let chain = registry.accessor_chain(&v("1.1.5")).unwrap();
        assert_eq!(chain.chain_versions(), vec![v("1.1.5"), v("1.1.0")]);
        // Unimplemented op forwards to the complete terminal.
        assert!(chain.dependencies(&Document::new()).is_ok());
    }

    fn hollow_accessor_at_1_1_5(next: Option<Box<dyn PackageAccessor>>) -> Box<dyn PackageAccessor> {
        Box::new(HollowAccessor {
            version: VersionId::new(1, 1, 5),
            next,
        })
    }

    #[test]
    fn reregistering_replaces_constructor() {
        fn stub(next: Option<Box<dyn PackageAccessor>>) -> Box<dyn PackageAccessor> {
            crate::package::v1_1_0::accessor(next)
        }

        let mut registry = VersionRegistry::empty();
        registry.register_accessor(v("1.1.0"), hollow_accessor);
        registry.register_accessor(v("1.1.0"), stub);

        assert_eq!(registry.accessor_versions(), vec![v("1.1.0")]);
        assert!(registry.accessor_chain(&v("1.1.0")).is_ok());
    }

    #[test]
    fn dependencies_default_forward_through_builtin_chain() {
        let registry = VersionRegistry::builtin();
        let chain = registry.accessor_chain(&v("1.2.1")).unwrap();
        // v1.2.1 does not own the dependencies op; the call lands on the
        // v1.2.0 handler, which reads the unified block.
        let deps: RawDependencies = chain.dependencies(&Document::new()).unwrap();
        assert!(deps.is_empty());
    }
}
