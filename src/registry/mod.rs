//! Registry-index handlers and the version-independent `RegistryService`
//! facade.
//!
//! A registry index lists repositories, their packages, and each package's
//! published versions. Indexes declare `registry_schema_version`; the
//! accessor chain adapts structural differences between index versions so
//! callers never branch on them.

pub mod v1_1_0;

use crate::builder::VersionRegistry;
use crate::chain::{RawDependencies, RegistryAccessor};
use crate::error::{AssembleError, ChainError, ValidateError};
use crate::types::{
    declared_version, default_schema_version, Document, REGISTRY_SCHEMA_VERSION_FIELD,
};
use crate::version::{Constraint, VersionId};

/// Version-independent access to one registry-index document.
///
/// Immutable after construction: safe to share across threads and across
/// many validation calls.
pub struct RegistryService {
    doc: Document,
    accessor: Box<dyn RegistryAccessor>,
    version: VersionId,
}

impl RegistryService {
    /// Bind `doc` to the accessor chain for its declared index version.
    ///
    /// # Errors
    ///
    /// `InvalidVersionFormat` for a malformed declaration, `UnknownVersion`
    /// when no registered accessor handles it.
    pub fn new(doc: Document, registry: &VersionRegistry) -> Result<Self, ValidateError> {
        let version = declared_version(&doc, REGISTRY_SCHEMA_VERSION_FIELD)?
            .unwrap_or_else(default_schema_version);
        let accessor = registry.registry_accessor_chain(&version)?;
        Ok(RegistryService {
            doc,
            accessor,
            version,
        })
    }

    /// The index's declared schema version.
    pub fn schema_version(&self) -> &VersionId {
        &self.version
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Repository names in the index.
    pub fn repositories(&self) -> Result<Vec<String>, ChainError> {
        self.accessor.repositories(&self.doc)
    }

    /// All package names across repositories.
    pub fn package_names(&self) -> Result<Vec<String>, ChainError> {
        self.accessor.package_names(&self.doc)
    }

    /// Whether `name` exists, optionally within one repository.
    pub fn package_exists(&self, name: &str, repo: Option<&str>) -> Result<bool, ChainError> {
        self.accessor.package_exists(&self.doc, name, repo)
    }

    /// Published versions of `name`, unordered.
    pub fn package_versions(&self, name: &str) -> Result<Vec<VersionId>, AssembleError> {
        self.accessor.package_versions(&self.doc, name)
    }

    /// The highest published version of `name`.
    pub fn latest_version(&self, name: &str) -> Result<VersionId, AssembleError> {
        let versions = self.package_versions(name)?;
        versions
            .into_iter()
            .max()
            .ok_or_else(|| {
                crate::error::ResolveError::PackageNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// The highest published version of `name` satisfying `constraint`.
    pub fn find_compatible_version(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> Result<VersionId, AssembleError> {
        self.accessor
            .find_compatible_version(&self.doc, name, constraint)
    }

    /// Effective dependency set of `name` at `version`.
    pub fn package_dependencies(
        &self,
        name: &str,
        version: &VersionId,
    ) -> Result<RawDependencies, AssembleError> {
        self.accessor
            .package_dependencies(&self.doc, name, version)
    }

    /// Download location of `name` at `version`.
    pub fn package_uri(&self, name: &str, version: &VersionId) -> Result<String, AssembleError> {
        self.accessor.package_uri(&self.doc, name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn index() -> Document {
        doc(json!({
            "registry_schema_version": "1.1.0",
            "repositories": [
                {
                    "name": "main",
                    "packages": [
                        {
                            "name": "base-toolkit",
                            "versions": [
                                {"version": "1.0.0"},
                                {"version": "1.2.0"}
                            ]
                        }
                    ]
                }
            ]
        }))
    }

    #[test]
    fn service_detects_index_version() {
        let registry = VersionRegistry::builtin();
        let service = RegistryService::new(index(), &registry).unwrap();
        assert_eq!(service.schema_version(), &VersionId::new(1, 1, 0));
    }

    #[test]
    fn service_accepts_patch_revved_index() {
        let registry = VersionRegistry::builtin();
        let mut idx = index();
        idx.insert("registry_schema_version".into(), json!("1.1.4"));
        assert!(RegistryService::new(idx, &registry).is_ok());
    }

    #[test]
    fn service_rejects_unknown_index_version() {
        let registry = VersionRegistry::builtin();
        let mut idx = index();
        idx.insert("registry_schema_version".into(), json!("2.0.0"));
        assert!(matches!(
            RegistryService::new(idx, &registry),
            Err(ValidateError::Chain(ChainError::UnknownVersion { .. }))
        ));
    }

    #[test]
    fn service_defaults_missing_declaration() {
        let registry = VersionRegistry::builtin();
        let mut idx = index();
        idx.remove("registry_schema_version");
        let service = RegistryService::new(idx, &registry).unwrap();
        assert_eq!(service.schema_version(), &VersionId::new(1, 1, 0));
    }

    #[test]
    fn latest_version_is_maximal() {
        let registry = VersionRegistry::builtin();
        let service = RegistryService::new(index(), &registry).unwrap();
        assert_eq!(
            service.latest_version("base-toolkit").unwrap(),
            VersionId::new(1, 2, 0)
        );
    }

    #[test]
    fn latest_version_of_unknown_package() {
        let registry = VersionRegistry::builtin();
        let service = RegistryService::new(index(), &registry).unwrap();
        assert!(matches!(
            service.latest_version("ghost"),
            Err(AssembleError::Resolve(ResolveError::PackageNotFound { .. }))
        ));
    }
}
