//! Top-level validation entry point.
//!
//! The orchestrator binds together the handler registry, the schema
//! capabilities, an optional registry-index snapshot, and validation
//! policy. Each `validate_package` call detects the document's declared
//! version, fetches or builds the validator chain for it, and runs the
//! chain with a fresh request-scoped context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::builder::VersionRegistry;
use crate::chain::ValidatorHandler;
use crate::error::ValidateError;
use crate::provider::{JsonSchemaChecker, SchemaChecker, SchemaProvider};
use crate::registry::RegistryService;
use crate::types::{
    declared_version, default_schema_version, Document, Outcome, ValidationContext,
    PACKAGE_SCHEMA_VERSION_FIELD,
};
use crate::version::VersionId;

/// Validation policy.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Whether locally-resolved (filesystem) dependencies are permitted.
    pub allow_local_dependencies: bool,
    /// Bound on dependency-graph traversal depth.
    pub max_graph_depth: usize,
    /// Version assumed for documents that declare none. The stated policy
    /// is the oldest supported version.
    pub default_version: VersionId,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        OrchestratorOptions {
            allow_local_dependencies: true,
            max_graph_depth: ValidationContext::DEFAULT_MAX_GRAPH_DEPTH,
            default_version: default_schema_version(),
        }
    }
}

/// Version-independent package validation.
///
/// Immutable after construction; chains are cached per target version and
/// shared, so one orchestrator can serve concurrent callers, each call on
/// its own context and outcome.
pub struct Orchestrator {
    registry: VersionRegistry,
    schemas: Box<dyn SchemaProvider>,
    checker: Box<dyn SchemaChecker>,
    package_registry: Option<RegistryService>,
    options: OrchestratorOptions,
    chains: Mutex<HashMap<VersionId, Arc<dyn ValidatorHandler>>>,
}

impl Orchestrator {
    /// An orchestrator over the built-in handler versions and bundled
    /// schemas.
    pub fn new(schemas: Box<dyn SchemaProvider>) -> Self {
        Orchestrator {
            registry: VersionRegistry::builtin(),
            schemas,
            checker: Box::new(JsonSchemaChecker),
            package_registry: None,
            options: OrchestratorOptions::default(),
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the handler registry (tests and embedders with custom
    /// version sets).
    pub fn with_registry(mut self, registry: VersionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the schema checker.
    pub fn with_checker(mut self, checker: Box<dyn SchemaChecker>) -> Self {
        self.checker = checker;
        self
    }

    /// Attach a registry-index snapshot for dependency validation.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot's declared index version has no registered
    /// accessor.
    pub fn with_package_registry(mut self, index: Document) -> Result<Self, ValidateError> {
        self.package_registry = Some(RegistryService::new(index, &self.registry)?);
        Ok(self)
    }

    /// Set validation policy.
    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// The attached registry-index view, if any.
    pub fn package_registry(&self) -> Option<&RegistryService> {
        self.package_registry.as_ref()
    }

    /// The handler registry in use.
    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Validate one manifest document.
    ///
    /// # Errors
    ///
    /// Structural and configuration errors only: `InvalidVersionFormat`
    /// for a malformed version declaration, `UnknownVersion` for an
    /// unregistered one, `UnsupportedOperation` for a misconfigured chain,
    /// and `SchemaUnavailable` propagated from the provider. Every
    /// data-quality finding is reported inside the returned [`Outcome`].
    pub fn validate_package(&self, doc: &Document) -> Result<Outcome, ValidateError> {
        let target = declared_version(doc, PACKAGE_SCHEMA_VERSION_FIELD)?
            .unwrap_or_else(|| self.options.default_version.clone());

        let chain = self.chain_for(&target)?;

        let mut ctx = ValidationContext::new(self.schemas.as_ref(), self.checker.as_ref())
            .allow_local_dependencies(self.options.allow_local_dependencies)
            .max_graph_depth(self.options.max_graph_depth)
            .default_version(self.options.default_version.clone());
        if let Some(registry) = &self.package_registry {
            ctx = ctx.with_registry(registry);
        }

        chain.validate(doc, &ctx)
    }

    /// Fetch the cached chain for `target`, building it on first request.
    /// Chains are pure functions of (version, registry contents), so the
    /// cache never invalidates.
    fn chain_for(&self, target: &VersionId) -> Result<Arc<dyn ValidatorHandler>, ValidateError> {
        let mut chains = self.chains.lock().expect("chain cache poisoned");
        if let Some(chain) = chains.get(target) {
            return Ok(chain.clone());
        }
        let chain: Arc<dyn ValidatorHandler> = Arc::from(self.registry.validator_chain(target)?);
        chains.insert(target.clone(), chain.clone());
        Ok(chain)
    }
}
