//! Manifest Schema Validator
//!
//! Version-aware validation of package manifests and registry indexes.
//!
//! Manifest schemas evolve: required fields appear, dependency blocks get
//! restructured, entry points change shape. Documents written against old
//! schema versions must keep validating, and field access must keep
//! working, without callers branching on version strings. This library
//! routes every request through a chain of version handlers ordered newest
//! to oldest: each handler implements only what changed in its version and
//! forwards everything else to its predecessor.
//!
//! # Example
//!
//! ```
//! use manifest_schema::{builtin_provider, Orchestrator};
//! use serde_json::json;
//!
//! let orchestrator = Orchestrator::new(Box::new(builtin_provider()));
//!
//! let manifest = json!({
//!     "package_schema_version": "1.2.0",
//!     "name": "analysis-toolkit",
//!     "version": "0.5.0",
//!     "entry_point": "server.py",
//!     "dependencies": {
//!         "language-package": [
//!             { "name": "requests", "constraint": ">=2.0.0" }
//!         ]
//!     }
//! });
//! let manifest = manifest.as_object().cloned().unwrap();
//!
//! let outcome = orchestrator.validate_package(&manifest).unwrap();
//! assert!(outcome.overall);
//! ```
//!
//! # Handler chains
//!
//! Three handler families share the delegation shape: document validators,
//! manifest metadata accessors, and registry-index accessors. A chain for
//! schema version 1.2.1 holds the 1.2.1, 1.2.0, and 1.1.0 handlers in that
//! order; an operation unchanged since 1.1.0 is answered by the terminal
//! handler no matter which version the document declares. The oldest
//! handler implements every operation — the chain builder rejects a
//! registry where it doesn't.
//!
//! # Concerns
//!
//! Validation covers four concerns, reported independently and aggregated
//! into one [`Outcome`]: JSON-Schema conformance, dependency declarations
//! (constraint syntax, registry existence and satisfiability, cycle
//! detection), the entry-point shape, and declared tools. A failing
//! concern never suppresses the others' reports; only structural errors
//! (unknown version, misconfigured chain, unavailable schema) abort a
//! call.

mod assembler;
mod builder;
mod chain;
mod error;
mod loader;
mod orchestrator;
mod package;
mod provider;
mod registry;
mod types;
mod version;

pub use assembler::{assemble, transitive_closure, ClosureOptions, PackageRef};
pub use builder::{AccessorCtor, RegistryAccessorCtor, ValidatorCtor, VersionRegistry};
pub use chain::{
    AccessorOp, PackageAccessor, RawDependencies, RegistryAccessor, RegistryOp, ValidatorHandler,
};
pub use error::{
    AssembleError, ChainError, GraphError, LoadError, ResolveError, SchemaUnavailable,
    ValidateError, VersionError,
};
pub use loader::{is_url, load_document, load_document_auto, load_document_str};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use package::PackageService;
pub use provider::{
    builtin_provider, FileSchemaProvider, JsonSchemaChecker, SchemaChecker, SchemaKind,
    SchemaProvider, StaticSchemaProvider,
};
pub use registry::RegistryService;
pub use types::{
    declared_version, default_schema_version, json_type_name, Concern, ConcernResult, Dependency,
    DependencyCategory, DependencyView, Document, EntryPoints, Outcome, ValidationContext,
    PACKAGE_SCHEMA_VERSION_FIELD, REGISTRY_SCHEMA_VERSION_FIELD,
};
pub use version::{find_compatible, Constraint, VersionId};

#[cfg(feature = "remote")]
pub use loader::load_document_url;

#[cfg(feature = "remote")]
pub use provider::RemoteSchemaProvider;
