//! Schema capabilities: providing schema documents and checking documents
//! against them.
//!
//! The validation core consumes both as traits. Structural JSON-Schema
//! evaluation and schema distribution stay outside the delegation engine;
//! this module ships the default implementations the CLI and tests use.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::SchemaUnavailable;
use crate::version::VersionId;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for remote schema fetches (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Which document family a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Package,
    Registry,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Package => "package",
            SchemaKind::Registry => "registry",
        }
    }
}

/// Supplies the schema document for a `(kind, version)` pair.
pub trait SchemaProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `SchemaUnavailable` when no schema can be supplied; the
    /// caller propagates it without retrying.
    fn get_schema(&self, kind: SchemaKind, version: &VersionId)
        -> Result<Value, SchemaUnavailable>;
}

/// Checks a document against a schema, returning violation messages.
///
/// An empty list means the document conforms. Violations are ordered and
/// deterministic for a given document/schema pair.
pub trait SchemaChecker: Send + Sync {
    fn check(&self, document: &Value, schema: &Value) -> Vec<String>;
}

/// `SchemaChecker` backed by the `jsonschema` crate.
///
/// Violation strings are formatted `"<instance path>: <message>"`. A schema
/// that fails to compile is itself reported as a single violation rather
/// than panicking, since a handler-supplied schema is configuration data.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaChecker;

impl SchemaChecker for JsonSchemaChecker {
    fn check(&self, document: &Value, schema: &Value) -> Vec<String> {
        let validator = match jsonschema::validator_for(schema) {
            Ok(v) => v,
            Err(e) => return vec![format!("invalid schema: {e}")],
        };

        validator
            .iter_errors(document)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect()
    }
}

/// In-memory `(kind, version) -> schema` map.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    schemas: HashMap<(SchemaKind, VersionId), Value>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: SchemaKind, version: VersionId, schema: Value) {
        self.schemas.insert((kind, version), schema);
    }

    pub fn with_schema(mut self, kind: SchemaKind, version: VersionId, schema: Value) -> Self {
        self.insert(kind, version, schema);
        self
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn get_schema(
        &self,
        kind: SchemaKind,
        version: &VersionId,
    ) -> Result<Value, SchemaUnavailable> {
        self.schemas
            .get(&(kind, version.clone()))
            .cloned()
            .ok_or_else(|| SchemaUnavailable {
                kind: kind.as_str(),
                version: version.to_string(),
                reason: "not present in provider".to_string(),
            })
    }
}

/// The schema documents bundled with this crate, one per registered
/// handler version.
pub fn builtin_provider() -> StaticSchemaProvider {
    fn parse(source: &str) -> Value {
        // Bundled schemas are part of the crate; a parse failure is a
        // packaging defect caught by the provider tests.
        serde_json::from_str(source).expect("bundled schema is valid JSON")
    }

    StaticSchemaProvider::new()
        .with_schema(
            SchemaKind::Package,
            VersionId::new(1, 1, 0),
            parse(include_str!("schemas/package_schema_v1.1.0.json")),
        )
        .with_schema(
            SchemaKind::Package,
            VersionId::new(1, 2, 0),
            parse(include_str!("schemas/package_schema_v1.2.0.json")),
        )
        .with_schema(
            SchemaKind::Package,
            VersionId::new(1, 2, 1),
            parse(include_str!("schemas/package_schema_v1.2.1.json")),
        )
        .with_schema(
            SchemaKind::Registry,
            VersionId::new(1, 1, 0),
            parse(include_str!("schemas/registry_schema_v1.1.0.json")),
        )
}

/// Reads schemas from `<root>/<kind>_schema_v<version>.json`.
#[derive(Debug, Clone)]
pub struct FileSchemaProvider {
    root: PathBuf,
}

impl FileSchemaProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSchemaProvider { root: root.into() }
    }

    fn schema_path(&self, kind: SchemaKind, version: &VersionId) -> PathBuf {
        self.root
            .join(format!("{}_schema_v{}.json", kind.as_str(), version))
    }
}

impl SchemaProvider for FileSchemaProvider {
    fn get_schema(
        &self,
        kind: SchemaKind,
        version: &VersionId,
    ) -> Result<Value, SchemaUnavailable> {
        let path = self.schema_path(kind, version);
        let content =
            std::fs::read_to_string(&path).map_err(|e| SchemaUnavailable {
                kind: kind.as_str(),
                version: version.to_string(),
                reason: format!("cannot read {}: {e}", path.display()),
            })?;

        serde_json::from_str(&content).map_err(|e| SchemaUnavailable {
            kind: kind.as_str(),
            version: version.to_string(),
            reason: format!("invalid JSON in {}: {e}", path.display()),
        })
    }
}

/// Fetches schemas from `<base>/<kind>/v<version>/schema.json`.
///
/// Requires the `remote` feature (enabled by default). Failures surface as
/// `SchemaUnavailable`; the core never retries.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct RemoteSchemaProvider {
    base_url: String,
}

#[cfg(feature = "remote")]
impl RemoteSchemaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        RemoteSchemaProvider {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn schema_url(&self, kind: SchemaKind, version: &VersionId) -> String {
        format!("{}/{}/v{}/schema.json", self.base_url, kind.as_str(), version)
    }
}

#[cfg(feature = "remote")]
impl SchemaProvider for RemoteSchemaProvider {
    fn get_schema(
        &self,
        kind: SchemaKind,
        version: &VersionId,
    ) -> Result<Value, SchemaUnavailable> {
        let url = self.schema_url(kind, version);
        let unavailable = |reason: String| SchemaUnavailable {
            kind: kind.as_str(),
            version: version.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        let response = client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| unavailable(format!("fetching {url}: {e}")))?;

        response
            .json()
            .map_err(|e| unavailable(format!("decoding {url}: {e}")))
    }
}
