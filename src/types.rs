//! Core types for manifest validation.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::VersionError;
use crate::provider::{SchemaChecker, SchemaProvider};
use crate::registry::RegistryService;
use crate::version::VersionId;

/// A manifest or registry-index document: an ordered, unique-key JSON
/// mapping. The core never mutates an input document.
pub type Document = Map<String, Value>;

/// Manifest field declaring the package schema version.
pub const PACKAGE_SCHEMA_VERSION_FIELD: &str = "package_schema_version";

/// Registry-index field declaring the registry schema version.
pub const REGISTRY_SCHEMA_VERSION_FIELD: &str = "registry_schema_version";

/// Policy constant: the schema version assumed for documents that declare
/// none. Pinned to the oldest supported version, never inferred from
/// registry contents.
pub fn default_schema_version() -> VersionId {
    VersionId::new(1, 1, 0)
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read a declared schema version field from a document.
///
/// Returns `Ok(None)` when the field is absent (callers apply their
/// fallback policy), and `InvalidVersionFormat` when it is present but not
/// a parseable version string.
pub fn declared_version(doc: &Document, field: &str) -> Result<Option<VersionId>, VersionError> {
    match doc.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => VersionId::parse(s).map(Some),
        Some(other) => Err(VersionError::InvalidVersionFormat {
            input: format!("{field}: {other}"),
            reason: format!("expected string, got {}", json_type_name(other)),
        }),
    }
}

/// Canonical dependency categories.
///
/// Older schema shapes only know a subset; the assembler fills the gaps
/// with empty lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyCategory {
    PlatformPackage,
    LanguagePackage,
    SystemPackage,
    ContainerImage,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 4] = [
        DependencyCategory::PlatformPackage,
        DependencyCategory::LanguagePackage,
        DependencyCategory::SystemPackage,
        DependencyCategory::ContainerImage,
    ];

    /// The category's key in unified dependency blocks.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyCategory::PlatformPackage => "platform-package",
            DependencyCategory::LanguagePackage => "language-package",
            DependencyCategory::SystemPackage => "system-package",
            DependencyCategory::ContainerImage => "container-image",
        }
    }

    /// Parse a unified-block key.
    ///
    /// Returns `None` for unknown categories (caller reports).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "platform-package" => Some(DependencyCategory::PlatformPackage),
            "language-package" => Some(DependencyCategory::LanguagePackage),
            "system-package" => Some(DependencyCategory::SystemPackage),
            "container-image" => Some(DependencyCategory::ContainerImage),
            _ => None,
        }
    }
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    pub name: String,
    /// Raw constraint expression; parsed on use so a malformed constraint
    /// is a reportable finding, not a type-level impossibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    /// Any further per-entry metadata from the document.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            constraint: None,
            extra: Map::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Read a dependency from a document entry. `None` when the entry is
    /// not an object with a string `name`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?.to_string();
        let constraint = obj
            .get("constraint")
            .and_then(Value::as_str)
            .map(String::from);
        let extra: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "name" && k.as_str() != "constraint")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Dependency {
            name,
            constraint,
            extra,
        })
    }
}

/// Normalized dependency view: every canonical category present, ordered
/// lists, absent categories empty. Produced fresh per assembly call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyView {
    #[serde(rename = "platform-package")]
    pub platform: Vec<Dependency>,
    #[serde(rename = "language-package")]
    pub language: Vec<Dependency>,
    #[serde(rename = "system-package")]
    pub system: Vec<Dependency>,
    #[serde(rename = "container-image")]
    pub container: Vec<Dependency>,
}

impl DependencyView {
    pub fn get(&self, category: DependencyCategory) -> &[Dependency] {
        match category {
            DependencyCategory::PlatformPackage => &self.platform,
            DependencyCategory::LanguagePackage => &self.language,
            DependencyCategory::SystemPackage => &self.system,
            DependencyCategory::ContainerImage => &self.container,
        }
    }

    pub fn get_mut(&mut self, category: DependencyCategory) -> &mut Vec<Dependency> {
        match category {
            DependencyCategory::PlatformPackage => &mut self.platform,
            DependencyCategory::LanguagePackage => &mut self.language,
            DependencyCategory::SystemPackage => &mut self.system,
            DependencyCategory::ContainerImage => &mut self.container,
        }
    }

    pub fn is_empty(&self) -> bool {
        DependencyCategory::ALL
            .iter()
            .all(|c| self.get(*c).is_empty())
    }
}

/// Normalized entry-point declaration.
///
/// Single-entry-point manifests fill only `server`; dual-entry-point
/// manifests (1.2.1 and later) fill both.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryPoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,
}

/// Validation concerns, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Concern {
    Schema,
    Dependencies,
    EntryPoint,
    Tools,
}

impl Concern {
    pub const ALL: [Concern; 4] = [
        Concern::Schema,
        Concern::Dependencies,
        Concern::EntryPoint,
        Concern::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Concern::Schema => "schema",
            Concern::Dependencies => "dependencies",
            Concern::EntryPoint => "entry-point",
            Concern::Tools => "tools",
        }
    }
}

/// Result of one concern's check.
#[derive(Debug, Clone, Serialize)]
pub struct ConcernResult {
    pub concern: Concern,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ConcernResult {
    pub fn passed(concern: Concern) -> Self {
        ConcernResult {
            concern,
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(concern: Concern, errors: Vec<String>) -> Self {
        ConcernResult {
            concern,
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Aggregated validation outcome: one per call, never reused.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub overall: bool,
    pub concerns: Vec<ConcernResult>,
}

impl Outcome {
    pub fn from_concerns(concerns: Vec<ConcernResult>) -> Self {
        Outcome {
            overall: concerns.iter().all(|c| c.valid),
            concerns,
        }
    }

    /// The result for a single concern, if it was evaluated.
    pub fn concern(&self, concern: Concern) -> Option<&ConcernResult> {
        self.concerns.iter().find(|c| c.concern == concern)
    }

    /// All error messages, in concern order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.concerns
            .iter()
            .flat_map(|c| c.errors.iter().map(String::as_str))
    }
}

/// Request-scoped validation state.
///
/// Owned by exactly one validation call: carries the schema capabilities,
/// an optional registry snapshot view, and traversal policy. Never shared
/// across concurrent calls.
pub struct ValidationContext<'a> {
    pub schemas: &'a dyn SchemaProvider,
    pub checker: &'a dyn SchemaChecker,
    pub registry: Option<&'a RegistryService>,
    pub allow_local_dependencies: bool,
    pub max_graph_depth: usize,
    /// Version assumed when a document declares none; see
    /// [`default_schema_version`].
    pub default_version: VersionId,
}

impl<'a> ValidationContext<'a> {
    /// Default bound on dependency-graph traversal depth.
    pub const DEFAULT_MAX_GRAPH_DEPTH: usize = 32;

    pub fn new(schemas: &'a dyn SchemaProvider, checker: &'a dyn SchemaChecker) -> Self {
        ValidationContext {
            schemas,
            checker,
            registry: None,
            allow_local_dependencies: true,
            max_graph_depth: Self::DEFAULT_MAX_GRAPH_DEPTH,
            default_version: default_schema_version(),
        }
    }

    pub fn with_registry(mut self, registry: &'a RegistryService) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn allow_local_dependencies(mut self, allow: bool) -> Self {
        self.allow_local_dependencies = allow;
        self
    }

    pub fn max_graph_depth(mut self, depth: usize) -> Self {
        self.max_graph_depth = depth;
        self
    }

    pub fn default_version(mut self, version: VersionId) -> Self {
        self.default_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_round_trip() {
        for category in DependencyCategory::ALL {
            assert_eq!(DependencyCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(DependencyCategory::parse("npm-package"), None);
    }

    #[test]
    fn dependency_from_value() {
        let dep = Dependency::from_value(&json!({
            "name": "toolkit",
            "constraint": ">=1.0.0",
            "source": "registry"
        }))
        .unwrap();
        assert_eq!(dep.name, "toolkit");
        assert_eq!(dep.constraint.as_deref(), Some(">=1.0.0"));
        assert_eq!(dep.extra.get("source"), Some(&json!("registry")));
    }

    #[test]
    fn dependency_from_value_rejects_nameless() {
        assert!(Dependency::from_value(&json!({"constraint": ">=1.0.0"})).is_none());
        assert!(Dependency::from_value(&json!("toolkit")).is_none());
    }

    #[test]
    fn declared_version_absent() {
        let doc = Document::new();
        assert!(declared_version(&doc, PACKAGE_SCHEMA_VERSION_FIELD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn declared_version_with_marker() {
        let mut doc = Document::new();
        doc.insert(
            PACKAGE_SCHEMA_VERSION_FIELD.to_string(),
            json!("v1.2.0"),
        );
        assert_eq!(
            declared_version(&doc, PACKAGE_SCHEMA_VERSION_FIELD)
                .unwrap()
                .unwrap(),
            VersionId::new(1, 2, 0)
        );
    }

    #[test]
    fn declared_version_wrong_type() {
        let mut doc = Document::new();
        doc.insert(PACKAGE_SCHEMA_VERSION_FIELD.to_string(), json!(120));
        assert!(declared_version(&doc, PACKAGE_SCHEMA_VERSION_FIELD).is_err());
    }

    #[test]
    fn outcome_overall_is_conjunction() {
        let outcome = Outcome::from_concerns(vec![
            ConcernResult::passed(Concern::Schema),
            ConcernResult::from_errors(Concern::Dependencies, vec!["missing".into()]),
        ]);
        assert!(!outcome.overall);
        assert!(outcome.concern(Concern::Schema).unwrap().valid);
        assert_eq!(outcome.errors().collect::<Vec<_>>(), vec!["missing"]);
    }

    #[test]
    fn outcome_all_valid() {
        let outcome = Outcome::from_concerns(
            Concern::ALL.iter().map(|c| ConcernResult::passed(*c)).collect(),
        );
        assert!(outcome.overall);
    }
}
