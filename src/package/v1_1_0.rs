//! Handlers for package schema version 1.1.0.
//!
//! The oldest supported version, and therefore the terminal node of every
//! chain: each handler implements its family's full contract directly.
//! Dependencies are declared as two split arrays (`platform_dependencies`,
//! `language_dependencies`), the entry point is a single string, and local
//! dependencies are marked with `"source": "local"`.

use serde_json::Value;

use crate::chain::{AccessorOp, PackageAccessor, RawDependencies, ValidatorHandler};
use crate::error::{ChainError, ValidateError};
use crate::types::{
    json_type_name, Concern, ConcernResult, Dependency, DependencyCategory, Document, EntryPoints,
    ValidationContext,
};
use crate::version::VersionId;

use super::{
    check_dependency_cycles, check_platform_dependency, package_label, parse_declared_constraint,
    read_dependency_list, SchemaConformance,
};

fn version() -> VersionId {
    VersionId::new(1, 1, 0)
}

/// Constructor registered with the version registry.
pub fn validator(next: Option<Box<dyn ValidatorHandler>>) -> Box<dyn ValidatorHandler> {
    Box::new(Validator {
        version: version(),
        schema: SchemaConformance::package(version()),
        dependencies: SplitDependencyCheck,
        entry_point: SingleEntryPointCheck,
        tools: DeclaredToolsCheck,
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

/// Validator for v1.1.0 manifests. Terminal: owns every concern.
struct Validator {
    version: VersionId,
    schema: SchemaConformance,
    dependencies: SplitDependencyCheck,
    entry_point: SingleEntryPointCheck,
    tools: DeclaredToolsCheck,
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
        &Concern::ALL
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

    fn check_entry_point(
        &self,
        doc: &Document,
        _ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        Ok(self.entry_point.check(doc))
    }

    fn check_tools(
        &self,
        doc: &Document,
        _ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        Ok(self.tools.check(doc))
    }
}

/// Dependency strategy for the split-array shape.
struct SplitDependencyCheck;

impl SplitDependencyCheck {
    fn check(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        let mut errors = Vec::new();

        if let Some(value) = doc.get("language_dependencies") {
            for dep in read_dependency_list(value, "language_dependencies", &mut errors) {
                parse_declared_constraint(&dep, &mut errors);
            }
        }

        let mut seeds = Vec::new();
        if let Some(value) = doc.get("platform_dependencies") {
            for dep in read_dependency_list(value, "platform_dependencies", &mut errors) {
                let constraint = parse_declared_constraint(&dep, &mut errors);

                if is_marked_local(&dep) {
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

fn is_marked_local(dep: &Dependency) -> bool {
    dep.extra.get("source").and_then(Value::as_str) == Some("local")
}

/// Entry-point strategy: a single non-empty string.
struct SingleEntryPointCheck;

impl SingleEntryPointCheck {
    fn check(&self, doc: &Document) -> ConcernResult {
        let errors = match doc.get("entry_point") {
            None => vec!["no entry_point declared".to_string()],
            Some(Value::String(s)) if s.is_empty() => {
                vec!["entry_point must not be empty".to_string()]
            }
            Some(Value::String(_)) => Vec::new(),
            Some(other) => vec![format!(
                "entry_point must be a string, got {}",
                json_type_name(other)
            )],
        };
        ConcernResult::from_errors(Concern::EntryPoint, errors)
    }
}

/// Tools strategy: every declared tool carries a unique non-empty name,
/// and tools require an entry point to be exported from.
struct DeclaredToolsCheck;

impl DeclaredToolsCheck {
    fn check(&self, doc: &Document) -> ConcernResult {
        let mut errors = Vec::new();
        let tools = doc
            .get("tools")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if tools.is_empty() {
            return ConcernResult::passed(Concern::Tools);
        }

        if doc.get("entry_point").is_none() {
            errors.push("tools declared without an entry point".to_string());
        }

        let mut seen = Vec::new();
        for (index, tool) in tools.iter().enumerate() {
            let name = tool.get("name").and_then(Value::as_str).unwrap_or("");
            if name.is_empty() {
                errors.push(format!("tools[{index}] is missing a name"));
                continue;
            }
            if seen.contains(&name) {
                errors.push(format!("duplicate tool \"{name}\""));
            }
            seen.push(name);
        }

        ConcernResult::from_errors(Concern::Tools, errors)
    }
}

/// Metadata accessor for v1.1.0 manifests. Terminal: implements every
/// operation.
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
        &AccessorOp::ALL
    }

    fn field(&self, doc: &Document, name: &str) -> Result<Option<Value>, ChainError> {
        Ok(doc.get(name).cloned())
    }

    fn dependencies(&self, doc: &Document) -> Result<RawDependencies, ChainError> {
        let mut deps = RawDependencies::new();

        let read = |field: &str| -> Vec<Dependency> {
            doc.get(field)
                .and_then(Value::as_array)
                .map(|entries| entries.iter().filter_map(Dependency::from_value).collect())
                .unwrap_or_default()
        };

        let platform = read("platform_dependencies");
        if !platform.is_empty() {
            deps.insert(DependencyCategory::PlatformPackage, platform);
        }
        let language = read("language_dependencies");
        if !language.is_empty() {
            deps.insert(DependencyCategory::LanguagePackage, language);
        }
        Ok(deps)
    }

    fn entry_points(&self, doc: &Document) -> Result<EntryPoints, ChainError> {
        Ok(EntryPoints {
            server: doc
                .get("entry_point")
                .and_then(Value::as_str)
                .map(String::from),
            wrapper: None,
        })
    }

    fn is_local(&self, dep: &Dependency) -> Result<bool, ChainError> {
        Ok(is_marked_local(dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{builtin_provider, JsonSchemaChecker};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn manifest() -> Document {
        doc(json!({
            "package_schema_version": "1.1.0",
            "name": "analysis-toolkit",
            "version": "0.4.0",
            "entry_point": "server.py",
            "tools": [{"name": "summarize"}],
            "platform_dependencies": [
                {"name": "base-toolkit", "constraint": ">=1.0.0"}
            ],
            "language_dependencies": [
                {"name": "requests", "constraint": ">=2.0.0"}
            ]
        }))
    }

    #[test]
    fn valid_manifest_passes_every_concern() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let outcome = chain.validate(&manifest(), &ctx).unwrap();
        assert!(outcome.overall, "{:?}", outcome);
    }

    #[test]
    fn schema_violation_is_reported_not_fatal() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let mut bad = manifest();
        bad.remove("version");
        let outcome = chain.validate(&bad, &ctx).unwrap();
        assert!(!outcome.overall);
        assert!(!outcome.concern(Concern::Schema).unwrap().valid);
        // Other concerns are still evaluated.
        assert!(outcome.concern(Concern::EntryPoint).unwrap().valid);
    }

    #[test]
    fn malformed_constraint_is_a_finding() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let mut bad = manifest();
        bad.insert(
            "language_dependencies".into(),
            json!([{"name": "requests", "constraint": "banana"}]),
        );
        let outcome = chain.validate(&bad, &ctx).unwrap();
        let deps = outcome.concern(Concern::Dependencies).unwrap();
        assert!(!deps.valid);
        assert!(deps.errors[0].contains("requests"));
    }

    #[test]
    fn local_dependency_policy_enforced() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker).allow_local_dependencies(false);
        let chain = validator(None);

        let mut bad = manifest();
        bad.insert(
            "platform_dependencies".into(),
            json!([{"name": "dev-toolkit", "source": "local"}]),
        );
        let outcome = chain.validate(&bad, &ctx).unwrap();
        let deps = outcome.concern(Concern::Dependencies).unwrap();
        assert!(!deps.valid);
        assert!(deps.errors[0].contains("dev-toolkit"));
    }

    #[test]
    fn local_dependency_allowed_by_default() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let mut m = manifest();
        m.insert(
            "platform_dependencies".into(),
            json!([{"name": "dev-toolkit", "source": "local"}]),
        );
        let outcome = chain.validate(&m, &ctx).unwrap();
        assert!(outcome.concern(Concern::Dependencies).unwrap().valid);
    }

    #[test]
    fn missing_entry_point_fails_two_concerns() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let mut bad = manifest();
        bad.remove("entry_point");
        let outcome = chain.validate(&bad, &ctx).unwrap();
        assert!(!outcome.concern(Concern::EntryPoint).unwrap().valid);
        assert!(!outcome.concern(Concern::Tools).unwrap().valid);
    }

    #[test]
    fn duplicate_tools_rejected() {
        let provider = builtin_provider();
        let checker = JsonSchemaChecker;
        let ctx = ValidationContext::new(&provider, &checker);
        let chain = validator(None);

        let mut bad = manifest();
        bad.insert(
            "tools".into(),
            json!([{"name": "summarize"}, {"name": "summarize"}]),
        );
        let outcome = chain.validate(&bad, &ctx).unwrap();
        let tools = outcome.concern(Concern::Tools).unwrap();
        assert!(!tools.valid);
        assert!(tools.errors[0].contains("duplicate"));
    }

    #[test]
    fn accessor_reads_split_dependencies() {
        let chain = accessor(None);
        let deps = chain.dependencies(&manifest()).unwrap();
        assert_eq!(
            deps.get(&DependencyCategory::PlatformPackage).unwrap()[0].name,
            "base-toolkit"
        );
        assert_eq!(
            deps.get(&DependencyCategory::LanguagePackage).unwrap()[0].name,
            "requests"
        );
        assert!(!deps.contains_key(&DependencyCategory::SystemPackage));
    }

    #[test]
    fn accessor_single_entry_point() {
        let chain = accessor(None);
        let eps = chain.entry_points(&manifest()).unwrap();
        assert_eq!(eps.server.as_deref(), Some("server.py"));
        assert_eq!(eps.wrapper, None);
    }

    #[test]
    fn accessor_local_marker() {
        let chain = accessor(None);
        let mut dep = Dependency::new("dev-toolkit");
        dep.extra
            .insert("source".into(), Value::String("local".into()));
        assert!(chain.is_local(&dep).unwrap());
        assert!(!chain.is_local(&Dependency::new("other")).unwrap());
    }
}
