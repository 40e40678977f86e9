//! Handlers for package schema version 1.2.1.
//!
//! This version introduced the dual entry point: `entry_point` becomes an
//! object declaring both the `server` file and the `wrapper` file, and
//! declared tools are bound to the server entry point. The dependency
//! structure is unchanged from 1.2.0, so that concern delegates down the
//! chain.

use serde_json::Value;

use crate::chain::{AccessorOp, PackageAccessor, ValidatorHandler};
use crate::error::{ChainError, ValidateError};
use crate::types::{
    json_type_name, Concern, ConcernResult, Document, EntryPoints, ValidationContext,
};
use crate::version::VersionId;

use super::SchemaConformance;

fn version() -> VersionId {
    VersionId::new(1, 2, 1)
}

/// Constructor registered with the version registry.
pub fn validator(next: Option<Box<dyn ValidatorHandler>>) -> Box<dyn ValidatorHandler> {
    Box::new(Validator {
        version: version(),
        schema: SchemaConformance::package(version()),
        entry_point: DualEntryPointCheck,
        tools: ServerBoundToolsCheck,
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

/// Validator for v1.2.1 manifests: owns schema conformance, the dual
/// entry-point shape, and server-bound tools; dependency checks forward to
/// v1.2.0.
struct Validator {
    version: VersionId,
    schema: SchemaConformance,
    entry_point: DualEntryPointCheck,
    tools: ServerBoundToolsCheck,
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
        &[Concern::Schema, Concern::EntryPoint, Concern::Tools]
    }

    fn check_schema(
        &self,
        doc: &Document,
        ctx: &ValidationContext<'_>,
    ) -> Result<ConcernResult, ValidateError> {
        self.schema.check(doc, ctx)
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

/// Entry-point strategy: an object declaring both files.
struct DualEntryPointCheck;

impl DualEntryPointCheck {
    fn check(&self, doc: &Document) -> ConcernResult {
        let mut errors = Vec::new();

        match doc.get("entry_point") {
            None => errors.push("no entry_point declared".to_string()),
            Some(Value::Object(block)) => {
                for key in ["server", "wrapper"] {
                    match block.get(key) {
                        None => errors.push(format!("entry_point is missing \"{key}\"")),
                        Some(Value::String(s)) if s.is_empty() => {
                            errors.push(format!("entry_point.{key} must not be empty"));
                        }
                        Some(Value::String(_)) => {}
                        Some(other) => errors.push(format!(
                            "entry_point.{key} must be a string, got {}",
                            json_type_name(other)
                        )),
                    }
                }
            }
            Some(other) => errors.push(format!(
                "entry_point must be an object with \"server\" and \"wrapper\", got {}",
                json_type_name(other)
            )),
        }

        ConcernResult::from_errors(Concern::EntryPoint, errors)
    }
}

/// Tools strategy: unique named tools, each described, exported by the
/// server entry point.
struct ServerBoundToolsCheck;

impl ServerBoundToolsCheck {
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

        let has_server = doc
            .get("entry_point")
            .and_then(Value::as_object)
            .and_then(|block| block.get("server"))
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_server {
            errors.push("tools declared without a server entry point".to_string());
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

            if tool
                .get("description")
                .and_then(Value::as_str)
                .map_or(true, str::is_empty)
            {
                errors.push(format!("tool \"{name}\" is missing a description"));
            }
        }

        ConcernResult::from_errors(Concern::Tools, errors)
    }
}

/// Metadata accessor for v1.2.1 manifests: overrides entry-point access
/// for the dual shape; everything else forwards down the chain.
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
        &[AccessorOp::EntryPoints]
    }

    fn entry_points(&self, doc: &Document) -> Result<EntryPoints, ChainError> {
        let block = doc.get("entry_point").and_then(Value::as_object);
        let get = |key: &str| -> Option<String> {
            block
                .and_then(|b| b.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };
        Ok(EntryPoints {
            server: get("server"),
            wrapper: get("wrapper"),
        })
    }
}
