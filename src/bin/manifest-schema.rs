//! Manifest Schema CLI
//!
//! Command-line interface for validating manifests and resolving package
//! versions against a registry index.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use manifest_schema::{
    builtin_provider, load_document_auto, transitive_closure, ClosureOptions, Constraint,
    FileSchemaProvider, Orchestrator, OrchestratorOptions, PackageService, RegistryService,
    SchemaProvider, ValidationContext, VersionRegistry,
};

#[derive(Parser)]
#[command(name = "manifest-schema")]
#[command(about = "Validate package manifests against versioned schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest document
    Validate {
        /// Manifest source: file path or URL (http:// or https://)
        manifest: String,

        /// Registry index to validate dependencies against
        #[arg(long)]
        registry: Option<String>,

        /// Directory of schema files (default: bundled schemas)
        #[arg(long)]
        schemas_dir: Option<PathBuf>,

        /// Reject locally-resolved dependencies
        #[arg(long)]
        deny_local_deps: bool,

        /// Maximum dependency-graph depth
        #[arg(long, default_value_t = ValidationContext::DEFAULT_MAX_GRAPH_DEPTH)]
        max_depth: usize,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Pick the highest registry version satisfying a constraint
    Resolve {
        /// Package name
        package: String,

        /// Version constraint (e.g. ">=1.0.0")
        constraint: String,

        /// Registry index: file path or URL
        #[arg(long)]
        registry: String,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a manifest's normalized dependency view
    Deps {
        /// Manifest source: file path or URL
        manifest: String,

        /// Registry index, required for --transitive
        #[arg(long)]
        registry: Option<String>,

        /// Also walk the transitive closure of platform dependencies
        #[arg(long, requires = "registry")]
        transitive: bool,

        /// Maximum dependency-graph depth
        #[arg(long, default_value_t = ValidationContext::DEFAULT_MAX_GRAPH_DEPTH)]
        max_depth: usize,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            manifest,
            registry,
            schemas_dir,
            deny_local_deps,
            max_depth,
            json,
        } => run_validate(
            &manifest,
            registry.as_deref(),
            schemas_dir,
            deny_local_deps,
            max_depth,
            json,
        ),

        Commands::Resolve {
            package,
            constraint,
            registry,
            json,
        } => run_resolve(&package, &constraint, &registry, json),

        Commands::Deps {
            manifest,
            registry,
            transitive,
            max_depth,
            pretty,
        } => run_deps(&manifest, registry.as_deref(), transitive, max_depth, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_validate(
    manifest_source: &str,
    registry_source: Option<&str>,
    schemas_dir: Option<PathBuf>,
    deny_local_deps: bool,
    max_depth: usize,
    json: bool,
) -> Result<(), u8> {
    let manifest = load_document_auto(manifest_source).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })?;

    let provider: Box<dyn SchemaProvider> = match schemas_dir {
        Some(dir) => Box::new(FileSchemaProvider::new(dir)),
        None => Box::new(builtin_provider()),
    };

    let options = OrchestratorOptions {
        allow_local_dependencies: !deny_local_deps,
        max_graph_depth: max_depth,
        ..OrchestratorOptions::default()
    };

    let mut orchestrator = Orchestrator::new(provider).with_options(options);
    if let Some(source) = registry_source {
        let index = load_document_auto(source).map_err(|e| {
            report_error(json, &e.to_string());
            e.exit_code() as u8
        })?;
        orchestrator = orchestrator.with_package_registry(index).map_err(|e| {
            report_error(json, &e.to_string());
            e.exit_code() as u8
        })?;
    }

    let outcome = orchestrator.validate_package(&manifest).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
    } else {
        for concern in &outcome.concerns {
            let marker = if concern.valid { "ok" } else { "FAIL" };
            println!("{:12} {}", concern.concern.as_str(), marker);
            for error in &concern.errors {
                println!("    {}", error);
            }
        }
        println!();
        if outcome.overall {
            println!("Valid");
        } else {
            let count = outcome.errors().count();
            println!("Invalid: {count} error(s)");
        }
    }

    if outcome.overall {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_resolve(package: &str, constraint: &str, registry_source: &str, json: bool) -> Result<(), u8> {
    let index = load_document_auto(registry_source).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })?;

    let registry = VersionRegistry::builtin();
    let service = RegistryService::new(index, &registry).map_err(|e| {
        report_error(json, &e.to_string());
        e.exit_code() as u8
    })?;

    let constraint = Constraint::parse(constraint).map_err(|e| {
        report_error(json, &e.to_string());
        2u8
    })?;

    match service.find_compatible_version(package, &constraint) {
        Ok(version) => {
            let uri = service.package_uri(package, &version).ok();
            if json {
                let output = serde_json::json!({
                    "package": package,
                    "version": version.to_string(),
                    "uri": uri,
                });
                println!("{}", output);
            } else {
                match uri {
                    Some(uri) => println!("{package} {version} ({uri})"),
                    None => println!("{package} {version}"),
                }
            }
            Ok(())
        }
        Err(e) => {
            report_error(json, &e.to_string());
            Err(1)
        }
    }
}

fn run_deps(
    manifest_source: &str,
    registry_source: Option<&str>,
    transitive: bool,
    max_depth: usize,
    pretty: bool,
) -> Result<(), u8> {
    let manifest = load_document_auto(manifest_source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let registry = VersionRegistry::builtin();
    let service = PackageService::new(manifest, &registry).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let view = service.dependencies().map_err(|e| {
        eprintln!("Error: {}", e);
        2u8
    })?;

    let mut output = serde_json::json!({ "dependencies": view });

    if transitive {
        let source = registry_source.expect("clap enforces --registry with --transitive");
        let index = load_document_auto(source).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
        let registry_service = RegistryService::new(index, &registry).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;

        let options = ClosureOptions { max_depth };
        let mut closure = Vec::new();
        for dep in &view.platform {
            let version = match &dep.constraint {
                Some(raw) => {
                    let constraint = Constraint::parse(raw).map_err(|e| {
                        eprintln!("Error: {}", e);
                        2u8
                    })?;
                    registry_service
                        .find_compatible_version(&dep.name, &constraint)
                        .map_err(|e| {
                            eprintln!("Error: {}", e);
                            e.exit_code() as u8
                        })?
                }
                None => registry_service.latest_version(&dep.name).map_err(|e| {
                    eprintln!("Error: {}", e);
                    e.exit_code() as u8
                })?,
            };

            let walk =
                transitive_closure(&registry_service, &dep.name, &version, &options).map_err(
                    |e| {
                        eprintln!("Error: {}", e);
                        e.exit_code() as u8
                    },
                )?;
            closure.push(serde_json::json!({
                "name": dep.name,
                "version": version.to_string(),
                "closure": walk,
            }));
        }
        output["transitive"] = serde_json::Value::Array(closure);
    }

    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", rendered);

    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json: bool, msg: &str) {
    if json {
        let output = serde_json::json!({ "overall": false, "error": msg });
        println!("{}", output);
    } else {
        eprintln!("Error: {}", msg);
    }
}
