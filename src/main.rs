//! Command-line interface for yangkit

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use serde::Serialize;
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
use yangkit::parser::{parse_auto, parse_yin};
#[cfg(feature = "cli")]
use yangkit::{validate, Context, DataTree, ModuleId, ValidateOptions};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "yangkit")]
#[command(author, version, about = "YANG schema compiler and data validator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile YANG/YIN modules and report errors
    Compile {
        /// Module and submodule files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Enable a feature, as module:feature or module:*
        #[arg(short = 'F', long = "feature")]
        features: Vec<String>,
    },

    /// Print the compiled schema tree of each module
    Tree {
        /// Module and submodule files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Enable a feature, as module:feature or module:*
        #[arg(short = 'F', long = "feature")]
        features: Vec<String>,
    },

    /// Validate a JSON or XML instance document
    Validate {
        /// Schema files
        #[arg(short, long = "schema", value_name = "SCHEMA", required = true)]
        schemas: Vec<PathBuf>,

        /// Instance data (.json or .xml)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Enable a feature, as module:feature or module:*
        #[arg(short = 'F', long = "feature")]
        features: Vec<String>,

        /// Validate as an edit tree
        #[arg(long, conflicts_with_all = ["get", "get_config"])]
        edit: bool,

        /// Validate as a get reply
        #[arg(long, conflicts_with = "get_config")]
        get: bool,

        /// Validate as a get-config reply
        #[arg(long)]
        get_config: bool,

        /// Only resolve when, must and leafref conditions
        #[arg(long)]
        trusted: bool,

        /// Print the validation report as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the features of each module and their state
    Features {
        /// Module and submodule files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile { files, features } => cmd_compile(&files, &features),
        Commands::Tree { files, features } => cmd_tree(&files, &features),
        Commands::Validate {
            schemas,
            file,
            features,
            edit,
            get,
            get_config,
            trusted,
            json,
        } => {
            let options = ValidateOptions {
                edit,
                get,
                get_config,
                trusted,
                no_siblings: false,
            };
            cmd_validate(&schemas, &features, &file, &options, json)
        }
        Commands::Features { files, json } => cmd_features(&files, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Register every file as a source, then compile the modules among them
#[cfg(feature = "cli")]
fn load_schemas(
    files: &[PathBuf],
    features: &[String],
) -> Result<(Context, Vec<ModuleId>), Box<dyn std::error::Error>> {
    let mut ctx = Context::new();
    let mut modules = Vec::new();
    for file in files {
        let text = fs::read_to_string(file)?;
        let stmt = if file.extension().map_or(false, |e| e == "yin") {
            parse_yin(&text)?
        } else {
            parse_auto(&text)?
        };
        if stmt.keyword == "module" {
            modules.push(stmt.clone());
        }
        ctx.add_source(stmt)?;
    }

    let mut compiled = Vec::new();
    for stmt in modules {
        compiled.push(ctx.compile(stmt)?);
    }

    for feature in features {
        let (module, name) = feature
            .split_once(':')
            .ok_or_else(|| format!("Feature '{}' must be given as module:feature", feature))?;
        let id = ctx
            .module_by_name(module)
            .ok_or_else(|| format!("Module '{}' is not loaded", module))?;
        ctx.enable_feature(id, name)?;
    }
    Ok((ctx, compiled))
}

#[cfg(feature = "cli")]
fn cmd_compile(files: &[PathBuf], features: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, modules) = load_schemas(files, features)?;
    for id in modules {
        let module = ctx.module(id);
        let revision = module.revisions.first().map(String::as_str).unwrap_or("(no revision)");
        println!("✓ {} {}", module.name, revision);
    }
    for warning in ctx.warnings() {
        println!("  warning: {}", warning);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_tree(files: &[PathBuf], features: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, modules) = load_schemas(files, features)?;
    for id in modules {
        print!("{}", ctx.print_tree(id));
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn load_data(ctx: &Context, file: &Path) -> Result<DataTree, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(file)?;
    let tree = match file.extension().and_then(|e| e.to_str()) {
        Some("xml") => DataTree::from_xml_str(ctx, &text)?,
        Some("json") => DataTree::from_json_str(ctx, &text)?,
        _ if text.trim_start().starts_with('<') => DataTree::from_xml_str(ctx, &text)?,
        _ => DataTree::from_json_str(ctx, &text)?,
    };
    Ok(tree)
}

#[cfg(feature = "cli")]
fn cmd_validate(
    schemas: &[PathBuf],
    features: &[String],
    file: &Path,
    options: &ValidateOptions,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, _) = load_schemas(schemas, features)?;
    let mut tree = load_data(&ctx, file)?;

    match validate(&ctx, &mut tree, options) {
        Ok(report) => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("✓ Data is valid");
            for path in &report.pruned {
                println!("  pruned (when is false): {}", path);
            }
            for path in &report.unresolved {
                println!("  unresolved reference: {}", path);
            }
            Ok(())
        }
        Err(e) => {
            println!("✗ Data is invalid");
            println!();
            println!("{}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct FeatureState<'a> {
    module: &'a str,
    feature: &'a str,
    enabled: bool,
}

#[cfg(feature = "cli")]
fn cmd_features(files: &[PathBuf], json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, modules) = load_schemas(files, &[])?;
    let mut states = Vec::new();
    for id in modules {
        let module = ctx.module(id);
        for (name, feature) in &module.features {
            states.push(FeatureState {
                module: &module.name,
                feature: name,
                enabled: ctx.feature_enabled(*feature),
            });
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&states)?);
    } else {
        for state in &states {
            let mark = if state.enabled { "+" } else { "-" };
            println!("{} {}:{}", mark, state.module, state.feature);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
