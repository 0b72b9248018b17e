use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use url::Url;

use jscg_core::config::{self, CONFIG_FILE_NAME, CompilerConfig};
use jscg_core::ir::ClassModel;
use jscg_core::parse::store::DocumentStore;
use jscg_core::render::{OutlineRenderer, outline};
use jscg_core::transform::{CompileTarget, Compiler};
use jscg_core::{GeneratedFile, ModelRenderer};

#[derive(Parser)]
#[command(name = "jscg", about = "JSON Schema to class model compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema and write one outline per root class
    Generate {
        /// Path to the schema document (JSON or YAML)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "generated")]
        output: PathBuf,

        /// Compile every entry under this pointer, e.g. /$defs
        #[arg(long)]
        defs: Option<String>,
    },

    /// Check that a schema compiles
    Validate {
        /// Path to the schema document
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        defs: Option<String>,
    },

    /// Print the compiled class model
    Inspect {
        /// Path to the schema document
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        defs: Option<String>,

        /// Root class name when compiling a single schema
        #[arg(long)]
        name: Option<String>,

        /// Output format
        #[arg(long, default_value = "outline")]
        format: InspectFormat,
    },

    /// Initialize a new jscg configuration
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Clone, ValueEnum)]
enum InspectFormat {
    Outline,
    Yaml,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { input, output, defs } => cmd_generate(input, output, defs),

        Commands::Validate { input, defs } => cmd_validate(input, defs),

        Commands::Inspect {
            input,
            defs,
            name,
            format,
        } => cmd_inspect(input, defs, name, format),

        Commands::Init { force } => cmd_init(force),

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "jscg", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Try to load the project config file from the current directory.
fn try_load_config() -> Result<Option<CompilerConfig>> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    config::load_config(&config_path).map_err(|e| anyhow::anyhow!(e))
}

fn is_schema_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

fn document_uri(path: &Path) -> Result<String> {
    let absolute = fs::canonicalize(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Url::from_file_path(&absolute).map(String::from).map_err(|()| {
        anyhow::anyhow!("{} cannot be addressed as a file URI", absolute.display())
    })
}

fn add_document(store: &mut DocumentStore, path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let uri = document_uri(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => store.add_json(&uri, &content)?,
        _ => store.add_yaml(&uri, &content)?,
    }
    Ok(uri)
}

/// Directories never searched for sibling documents.
fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.') || name == "target" || name == "node_modules")
}

/// Load `input` plus every other schema file under its directory, so
/// relative references between documents resolve. Directories in `exclude`
/// (such as the output directory) are not searched.
fn load_store(input: &Path, exclude: &[PathBuf]) -> Result<(DocumentStore, String)> {
    let mut store = DocumentStore::new();
    let uri = add_document(&mut store, input)?;
    let input_path = fs::canonicalize(input)?;
    let excluded: Vec<PathBuf> = exclude
        .iter()
        .filter_map(|dir| fs::canonicalize(dir).ok())
        .collect();

    let dir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("failed to list {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                let canonical = fs::canonicalize(&path)?;
                if is_skipped_dir(&path) || excluded.contains(&canonical) {
                    log::debug!("not searching {}", path.display());
                } else {
                    pending.push(path);
                }
            } else if is_schema_file(&path)
                && fs::canonicalize(&path).ok().as_ref() != Some(&input_path)
                && let Err(e) = add_document(&mut store, &path)
            {
                log::warn!("skipping {}: {e:#}", path.display());
            }
        }
    }
    log::debug!("loaded {} document(s)", store.len());
    Ok((store, uri))
}

fn compile(
    input: &Path,
    defs: Option<&str>,
    name: Option<String>,
    exclude: &[PathBuf],
    cfg: &CompilerConfig,
) -> Result<ClassModel> {
    let (store, uri) = load_store(input, exclude)?;
    let compiler = Compiler::new(cfg.clone())?;
    let model = match defs {
        Some(pointer) => compiler.compile_definitions(&store, &uri, pointer)?,
        None => {
            let mut target = CompileTarget::new(uri, "");
            if let Some(name) = name {
                target = target.named(name);
            }
            compiler.compile(&store, &[target])?
        }
    };
    Ok(model)
}

/// Write generated files to disk under the given base directory.
fn write_files(base: &Path, files: &[GeneratedFile]) -> Result<()> {
    for file in files {
        let path = base.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("  wrote {}", path.display());
    }
    Ok(())
}

fn cmd_generate(input: Option<PathBuf>, output: PathBuf, defs: Option<String>) -> Result<()> {
    let cfg = try_load_config()?.unwrap_or_default();
    let input = input.unwrap_or_else(|| PathBuf::from(&cfg.input));
    let defs = defs.or_else(|| cfg.definitions.clone());
    let model = compile(&input, defs.as_deref(), None, std::slice::from_ref(&output), &cfg)?;

    let files = OutlineRenderer.render(&model).map_err(|e| anyhow::anyhow!(e))?;
    fs::create_dir_all(&output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;
    write_files(&output, &files)?;

    eprintln!("Generated {} files in {}", files.len(), output.display());
    Ok(())
}

fn cmd_validate(input: PathBuf, defs: Option<String>) -> Result<()> {
    let cfg = try_load_config()?.unwrap_or_default();
    let model = compile(&input, defs.as_deref(), None, &[], &cfg)?;

    eprintln!("Valid schema: {}", input.display());
    eprintln!("  Root classes: {}", model.roots.len());
    eprintln!("  Classes: {}", model.classes.len());
    eprintln!("Validation successful.");
    Ok(())
}

fn cmd_inspect(
    input: PathBuf,
    defs: Option<String>,
    name: Option<String>,
    format: InspectFormat,
) -> Result<()> {
    let cfg = try_load_config()?.unwrap_or_default();
    let model = compile(&input, defs.as_deref(), name, &[], &cfg)?;

    match format {
        InspectFormat::Outline => print!("{}", outline(&model)),
        InspectFormat::Yaml => {
            let yaml = serde_yaml_ng::to_string(&model)?;
            print!("{}", yaml);
        }
        InspectFormat::Json => {
            let json = serde_json::to_string_pretty(&model)?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, config::default_config_content())?;
    eprintln!("Created {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jscg_core::ir::ResolvedType;

    #[test]
    fn test_load_store_resolves_sibling_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("order.json"),
            r#"{ "type": "object", "properties": { "buyer": { "$ref": "common/person.yaml" } } }"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("common")).unwrap();
        fs::write(
            dir.path().join("common/person.yaml"),
            "type: object\nproperties:\n  name:\n    type: string\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();

        let model = compile(
            &dir.path().join("order.json"),
            None,
            None,
            &[],
            &CompilerConfig::default(),
        )
        .unwrap();
        let order = model.root("Order").unwrap();
        assert_eq!(order.properties.len(), 1);
        assert!(matches!(
            order.properties[0].resolved_type,
            ResolvedType::Class(_)
        ));
        assert!(model.find("Person").is_some());
    }

    #[test]
    fn test_compile_definitions_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("defs.yaml"),
            r#"$defs:
  Alpha:
    type: object
  Beta:
    type: object
    properties:
      a:
        $ref: '#/$defs/Alpha'
"#,
        )
        .unwrap();
        let model = compile(
            &dir.path().join("defs.yaml"),
            Some("/$defs"),
            None,
            &[],
            &CompilerConfig::default(),
        )
        .unwrap();
        let roots: Vec<String> = model
            .roots
            .iter()
            .map(|id| model.class(*id).class_name())
            .collect();
        assert_eq!(roots, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_load_store_skips_output_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        fs::write(&schema, r#"{ "type": "object" }"#).unwrap();
        fs::write(dir.path().join("other.json"), "{}").unwrap();
        for skipped in ["generated", ".git", "target"] {
            fs::create_dir(dir.path().join(skipped)).unwrap();
            fs::write(dir.path().join(skipped).join("stray.json"), "{}").unwrap();
        }

        let (store, _) = load_store(&schema, &[dir.path().join("generated")]).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_is_schema_file() {
        assert!(is_schema_file(Path::new("a/b.json")));
        assert!(is_schema_file(Path::new("b.yml")));
        assert!(!is_schema_file(Path::new("b.md")));
    }
}
