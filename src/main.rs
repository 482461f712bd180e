use anyhow::{Context, Result};
use clap::Parser;
use class_lens::cli::{Cli, Commands, OutputFormat};
use class_lens::config::{
    clear_db, open_store, resolve_db_path, resolve_tool_paths, standard_registry,
};
use class_lens::decompiler::{Decompiler, Overrides};
use class_lens::document::DecompiledDocument;
use class_lens::engine::EngineDescriptor;
use class_lens::location::ClassLocation;
use class_lens::naming::internal_class_name;
use class_lens::resolver::CLASS_SUFFIX;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.verbose);

    match cli.command.clone() {
        Commands::Decompile {
            locations,
            engine,
            no_realign,
            format,
            output,
        } => {
            let locations: Vec<ClassLocation> =
                locations.iter().map(|raw| ClassLocation::parse(raw)).collect();
            if let Some(path) = output.as_deref() {
                guard_output(path, &locations)?;
            }
            let decompiler = open_decompiler(&cli)?;
            let overrides = overrides(&decompiler, engine, no_realign)?;
            let results = decompile_all(&decompiler, &locations, &overrides);
            write_decompile_output(&results, format, output.as_deref())?;
        }
        Commands::Dir {
            dir,
            engine,
            no_realign,
        } => {
            let decompiler = open_decompiler(&cli)?;
            let overrides = overrides(&decompiler, engine, no_realign)?;
            let locations: Vec<ClassLocation> = class_files(&dir)
                .into_iter()
                .map(ClassLocation::file)
                .collect();
            debug!(dir = %dir.display(), classes = locations.len(), "decompiling directory");
            for result in decompile_all(&decompiler, &locations, &overrides) {
                println!("{}", serde_json::to_string(&result)?);
            }
        }
        Commands::Engines => {
            let decompiler = open_decompiler(&cli)?;
            let registry = decompiler.registry();
            let selected = registry.selected_engine().descriptor().id;
            let rows: Vec<EngineRow> = registry
                .available_engines()
                .into_iter()
                .map(|descriptor| EngineRow {
                    selected: descriptor.id == selected,
                    descriptor,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Select { id } => {
            let decompiler = open_decompiler(&cli)?;
            let registry = decompiler.registry();
            if registry.engine(&id).is_none() {
                eprintln!(
                    "Unknown engine: {id} (available: {}); selection unchanged",
                    engine_ids(&registry.available_engines())
                );
            } else {
                registry.set_selected(&id)?;
            }
            print_settings(&cli, &decompiler)?;
        }
        Commands::Realign { state } => {
            let decompiler = open_decompiler(&cli)?;
            decompiler
                .registry()
                .set_realign_preference(state.enabled())?;
            print_settings(&cli, &decompiler)?;
        }
        Commands::Show => {
            let decompiler = open_decompiler(&cli)?;
            print_settings(&cli, &decompiler)?;
        }
        Commands::Reset => {
            clear_db(&resolve_db_path(&cli)?)?;
        }
    }

    Ok(())
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    Cli::parse_from(rewrite_args_for_implicit_decompile(args))
}

/// `class-lens Foo.class` means `class-lens decompile Foo.class`.
fn rewrite_args_for_implicit_decompile(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = [
        "decompile", "dir", "engines", "select", "realign", "show", "reset", "help",
    ];
    let valued = ["--db", "--cfr", "--procyon", "--vineflower", "--jd"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if valued.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "decompile".to_string());
        }
    }

    args
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_decompiler(cli: &Cli) -> Result<Decompiler> {
    let db_path = resolve_db_path(cli)?;
    let tools = resolve_tool_paths(cli)?;
    debug!(db = %db_path.display(), ?tools, "opening preferences");
    let store = open_store(&db_path)?;
    Ok(Decompiler::new(standard_registry(store, &tools)))
}

fn overrides(
    decompiler: &Decompiler,
    engine: Option<String>,
    no_realign: bool,
) -> Result<Overrides> {
    if let Some(id) = engine.as_deref()
        && decompiler.registry().engine(id).is_none()
    {
        anyhow::bail!(
            "Unknown engine: {id} (available: {})",
            engine_ids(&decompiler.registry().available_engines())
        );
    }
    Ok(Overrides {
        engine,
        preserve_lines: no_realign.then_some(false),
    })
}

fn engine_ids(descriptors: &[EngineDescriptor]) -> String {
    descriptors
        .iter()
        .map(|d| d.id)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decompiled text never replaces a class file.
fn guard_output(output: &Path, locations: &[ClassLocation]) -> Result<()> {
    let targets_class = output
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(&CLASS_SUFFIX[1..]));
    let targets_input = locations
        .iter()
        .any(|loc| matches!(loc, ClassLocation::File(path) if same_file(path, output)));
    if !(targets_class || targets_input) {
        return Ok(());
    }
    let Some(location) = locations.first() else {
        return Ok(());
    };
    DecompiledDocument::new(location, String::new())
        .write_back()
        .with_context(|| format!("Refusing to write to {}", output.display()))?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn class_files(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "class"))
        .collect();
    found.sort();
    found
}

#[derive(Debug, Serialize)]
struct EngineRow {
    #[serde(flatten)]
    descriptor: EngineDescriptor,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct Settings {
    selected: String,
    preserve_line_numbers: bool,
    db_path: String,
}

fn print_settings(cli: &Cli, decompiler: &Decompiler) -> Result<()> {
    let registry = decompiler.registry();
    let settings = Settings {
        selected: registry.selected_engine().descriptor().id.to_string(),
        preserve_line_numbers: registry.realign_preference(),
        db_path: resolve_db_path(cli)?.to_string_lossy().to_string(),
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct DecompileOutput {
    location: String,
    class_name: String,
    display_name: String,
    engine: Option<String>,
    error: Option<&'static str>,
    content_hash: String,
    content: String,
}

fn decompile_all(
    decompiler: &Decompiler,
    locations: &[ClassLocation],
    overrides: &Overrides,
) -> Vec<DecompileOutput> {
    locations
        .par_iter()
        .map(|location| decompile_one(decompiler, location, overrides))
        .collect()
}

fn decompile_one(
    decompiler: &Decompiler,
    location: &ClassLocation,
    overrides: &Overrides,
) -> DecompileOutput {
    let (class_name, engine, error, text) = match decompiler.try_decompile_with(location, overrides)
    {
        Ok(decompiled) => (
            decompiled.class_id.dotted(),
            Some(decompiled.engine.id.to_string()),
            None,
            decompiled.text,
        ),
        Err(err) => {
            warn!(location = %location, "{err}");
            (
                internal_class_name(location).dotted(),
                None,
                Some(err.kind()),
                decompiler.diagnostic_text(&err),
            )
        }
    };
    let document = DecompiledDocument::new(location, text);
    DecompileOutput {
        location: location.to_string(),
        class_name,
        display_name: document.display_name,
        engine,
        error,
        content_hash: hash_content(&document.text),
        content: document.text,
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_decompile_output(
    results: &[DecompileOutput],
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(results)?,
        OutputFormat::Text => match results {
            [single] => single.content.clone(),
            _ => {
                let mut out = String::new();
                for r in results {
                    out.push_str(&format!("// ==== {} ====\n", r.location));
                    out.push_str(&r.content);
                    if !r.content.ends_with('\n') {
                        out.push('\n');
                    }
                }
                out
            }
        },
    };

    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
