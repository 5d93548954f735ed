//! # Trellis CLI
//!
//! Command line front end for `fem_core`: create, validate, migrate and
//! export project files, and inspect stored analysis results.
//!
//! ```text
//! trellis new frame.tmf --created-by "A. Engineer"
//! trellis validate frame.tmf
//! trellis export frame.tmf --dialect python
//! trellis migrate old.tmf --output new.tmf
//! trellis results --store out runs
//! trellis results --store out step <run> --kind node --field disp --step 10
//! trellis results --store out series <run> --kind node --id 3 --field disp
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fem_core::config::{AppConfig, CONFIG_FILE};
use fem_core::file_io::{load_project, save_project, FileLock};
use fem_core::project::{Project, PROJECT_EXTENSION};
use fem_core::results::{ResultKind, ResultsStore, RunId};
use fem_core::Dialect;

/// Trellis structural model tool
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Validate, export and inspect structural models", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty project file
    New {
        path: PathBuf,
        #[arg(long)]
        created_by: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Report validation issues of a project
    Validate { path: PathBuf },
    /// Generate an analysis script
    Export {
        path: PathBuf,
        /// tcl or python (default from configuration)
        #[arg(short, long)]
        dialect: Option<Dialect>,
        /// Output file (default: project path with the dialect's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Significant digits for numbers
        #[arg(long)]
        digits: Option<usize>,
    },
    /// Rewrite a project file in the current schema version
    Migrate {
        path: PathBuf,
        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect a results store
    Results {
        /// Results store directory
        #[arg(short, long)]
        store: PathBuf,
        #[command(subcommand)]
        command: ResultsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ResultsCommand {
    /// List runs with their manifests
    Runs,
    /// Print one field of every entity at one step
    Step {
        run: RunId,
        #[arg(long, default_value = "node")]
        kind: ResultKind,
        #[arg(long)]
        field: String,
        #[arg(long)]
        step: usize,
    },
    /// Print one series, one record per line
    Series {
        run: RunId,
        #[arg(long, default_value = "node")]
        kind: ResultKind,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        field: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config)
        .with_context(|| format!("reading configuration {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::New { path, created_by, description } => new_project(&path, created_by, description),
        Command::Validate { path } => validate(&path),
        Command::Export { path, dialect, output, digits } => export(&config, &path, dialect, output, digits),
        Command::Migrate { path, output } => migrate(&path, output),
        Command::Results { store, command } => results(&config, &store, command),
    }
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn new_project(path: &Path, created_by: Option<String>, description: Option<String>) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if path.extension().and_then(|e| e.to_str()) != Some(PROJECT_EXTENSION) {
        warn!(path = %path.display(), "project files normally use the .{} extension", PROJECT_EXTENSION);
    }
    let mut project = Project::new(created_by.unwrap_or_else(user_name));
    if let Some(description) = description {
        project = project.with_description(description);
    }
    let _lock = FileLock::acquire(path, user_name())?;
    save_project(&project, path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let project = load_project(path).with_context(|| format!("loading {}", path.display()))?;
    let issues = project.document.issues();
    if issues.is_empty() {
        println!("{}: valid ({} entities)", path.display(), project.document.len());
        return Ok(());
    }
    for issue in &issues {
        println!("{}", issue);
    }
    bail!("{} has {} validation issue(s)", path.display(), issues.len())
}

fn export(
    config: &AppConfig,
    path: &Path,
    dialect: Option<Dialect>,
    output: Option<PathBuf>,
    digits: Option<usize>,
) -> Result<()> {
    let project = load_project(path).with_context(|| format!("loading {}", path.display()))?;
    let dialect = dialect.unwrap_or(config.export.dialect);
    let generator = config
        .code_generator()
        .with_significant_digits(digits.or(config.export.significant_digits));

    let script = generator.generate(&project.document, dialect)?;
    let output = output.unwrap_or_else(|| path.with_extension(dialect.extension()));
    script.write_to(&output)?;
    println!("Wrote {} ({} lines)", output.display(), script.lines.len());
    Ok(())
}

fn migrate(path: &Path, output: Option<PathBuf>) -> Result<()> {
    let project = load_project(path).with_context(|| format!("loading {}", path.display()))?;
    let output = output.unwrap_or_else(|| path.to_path_buf());
    let _lock = FileLock::acquire(&output, user_name())?;
    save_project(&project, &output)?;
    info!(from = %path.display(), to = %output.display(), "migrated project");
    println!("Wrote {} (schema {})", output.display(), project.meta.file_format_version);
    Ok(())
}

fn results(config: &AppConfig, store: &Path, command: ResultsCommand) -> Result<()> {
    if !store.is_dir() {
        bail!("{} is not a results store", store.display());
    }
    let store = ResultsStore::open(store)?.with_sync_appends(config.results.sync_appends);
    match command {
        ResultsCommand::Runs => {
            for run in store.list_runs()? {
                match store.run_info(&run) {
                    Ok(info) => println!(
                        "{}\t{}\t{} steps\t{}",
                        run,
                        info.analysis_type.as_deref().unwrap_or("-"),
                        store.committed_steps(&run)?,
                        info.started_at.to_rfc3339()
                    ),
                    Err(e) => println!("{}\t{}", run, e),
                }
            }
        }
        ResultsCommand::Step { run, kind, field, step } => {
            for (id, values) in store.get_step(&run, kind, &field, step)? {
                println!("{}\t{}", id, join(&values));
            }
        }
        ResultsCommand::Series { run, kind, id, field } => {
            let series = store.get_series(&run, kind, id, &field)?;
            let times = store.time_steps(&run)?;
            for (step, record) in series.iter().enumerate() {
                let time = times.get(step).copied().unwrap_or(step as f64);
                println!("{}\t{}", time, join(&record?));
            }
        }
    }
    Ok(())
}

fn join(values: &[f64]) -> String {
    values.iter().map(f64::to_string).collect::<Vec<_>>().join("\t")
}
