//! Local command-line transport for the job orchestrator.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docjobs::config::{load_config, Config};
use docjobs::engine::PdfTextConverter;
use docjobs::error::JobError;
use docjobs::job::{JobSettings, RequestedKind};
use docjobs::results::{NamedArtifact, RetrieveKind, Retrieved};
use docjobs::JobOrchestrator;

/// Submit documents, run conversion engines on them and fetch the results.
#[derive(Parser, Debug)]
#[command(name = "docjobs", version, arg_required_else_help = true)]
struct Cli {
    /// JSON config file.
    #[arg(short, long, env = "DOCJOBS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides `data_directory` from the config.
    #[arg(long, env = "DOCJOBS_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a document and print its job id.
    Submit {
        file: PathBuf,
        /// Name to record instead of the file's own name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Run an engine on a submitted job.
    Run {
        id: String,
        /// rapidocr, tesseract, easyocr or ocrmac.
        #[arg(short, long)]
        engine: Option<String>,
        /// Force full-page OCR.
        #[arg(short, long)]
        force: bool,
        /// Comma-separated subset of tables,images,text.
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<String>,
    },
    /// Print one job record as JSON.
    Status { id: String },
    /// Fetch results: summary, text, tables, images, all or archive.
    Retrieve {
        id: String,
        kind: String,
        /// Read an earlier run instead of the current one.
        #[arg(long)]
        run_key: Option<String>,
        /// Directory to write files into. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fetch a single artifact of the current run.
    Download {
        id: String,
        filename: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List all jobs, newest first.
    List,
    /// Delete artifact namespaces of all but the current run.
    Prune { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_directory = dir.to_string_lossy().to_string();
    }

    let orchestrator = JobOrchestrator::from_config(&config, Arc::new(PdfTextConverter::new()))
        .context("Failed to open job store")?;

    match cli.command {
        Command::Submit { file, name } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let id = orchestrator.submit(&bytes, &name)?;
            println!("{}", id);
        }
        Command::Run {
            id,
            engine,
            force,
            kinds,
        } => {
            let engine = engine.unwrap_or_else(|| config.default_engine.to_string());
            let mut settings = JobSettings::new(&engine, force)?;
            if !kinds.is_empty() {
                let kinds = kinds
                    .iter()
                    .map(|k| {
                        RequestedKind::parse(k).ok_or_else(|| {
                            JobError::InvalidInput(format!(
                                "Invalid kind '{}'. Use: tables, images or text",
                                k
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                settings = settings.with_kinds(&kinds);
            }
            let summary = orchestrator.run(&id, settings)?;
            print_json(&summary)?;
        }
        Command::Status { id } => {
            print_json(&orchestrator.status(&id)?)?;
        }
        Command::Retrieve {
            id,
            kind,
            run_key,
            output,
        } => {
            let kind: RetrieveKind = kind.parse()?;
            let retrieved = match run_key {
                Some(run_key) => orchestrator.retrieve_run(&id, &run_key, kind)?,
                None => orchestrator.retrieve(&id, kind)?,
            };
            let dir = output.unwrap_or_else(|| PathBuf::from("."));
            match retrieved {
                Retrieved::Summary(report) => print_json(&report)?,
                Retrieved::Text(artifact) => {
                    io::stdout().write_all(&artifact.bytes)?;
                }
                Retrieved::Files(files) => {
                    for artifact in &files {
                        write_artifact(&dir, artifact)?;
                    }
                }
                Retrieved::Archive(artifact) => write_artifact(&dir, &artifact)?,
            }
        }
        Command::Download {
            id,
            filename,
            output,
        } => {
            let artifact = orchestrator.download(&id, &filename)?;
            write_artifact(&output.unwrap_or_else(|| PathBuf::from(".")), &artifact)?;
        }
        Command::List => {
            let counts = orchestrator.counts();
            for job in orchestrator.list_jobs() {
                println!(
                    "{}  {:<10}  {}  {}",
                    job.id,
                    job.status,
                    job.timestamps.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                    job.original_name
                );
            }
            eprintln!(
                "{} job(s): {} uploaded, {} processing, {} completed, {} failed",
                counts.total(),
                counts.uploaded,
                counts.processing,
                counts.completed,
                counts.failed
            );
        }
        Command::Prune { id } => {
            let removed = orchestrator.prune_runs(&id)?;
            println!("Removed {} run namespace(s)", removed);
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no file name", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_artifact(dir: &Path, artifact: &NamedArtifact) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&artifact.name);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} ({} bytes, {})", path.display(), artifact.bytes.len(), artifact.media_type);
    Ok(())
}
