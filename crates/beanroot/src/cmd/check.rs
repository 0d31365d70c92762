//! Shared implementation of `beanroot-check`.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use beanroot_loader::{LoadError, Loader};
use beanroot_realization::{dump_balances, realize};

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Errors on stderr, balances on stdout
    #[default]
    Text,
    /// One JSON document on stdout
    Json,
}

/// A load error in JSON output.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// Source file, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Error message
    pub message: String,
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput {
    /// Every load error
    pub diagnostics: Vec<JsonDiagnostic>,
    /// Number of errors
    pub error_count: usize,
}

/// Load a ledger, report its errors and print account balances.
#[derive(Parser, Debug)]
#[command(name = "beanroot-check", author, version, about, long_about = None)]
pub struct Args {
    /// The ledger file to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Do not read or write the result cache
    #[arg(short = 'C', long = "no-cache")]
    pub no_cache: bool,

    /// Log cache and pipeline activity to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Print only leaf accounts
    #[arg(long)]
    pub leaves_only: bool,

    /// Output format (text or json)
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// File and line an error points at.
fn error_location(error: &LoadError) -> (Option<String>, Option<u32>) {
    let file = |path: &PathBuf| Some(path.display().to_string());
    match error {
        LoadError::FileMissing { path } | LoadError::Io { path, .. } => (file(path), None),
        LoadError::DuplicateInclude {
            included_from,
            lineno,
            ..
        } => (file(included_from), Some(*lineno)),
        LoadError::Parse { path, error } => (file(path), Some(error.lineno)),
        LoadError::InvalidOption { path, lineno, .. } => (file(path), Some(*lineno)),
        LoadError::Plugin(error) => match error.location() {
            Some(location) => (Some(location.filename.clone()), Some(location.lineno)),
            None => (None, None),
        },
        LoadError::Decode { .. } | LoadError::PluginLoad { .. } => (None, None),
    }
}

/// One-line text rendering. Plugin errors get their source location in
/// front; every other kind names its file already.
fn render_error(error: &LoadError) -> String {
    match (error, error_location(error)) {
        (LoadError::Plugin(_), (Some(file), Some(line))) => format!("{file}:{line}: {error}"),
        _ => error.to_string(),
    }
}

fn diagnostics(errors: &[LoadError]) -> JsonOutput {
    JsonOutput {
        diagnostics: errors
            .iter()
            .map(|error| {
                let (file, line) = error_location(error);
                JsonDiagnostic {
                    file,
                    line,
                    message: error.to_string(),
                }
            })
            .collect(),
        error_count: errors.len(),
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let start = Instant::now();
    if !args.file.exists() {
        anyhow::bail!("file not found: {}", args.file.display());
    }

    let result = Loader::new()
        .with_cache(!args.no_cache)
        .load(&args.file)
        .with_context(|| format!("failed to load {}", args.file.display()))?;
    debug!(
        directives = result.directives.len(),
        errors = result.errors.len(),
        cache = ?result.cache,
        elapsed = ?start.elapsed(),
        "loaded"
    );

    let mut stdout = io::stdout().lock();
    match args.format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &diagnostics(&result.errors))?;
            writeln!(stdout)?;
        }
        OutputFormat::Text => {
            let mut stderr = io::stderr().lock();
            for error in &result.errors {
                writeln!(stderr, "{}", render_error(error))?;
            }
            let root = realize(&result.directives, &result.options.account_types());
            write!(stdout, "{}", dump_balances(&root, args.leaves_only))?;
        }
    }

    Ok(if result.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Main entry point.
pub fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
