//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_state_adapter::JsonStateAdapter;
use crate::adapters::static_identifier_adapter::StaticIdentifierAdapter;
use crate::adapters::static_rate_adapter::StaticRateAdapter;
use crate::domain::config_validation::{import_context, validate_import_config};
use crate::domain::error::ImportError;
use crate::domain::format::{FormatTag, detect};
use crate::domain::import::{ImportContext, ImportOutcome, import_file};

#[derive(Parser, Debug)]
#[command(name = "tradeimport", about = "Broker CSV importer and trade reconstruction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a broker export and write the reconstructed trades as JSON
    Import {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Format tag, or `auto` to detect
        #[arg(long)]
        format: Option<String>,
        /// Open positions from earlier imports
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Executions already recorded
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the detected format of a broker export
    Detect {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Validate an import configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Import {
            file,
            config,
            format,
            positions,
            history,
            output,
        } => run_import(
            &file,
            config.as_ref(),
            format.as_deref(),
            positions.as_ref(),
            history.as_ref(),
            output.as_ref(),
        ),
        Command::Detect { file } => run_detect(&file),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// `None` for `auto`; anything else must name a format.
pub fn parse_format_arg(value: &str) -> Result<Option<FormatTag>, ImportError> {
    if value.trim().eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    value
        .parse::<FormatTag>()
        .map(Some)
        .map_err(|e| ImportError::ConfigInvalid {
            section: "import".to_string(),
            key: "format".to_string(),
            reason: e.to_string(),
        })
}

/// Import settings from config, overridden by command-line arguments.
pub fn build_import_context(
    config: &FileConfigAdapter,
    format: Option<&str>,
    positions: Option<&Path>,
    history: Option<&Path>,
    state: &JsonStateAdapter,
) -> Result<ImportContext, ImportError> {
    let mut ctx = import_context(config)?;
    if let Some(format) = format {
        ctx.format = parse_format_arg(format)?;
    }
    if let Some(path) = positions {
        ctx.existing_positions = state.load_positions(path)?;
    }
    if let Some(path) = history {
        ctx.history = state.load_history(path)?;
    }
    Ok(ctx)
}

fn print_summary(outcome: &ImportOutcome) {
    let stats = &outcome.stats;
    eprintln!("Format: {}", outcome.format);
    eprintln!(
        "Rows: {} ({} skipped, {} malformed)",
        stats.rows, stats.skipped, stats.malformed
    );
    eprintln!(
        "Fills: {}  Round trips: {}  Duplicates: {}",
        stats.fills, stats.round_trips, stats.duplicates
    );
    eprintln!(
        "Trades: {} ({} open, {} updates)",
        stats.trades, stats.open_trades, stats.updates
    );
    if !outcome.unresolved_identifiers.is_empty() {
        eprintln!(
            "warning: unresolved identifiers: {}",
            outcome.unresolved_identifiers.join(", ")
        );
    }
}

fn run_import(
    file: &PathBuf,
    config_path: Option<&PathBuf>,
    format: Option<&str>,
    positions: Option<&PathBuf>,
    history: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> ExitCode {
    let config = match config_path {
        Some(path) => load_config(path),
        None => Ok(FileConfigAdapter::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(code) => return code,
    };

    let state = JsonStateAdapter::new(PathBuf::from("."));
    let ctx = match build_import_context(
        &config,
        format,
        positions.map(PathBuf::as_path),
        history.map(PathBuf::as_path),
        &state,
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let identifiers = StaticIdentifierAdapter::from_config(&config);
    let rates = match StaticRateAdapter::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Importing {}", file.display());
    let bytes = match fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            let err = ImportError::Io(e);
            eprintln!("error: failed to read {}: {err}", file.display());
            return (&err).into();
        }
    };

    let outcome = match import_file(&bytes, &ctx, &identifiers, &rates) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    print_summary(&outcome);

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = state.write_trades(&outcome.trades, output.map(PathBuf::as_path), &mut stdout)
    {
        eprintln!("error: {e}");
        return (&e).into();
    }
    if let Some(path) = output {
        eprintln!("Trades written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_detect(file: &PathBuf) -> ExitCode {
    match fs::read(file) {
        Ok(bytes) => {
            println!("{}", detect(&bytes));
            ExitCode::SUCCESS
        }
        Err(e) => {
            let err = ImportError::Io(e);
            eprintln!("error: failed to read {}: {err}", file.display());
            (&err).into()
        }
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_import_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    eprintln!("Config validated successfully");
    ExitCode::SUCCESS
}
