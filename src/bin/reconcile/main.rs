use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use ili_lineage::{
    config::ReconcileConfig,
    error::LineageError,
    logging::init_logging,
    model::RunRowSet,
    never_cancel, reconcile_surveys,
};
use indexmap::IndexMap;

fn main() -> ExitCode {
    if let Err(e) = main_inner() {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Reconciles three in-line-inspection survey exports into one lineage
/// table with growth, clustering, and risk-forecast output.
///
/// This binary's row loader is a minimal, crate-local concession for a
/// runnable demonstration: it reads comma- or tab-delimited files with a
/// header row into the same string-keyed row shape the real upstream
/// tabular-file reader hands to this crate. It does not attempt to handle
/// every quoting/encoding edge case a production file reader would.
#[derive(Debug, clap::Parser)]
struct ReconcileCli {
    /// Path to the earliest (Y0) survey export.
    y0_file: PathBuf,
    /// Path to the middle (Y1) survey export.
    y1_file: PathBuf,
    /// Path to the latest (Y2) survey export.
    y2_file: PathBuf,

    /// Calendar year of the Y0 survey.
    #[clap(long)]
    y0_year: i32,
    /// Calendar year of the Y1 survey.
    #[clap(long)]
    y1_year: i32,
    /// Calendar year of the Y2 survey.
    #[clap(long)]
    y2_year: i32,

    /// Optional TOML file overriding the default reconciliation parameters.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Where to write the result as pretty JSON; defaults to stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

fn main_inner() -> error_stack::Result<(), LineageError> {
    let clargs = ReconcileCli::parse();
    init_logging(clargs.verbosity.log_level_filter());

    let config = match &clargs.config {
        Some(path) => ReconcileConfig::from_file(path)
            .change_context_lazy(|| LineageError::InternalInvariantFailure("could not load configuration".to_string()))?,
        None => ReconcileConfig::default(),
    };

    let runs = [
        load_row_set(&clargs.y0_file, clargs.y0_year)?,
        load_row_set(&clargs.y1_file, clargs.y1_year)?,
        load_row_set(&clargs.y2_file, clargs.y2_year)?,
    ];

    log::info!(
        "reconciling {} / {} / {} rows across years {}, {}, {}",
        runs[0].rows.len(),
        runs[1].rows.len(),
        runs[2].rows.len(),
        clargs.y0_year,
        clargs.y1_year,
        clargs.y2_year,
    );

    let result = reconcile_surveys(&runs, &config, &never_cancel)
        .change_context_lazy(|| LineageError::InternalInvariantFailure("reconciliation job failed".to_string()))?;

    if !result.warnings.is_empty() {
        for warning in &result.warnings {
            log::warn!("{warning}");
        }
    }

    let json = serde_json::to_string_pretty(&result)
        .change_context_lazy(|| LineageError::InternalInvariantFailure("could not serialize result".to_string()))?;

    match clargs.output {
        Some(path) => std::fs::write(&path, json)
            .change_context_lazy(|| LineageError::InternalInvariantFailure(format!("could not write {}", path.display())))?,
        None => println!("{json}"),
    }

    Ok(())
}

/// Split on the first delimiter found in the header line (comma or tab),
/// then zip that delimiter against every subsequent line to build one
/// string-keyed row per data line.
fn load_row_set(path: &PathBuf, year: i32) -> error_stack::Result<RunRowSet, LineageError> {
    let file = File::open(path)
        .change_context_lazy(|| LineageError::InternalInvariantFailure(format!("could not open {}", path.display())))?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .transpose()
        .change_context_lazy(|| LineageError::InternalInvariantFailure(format!("could not read header of {}", path.display())))?
        .ok_or_else(|| LineageError::InternalInvariantFailure(format!("{} is empty", path.display())))?;

    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };
    let headers: Vec<String> = header_line.split(delimiter).map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for line in lines {
        let line = line.change_context_lazy(|| LineageError::InternalInvariantFailure(format!("could not read a line of {}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        let row: IndexMap<String, String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), fields.get(i).unwrap_or(&"").trim().to_string()))
            .collect();
        rows.push(row);
    }

    Ok(RunRowSet { year, rows })
}
