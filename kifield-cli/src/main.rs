//! KiField CLI - move part fields between KiCad files and spreadsheets.

use clap::{ArgAction, Parser, ValueEnum};
use kifield::{FieldFilter, KiFieldCore, KiFieldOptions, RunReport, WriteSession};
use std::path::PathBuf;
use std::process;
use tracing::Level;

#[derive(Parser)]
#[command(name = "kifield")]
#[command(
    about = "Insert fields from spreadsheets into KiCad schematics or libraries, or gather fields from schematics or libraries and place them into a spreadsheet",
    long_about = None
)]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Files to extract part fields from
    #[arg(short = 'x', long, value_name = "FILE", num_args = 1..)]
    extract: Vec<PathBuf>,

    /// Files to insert part fields into
    #[arg(short, long, value_name = "FILE", num_args = 1..)]
    insert: Vec<PathBuf>,

    /// Fields to extract; prefix a name with / or ~ to exclude it
    #[arg(short, long, value_name = "NAME", num_args = 1..)]
    fields: Vec<String>,

    /// Follow hierarchical sheets of schematics
    #[arg(short, long)]
    recurse: bool,

    /// Allow changes to files without backing them up
    #[arg(short = 'w', long)]
    overwrite: bool,

    /// Do not make backup files before writing
    #[arg(long = "nobackup")]
    no_backup: bool,

    /// Group rows of identical parts in spreadsheets
    #[arg(short, long)]
    group: bool,

    /// Write grouped references as lists instead of ranges (C1, C2, C3 rather than C1-C3)
    #[arg(long = "norange")]
    no_range: bool,

    /// Print debugging info (larger LEVEL is more verbose)
    #[arg(short, long, value_name = "LEVEL", num_args = 0..=1, default_missing_value = "1")]
    debug: Option<u8>,

    /// Report format
    #[arg(long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Human,
    /// JSON report for scripts
    Json,
}

fn log_level(debug: Option<u8>) -> Level {
    match debug.unwrap_or(0) {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level(cli.debug))
        .with_target(false)
        .init();

    process::exit(handle_run(cli));
}

fn handle_run(cli: Cli) -> i32 {
    if cli.extract.is_empty() {
        eprintln!("Error: no files to extract fields from (use -x FILE)");
        return 2;
    }
    if cli.insert.is_empty() {
        eprintln!("Error: no files to insert fields into (use -i FILE)");
        return 1;
    }
    if cli.no_backup && !cli.overwrite {
        let existing: Vec<&PathBuf> = cli.insert.iter().filter(|p| p.exists()).collect();
        if !existing.is_empty() {
            for path in existing {
                eprintln!("Error: {} already exists", path.display());
            }
            eprintln!("Use --overwrite to change files without backing them up.");
            return 1;
        }
    }

    let options = KiFieldOptions {
        filter: FieldFilter::from_specs(&cli.fields),
        recurse: cli.recurse,
        group_components: cli.group,
        no_range: cli.no_range,
        backup: !cli.no_backup,
    };
    let session = WriteSession::for_options(&options, cli.debug.unwrap_or(0));
    let report = KiFieldCore::run(&cli.extract, &cli.insert, &options, session);

    match output_results(&report, &cli.format) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    }
}

fn output_results(report: &RunReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Human => {
            output_human(report);
            Ok(())
        }
        OutputFormat::Json => output_json(report),
    }
}

fn output_human(report: &RunReport) {
    println!("Parts: {}", report.parts);
    for path in &report.extracted_files {
        println!("  read    {}", path.display());
    }
    for path in &report.inserted_files {
        println!("  wrote   {}", path.display());
    }
    for path in &report.backups {
        println!("  backup  {}", path.display());
    }
    if report.has_skipped() {
        println!("\nSkipped:");
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
}

fn output_json(report: &RunReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
