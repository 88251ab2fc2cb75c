use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use snp_import::app::{App, DeleteResult, ImportOptions, ImportReport, InfoResult, ListResult};
use snp_import::config::ConfigLoader;
use snp_import::error::SnpError;
use snp_import::output::{JsonOutput, LogProgress, OutputMode};
use snp_import::store::SnpStore;

#[derive(Parser)]
#[command(name = "snp-import")]
#[command(about = "Import, list and delete SNP sets in a local variant store")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "SQLite database holding the SNP sets")]
    database: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "JSON config file (default: ./snp-import.json)")]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import a SNP package (.tar.gz, .tar, .zip or directory)")]
    Import(ImportArgs),
    #[command(about = "Delete one or more SNP sets")]
    Delete(DeleteArgs),
    #[command(about = "List imported SNP sets")]
    List,
    #[command(about = "Show one SNP set")]
    Info(InfoArgs),
}

#[derive(Args)]
struct ImportArgs {
    archive: PathBuf,

    #[arg(long, help = "Validate the package without writing anything")]
    dry_run: bool,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(required = true)]
    set_names: Vec<String>,
}

#[derive(Args)]
struct InfoArgs {
    set_name: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SnpError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SnpError) -> u8 {
    match error {
        SnpError::DuplicateSet(_) | SnpError::SetNotFound(_) => 2,
        SnpError::UnsupportedFormat(_) | SnpError::NotImplemented(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    tracing::debug!(database = %config.database_path, "opening SNP store");
    let store = SnpStore::open(&config.database_path)?;
    let mut app = App::with_config(store, &config);

    match cli.command {
        Commands::Import(args) => {
            let options = ImportOptions {
                dry_run: args.dry_run,
            };
            let report = app.import_set(&args.archive, options, &LogProgress)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_import(&report).into_diagnostic(),
                OutputMode::Human => {
                    print_import_summary(&report);
                    Ok(())
                }
            }
        }
        Commands::Delete(args) => {
            let result = app.delete_sets(&args.set_names, &LogProgress)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_delete(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_delete_summary(&result);
                    Ok(())
                }
            }
        }
        Commands::List => {
            let result = app.list_sets()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_list(&result);
                    Ok(())
                }
            }
        }
        Commands::Info(args) => {
            let result = app.info(&args.set_name)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_info(&result);
                    Ok(())
                }
            }
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn print_import_summary(report: &ImportReport) {
    if report.dry_run {
        println!(
            "{CYAN}dry run: {} ({}, {}) is ready to import{RESET}",
            report.set_name, report.format, report.species
        );
        return;
    }
    println!(
        "{GREEN}imported {} ({}, {}): {} records in {} ms{RESET}",
        report.set_name, report.format, report.species, report.records, report.elapsed_ms
    );
    if !report.indexed {
        println!("{YELLOW}  index rebuild failed; it will be recreated on next open{RESET}");
    }
    for (field, count) in &report.missing_fields {
        println!("{YELLOW}  field {field} missing in {count} records{RESET}");
    }
}

fn print_delete_summary(result: &DeleteResult) {
    for item in &result.items {
        if item.deleted {
            println!(
                "{GREEN}deleted {} ({} records){RESET}",
                item.set_name, item.records_removed
            );
        } else {
            println!("{YELLOW}no SNP set named {}{RESET}", item.set_name);
        }
    }
}

fn print_list(result: &ListResult) {
    if result.sets.is_empty() {
        println!("no SNP sets imported");
        return;
    }
    for entry in &result.sets {
        println!(
            "{CYAN}{}{RESET}\t{}\t{}\t{}\t{} records",
            entry.set_name, entry.format, entry.species, entry.genome_source, entry.record_count
        );
    }
}

fn print_info(result: &InfoResult) {
    let entry = &result.entry;
    println!("{CYAN}{}{RESET}", entry.set_name);
    println!("  format:        {}", entry.format);
    println!("  species:       {}", entry.species);
    println!("  genome source: {}", entry.genome_source);
    println!("  imported at:   {}", entry.imported_at);
    println!("  records:       {}", result.stored_records);
}
