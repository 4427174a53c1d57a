use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use dataminer_core::config::AddressConfiguration;
use dataminer_core::control::{create_discovery, create_process_control};
use dataminer_core::dataminer::{Dataminer, RunOutcome, DEFAULT_PROCESS_NAME};
use dataminer_core::dump::write_json;
use dataminer_core::registry::DirectoryRegistry;
use dataminer_core::types::{Address, ModuleInfo};
use dataminer_core::DataminerResult;
use dataminer_utils::{info, init_logging_with, LogFormat, LogLevel, LoggingConfig};
use serde::Serialize;
use statics::{StaticsFactory, STATICS_DUMP};

mod statics;

/// Attach to a running game, freeze it, and dump data through its build's address configuration.
#[derive(Parser, Debug)]
#[command(name = "dataminer")]
#[command(version)]
#[command(about = "Datamine a running game process against a build-specific address configuration", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json (overrides DATAMINER_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Image name of the target process
    #[arg(long, global = true, env = "DATAMINER_PROCESS", default_value = DEFAULT_PROCESS_NAME)]
    process: String,
    /// Directory holding one `<build>.json` address configuration per build
    #[arg(long, global = true, env = "DATAMINER_CONFIGS", default_value = "configs")]
    configs: PathBuf,
    /// Directory dumps are written to
    #[arg(long, global = true, env = "DATAMINER_OUTPUT", default_value = "dumps")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List running instances of the target and whether their build is configured
    Candidates,
    /// Attach, suspend, and dump every configured static with the value it points at
    Statics,
    /// Parse an address configuration and print it, optionally rebased
    Config
    {
        /// Configuration file to check
        file: PathBuf,
        /// Load base to relocate against (hex format: 0x140000000 or decimal)
        #[arg(long)]
        base: Option<Address>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging = logging.with_level(level);
    }
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    // Held until exit so buffered file output is flushed
    let _logging = match init_logging_with(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: &Cli) -> DataminerResult<()>
{
    match &cli.command {
        Commands::Candidates => print_candidates(cli),
        Commands::Statics => dump_statics(cli),
        Commands::Config { file, base } => print_config(file, *base),
    }
}

fn print_candidates(cli: &Cli) -> DataminerResult<()>
{
    let discovery = create_discovery()?;
    let dataminer = Dataminer::new(discovery.as_ref(), DirectoryRegistry::new(&cli.configs)).with_process_name(&cli.process);

    let reports = dataminer.candidates()?;
    if reports.is_empty() {
        println!("No running instance of {} found.", cli.process);
        return Ok(());
    }

    println!("{:<8} {:<10} {:<20} CONFIGURED", "PID", "BUILD", "BASE");
    for report in reports {
        println!(
            "{:<8} {:<10} {:<20} {}",
            report.instance.pid,
            report.instance.build,
            report.instance.main_module.base,
            if report.configured { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn dump_statics(cli: &Cli) -> DataminerResult<()>
{
    let discovery = create_discovery()?;
    let dataminer = Dataminer::new(discovery.as_ref(), DirectoryRegistry::new(&cli.configs)).with_process_name(&cli.process);
    let mut control = create_process_control()?;

    let outcome = dataminer.run(control.as_mut(), &StaticsFactory, |engine| {
        info!("Dumping statics");
        Ok(write_json(&cli.output, STATICS_DUMP, &engine.read_all())?)
    })?;

    match outcome {
        RunOutcome::Completed(path) => println!("Wrote {}", path.display()),
        RunOutcome::NoSuitableProcess => println!("No suitable running process found."),
    }
    Ok(())
}

/// What `config` prints
#[derive(Debug, Serialize)]
struct ConfigReport<'a>
{
    reference_base: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load_base: Option<Address>,
    addresses: &'a BTreeMap<String, Address>,
    offsets: BTreeMap<&'a str, Address>,
}

fn print_config(file: &Path, base: Option<Address>) -> DataminerResult<()>
{
    let blob = fs::read_to_string(file)?;
    let label = file.file_stem().map_or_else(|| file.display().to_string(), |s| s.to_string_lossy().into_owned());
    let config = AddressConfiguration::from_json(&label, &blob)?;

    let text = match base {
        Some(base) => {
            // Only the base matters for relocation; any non-zero size marks the module loaded
            let module = ModuleInfo::new(label.as_str(), file, base, 1);
            let rebased = config.rebase(&module)?;
            render(&ConfigReport {
                reference_base: Some(rebased.reference_base()),
                load_base: Some(rebased.load_base()),
                addresses: rebased.addresses(),
                offsets: offsets_of(rebased.offsets()),
            })
        }
        None => render(&ConfigReport {
            reference_base: config.reference_base(),
            load_base: None,
            addresses: config.addresses(),
            offsets: offsets_of(config.offsets()),
        }),
    }?;

    println!("{text}");
    Ok(())
}

fn offsets_of(offsets: &BTreeMap<String, u64>) -> BTreeMap<&str, Address>
{
    offsets.iter().map(|(name, &offset)| (name.as_str(), Address::new(offset))).collect()
}

fn render(report: &ConfigReport<'_>) -> DataminerResult<String>
{
    Ok(serde_json::to_string_pretty(report).map_err(std::io::Error::from)?)
}
