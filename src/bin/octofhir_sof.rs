//! Command-line interface for running SQL-on-FHIR ViewDefinitions
//!
//! Evaluates a ViewDefinition over a file of FHIR resources and writes the
//! resulting rows as JSON, NDJSON or CSV.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use octofhir_sof_eval::{SofConfig, ViewDefinition, ViewRunner, parse_resources};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "octofhir-sof")]
#[command(about = "Run SQL-on-FHIR ViewDefinitions against FHIR resources")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a ViewDefinition over a batch of resources
    Run {
        /// ViewDefinition JSON file
        #[arg(long)]
        view: PathBuf,
        /// Resources as a JSON array, Bundle or NDJSON (reads stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Evaluation options JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file (writes stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Normalize a ViewDefinition and print its columns
    Validate {
        /// ViewDefinition JSON file
        #[arg(long)]
        view: PathBuf,
        /// Evaluation options JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Ndjson,
    Csv,
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            view,
            input,
            format,
            config,
            output,
        } => handle_run(&view, input.as_deref(), format, config.as_deref(), output.as_deref()),
        Commands::Validate { view, config } => handle_validate(&view, config.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_runner(config: Option<&Path>) -> Result<ViewRunner> {
    let config = match config {
        Some(path) => SofConfig::from_file(path)
            .with_context(|| format!("Error loading config '{}'", path.display()))?,
        None => SofConfig::default(),
    };
    Ok(ViewRunner::new(config))
}

fn load_view(path: &Path) -> Result<ViewDefinition> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Error reading view '{}'", path.display()))?;
    ViewDefinition::from_json_str(&text)
        .with_context(|| format!("Error parsing view '{}'", path.display()))
}

fn handle_run(
    view: &Path,
    input: Option<&Path>,
    format: OutputFormat,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let runner = load_runner(config)?;
    let view = load_view(view)?;

    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Error reading input '{}'", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Error reading from stdin")?;
            buffer
        }
    };
    let resources = parse_resources(&text).context("Error parsing resources")?;

    let result = runner
        .run(&view, &resources)
        .context("Error evaluating view")?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Error creating '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &result.to_json())?;
            writeln!(writer)?;
            writer.flush()?;
        }
        OutputFormat::Ndjson => result.write_ndjson(&mut writer)?,
        OutputFormat::Csv => result.write_csv(&mut writer)?,
    }

    log::info!("wrote {} rows", result.len());
    Ok(())
}

fn handle_validate(view: &Path, config: Option<&Path>) -> Result<()> {
    let runner = load_runner(config)?;
    let definition = load_view(view)?;
    let node = runner
        .prepare(&definition)
        .with_context(|| format!("Invalid view '{}'", view.display()))?;

    println!("✓ ViewDefinition is valid");
    if let Some(resource) = &definition.resource {
        println!("Resource: {resource}");
    }
    println!("Columns: {}", node.column_names().join(", "));
    Ok(())
}
