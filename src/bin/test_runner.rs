//! Test runner binary for SQL-on-FHIR conformance suites
//!
//! Usage: sof-test-runner <suite.json | directory>... [--report report.json]

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use octofhir_sof_eval::conformance::{CaseOutcome, SuiteResult, TestReport, TestSuite};
use octofhir_sof_eval::{SofConfig, ViewRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "sof-test-runner")]
#[command(about = "Run SQL-on-FHIR conformance test files")]
#[command(version)]
struct Args {
    /// Suite files, directories of suite files, or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write a JSON test report to this file
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Print expected and actual rows of failing tests
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    human_panic::setup_panic!();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let files = collect_files(&args.inputs)?;
    if files.is_empty() {
        eprintln!("{}", "No test files found".red());
        process::exit(1);
    }

    let runner = ViewRunner::new(SofConfig::default());
    let mut report = TestReport::new();
    let mut total = 0;
    let mut passed = 0;

    for file in &files {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let suite = TestSuite::from_file(file)
            .with_context(|| format!("Failed to load test file '{}'", file.display()))?;

        println!("🧪 {}", name.bold());
        let result = suite.run(&name, &runner);
        print_suite(&result, args.verbose);

        total += result.cases.len();
        passed += result.passed();
        report.add_suite(&result);
    }

    println!();
    println!("📊 === Test Summary ===");
    println!("Total:   {total}");
    println!("{}", format!("✅ Passed:  {passed}").green());
    if total > passed {
        println!("{}", format!("❌ Failed:  {}", total - passed).red());
    }

    if let Some(path) = &args.report {
        fs::write(path, report.to_json_pretty()?)
            .with_context(|| format!("Failed to write report '{}'", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }

    if total > passed {
        process::exit(1);
    }
    Ok(())
}

fn collect_files(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        let pattern = if path.is_dir() {
            path.join("*.json").to_string_lossy().into_owned()
        } else {
            input.clone()
        };
        for entry in glob::glob(&pattern).with_context(|| format!("Invalid pattern '{pattern}'"))? {
            files.push(entry?);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn print_suite(result: &SuiteResult, verbose: bool) {
    for case in &result.cases {
        match &case.outcome {
            CaseOutcome::Passed => println!("  {} {}", "✓".green(), case.name),
            CaseOutcome::Mismatch { expected, actual } => {
                println!("  {} {}", "✗".red(), case.name);
                if verbose {
                    println!("     Expected: {expected}");
                    println!("     Actual:   {actual}");
                }
            }
            CaseOutcome::UnexpectedError(message) => {
                println!("  {} {} {}", "⚠".yellow(), case.name, message.dimmed());
            }
            CaseOutcome::MissingError { actual } => {
                println!("  {} {} (expected an error)", "✗".red(), case.name);
                if verbose {
                    println!("     Actual:   {actual}");
                }
            }
        }
    }
    println!(
        "  {}/{} passed",
        result.passed().to_string().bold(),
        result.cases.len()
    );
}
