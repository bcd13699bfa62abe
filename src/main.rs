use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use visitagg::utils::{format_number, setup_logging, validate_args};
use visitagg::{coordinator, Args, RunReport};

fn print_run_summary(report: &RunReport, args: &Args) {
    println!("\n--- Visit Aggregation ---");
    println!("Input: {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Workers: {}", report.workers);
    println!("Lines read: {}", format_number(report.totals.lines));
    println!("Lines skipped: {}", format_number(report.totals.skipped));
    println!("Unique paths: {}", format_number(report.paths as u64));
    println!("Visits counted: {}", format_number(report.visits));
    println!("Elapsed: {:.1}ms", report.elapsed.as_secs_f64() * 1000.0);
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);
    validate_args(&args)?;

    let config = args.to_config();
    info!(action = "configure", component = "cli", config = ?config, "Parsed configuration");

    match coordinator::run(&args.input, &args.output, &config)
        .with_context(|| format!("Failed to aggregate {}", args.input.display()))
    {
        Ok(report) => {
            print_run_summary(&report, &args);
            Ok(())
        }
        Err(e) => {
            error!(action = "fail", component = "cli", error = %format!("{e:#}"), "Aggregation failed");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
