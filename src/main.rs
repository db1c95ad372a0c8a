// Entry point and high-level CLI flow.
//
// Each subcommand runs one stage of the pipeline:
// - `gold` builds the three gold tables from the cleaned facts,
// - `quality` checks inputs and gold tables and writes the JSON report,
// - `report` renders the Markdown report and its charts,
// - `run` chains all three and stops at the first failure.
mod aggregate;
mod charts;
mod cli;
mod config;
mod error;
mod growth;
mod insights;
mod loader;
mod output;
mod pipeline;
mod quality;
mod ranking;
mod report;
mod structural;
mod types;
mod util;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command, LogFormat};
use config::Config;
use error::Result;
use pipeline::ReportOutput;
use quality::QualityReport;

/// Logs go to stderr so stdout stays readable for the console previews.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn handle_gold(cfg: &Config) -> Result<()> {
    let out = pipeline::run_gold(cfg)?;
    println!(
        "Processing facts... ({} rows read, {} kept, {} after dedup)",
        util::format_int(out.load.total_rows),
        util::format_int(out.load.kept_rows),
        util::format_int(out.facts.len())
    );
    if out.load.dropped_rows > 0 || out.load.parse_errors > 0 {
        println!(
            "Note: {} rows dropped, {} rows unreadable.",
            util::format_int(out.load.dropped_rows),
            util::format_int(out.load.parse_errors)
        );
    }
    println!("Gold tables written to {}:", cfg.gold_dir.display());
    println!(
        "  {} ({} rows)",
        config::GOLD_FACTS_FILE,
        util::format_int(out.facts.len())
    );
    println!(
        "  {} ({} rows)",
        config::GOLD_GROWTH_FILE,
        util::format_int(out.growth.len())
    );
    println!(
        "  {} ({} rows)",
        config::GOLD_STRUCTURAL_FILE,
        util::format_int(out.structural.len())
    );
    output::preview_table(
        "Structural metrics",
        Some("by indicator, then CAGR descending"),
        &report::cagr_rows(&out.structural),
        3,
    );
    Ok(())
}

fn print_quality(report: &QualityReport, cfg: &Config) {
    let status = if report.is_ok() { "OK" } else { "FAIL" };
    println!("Quality gate: {}", status);
    for (name, checks) in &report.checks {
        println!(
            "  {}: {} rows, {} cols",
            name,
            util::format_int(checks.rows),
            util::format_int(checks.cols)
        );
        if checks.unreadable_rows > 0 {
            println!(
                "    ({} undecodable rows skipped)",
                util::format_int(checks.unreadable_rows)
            );
        }
    }
    for e in &report.errors {
        println!("  error: {}", e);
    }
    println!("(Full report at {})\n", cfg.quality_report_path().display());
}

fn handle_quality(cfg: &Config) -> Result<()> {
    match pipeline::run_quality(cfg) {
        Ok(report) => {
            print_quality(&report, cfg);
            Ok(())
        }
        Err(e) => {
            if let Some(report) = quality::read_quality_report(&cfg.quality_report_path()) {
                print_quality(&report, cfg);
            }
            Err(e)
        }
    }
}

fn print_report(out: &ReportOutput) {
    let sel = &out.selections;
    println!("Report for indicator {}", sel.indicator);
    output::preview_table(
        &format!("Top by value ({})", sel.year_top),
        None,
        &report::value_rows(&sel.top_value),
        3,
    );
    output::preview_table(
        &format!("Top YoY growth ({})", sel.year_yoy),
        Some("cleaned: small baselines removed"),
        &report::yoy_rows(&sel.top_yoy),
        3,
    );
    output::preview_table(
        &format!("Rank movers up ({} → {})", sel.rank_base_year, sel.year_top),
        None,
        &report::rank_rows(&sel.movers_up),
        3,
    );
    if sel.has_cagr {
        output::preview_table(
            "Top CAGR",
            None,
            &report::cagr_rows(&sel.cagr_top),
            3,
        );
    }
    println!("Insights:");
    for i in &out.insights {
        println!("  - {}: {}", i.title, i.text);
    }
    println!("\n(Full report written to {})\n", out.path.display());
}

fn handle_report(cfg: &Config) -> Result<()> {
    let out = pipeline::run_report(cfg)?;
    print_report(&out);
    Ok(())
}

fn handle_run(cfg: &Config) -> Result<()> {
    let out = pipeline::run_all(cfg)?;
    print_report(&out);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = cli.config.resolve().and_then(|cfg| match cli.command {
        Command::Gold => handle_gold(&cfg),
        Command::Quality => handle_quality(&cfg),
        Command::Report => handle_report(&cfg),
        Command::Run => handle_run(&cfg),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.exit_code(), "{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
