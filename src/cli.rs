// Command-line parsing.
//
// Flags override values from `--config`, which override the defaults in
// `Config`. Parsing stays here; `main` only dispatches.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(
    name = "gold_report",
    version,
    about = "Gold tables, quality gate and analytical report over country/indicator/year facts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the gold tables from the cleaned facts.
    Gold,
    /// Check the input and gold tables and write the quality report.
    Quality,
    /// Render the report from existing gold tables.
    Report,
    /// Gold, quality gate, then report.
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// JSON config file; flags given on the command line take precedence.
    #[arg(long, global = true, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Directory that relative paths are resolved against.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub input_facts: Option<PathBuf>,

    /// Prior YoY table used for the volatility stats.
    #[arg(long, global = true)]
    pub input_growth: Option<PathBuf>,

    #[arg(long, global = true)]
    pub gold_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub checks_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub report_dir: Option<PathBuf>,

    /// Minimum previous-year value for a row to enter the YoY view.
    #[arg(long = "yoy-min-prev", global = true)]
    pub yoy_min_prev_value: Option<f64>,

    #[arg(long, global = true)]
    pub top_n: Option<usize>,

    #[arg(long, global = true)]
    pub rank_base_year: Option<i32>,

    #[arg(long, global = true)]
    pub rank_lookback_years: Option<i32>,

    /// Keep aggregate geos (EU27_2020, EA20, ...) in the report selections.
    #[arg(long, global = true)]
    pub all_geos: bool,

    #[arg(long = "yoy-clip", global = true)]
    pub yoy_clip_abs_for_chart: Option<f64>,

    #[arg(long = "cagr-clip", global = true)]
    pub cagr_clip_abs_for_chart: Option<f64>,

    #[arg(long, global = true)]
    pub cagr_min_years: Option<usize>,

    /// Use this indicator instead of the best-covered one.
    #[arg(long, global = true)]
    pub force_indicator: Option<String>,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(p) = &self.input_facts {
            cfg.input_facts = p.clone();
        }
        if let Some(p) = &self.input_growth {
            cfg.input_growth = Some(p.clone());
        }
        if let Some(p) = &self.gold_dir {
            cfg.gold_dir = p.clone();
        }
        if let Some(p) = &self.checks_dir {
            cfg.checks_dir = p.clone();
        }
        if let Some(p) = &self.report_dir {
            cfg.report_dir = p.clone();
        }
        if let Some(v) = self.yoy_min_prev_value {
            cfg.yoy_min_prev_value = v;
        }
        if let Some(v) = self.top_n {
            cfg.top_n = v;
        }
        if let Some(v) = self.rank_base_year {
            cfg.rank_base_year = Some(v);
        }
        if let Some(v) = self.rank_lookback_years {
            cfg.rank_lookback_years = v;
        }
        if self.all_geos {
            cfg.country_only = false;
        }
        if let Some(v) = self.yoy_clip_abs_for_chart {
            cfg.yoy_clip_abs_for_chart = v;
        }
        if let Some(v) = self.cagr_clip_abs_for_chart {
            cfg.cagr_clip_abs_for_chart = v;
        }
        if let Some(v) = self.cagr_min_years {
            cfg.cagr_min_years = v;
        }
        if let Some(v) = &self.force_indicator {
            cfg.force_indicator = Some(v.clone());
        }

        if let Some(root) = &self.root {
            cfg = cfg.rooted_at(root);
        }
        cfg.validate()
    }
}
