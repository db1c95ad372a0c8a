// Run configuration.
//
// Built once in `main` (defaults, then an optional JSON file, then CLI flags)
// and handed to every stage by reference. Nothing reads ambient state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const GOLD_FACTS_FILE: &str = "gold_country_indicator_year.csv";
pub const GOLD_GROWTH_FILE: &str = "gold_yoy_growth.csv";
pub const GOLD_STRUCTURAL_FILE: &str = "gold_structural_metrics.csv";
pub const QUALITY_REPORT_FILE: &str = "quality_report.json";
pub const REPORT_FILE: &str = "gold_report.md";
pub const ASSETS_DIR: &str = "assets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cleaned fact table handed over by ingestion.
    pub input_facts: PathBuf,
    /// Prior-computed YoY table for the volatility stats; when absent the
    /// freshly computed growth table is used.
    pub input_growth: Option<PathBuf>,
    pub gold_dir: PathBuf,
    pub checks_dir: PathBuf,
    pub report_dir: PathBuf,

    /// Growth rows whose value_prev is below this are left out of the YoY view.
    pub yoy_min_prev_value: f64,
    pub top_n: usize,
    pub rank_base_year: Option<i32>,
    pub rank_lookback_years: i32,
    pub country_only: bool,
    pub yoy_clip_abs_for_chart: f64,
    pub cagr_clip_abs_for_chart: f64,
    pub cagr_min_years: usize,
    pub force_indicator: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_facts: PathBuf::from("data-silver/facts.csv"),
            input_growth: None,
            gold_dir: PathBuf::from("data-gold"),
            checks_dir: PathBuf::from("outputs-checks"),
            report_dir: PathBuf::from("reports/out"),
            yoy_min_prev_value: 1.0,
            top_n: 10,
            rank_base_year: None,
            rank_lookback_years: 5,
            country_only: true,
            yoy_clip_abs_for_chart: 200.0,
            cagr_clip_abs_for_chart: 50.0,
            cagr_min_years: 5,
            force_indicator: None,
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&text)?;
        Ok(cfg)
    }

    pub fn validate(self) -> Result<Self> {
        if self.top_n == 0 {
            return Err(PipelineError::Config("top_n must be at least 1".into()));
        }
        if !self.yoy_min_prev_value.is_finite() {
            return Err(PipelineError::Config(
                "yoy_min_prev_value must be a finite number".into(),
            ));
        }
        for (name, v) in [
            ("yoy_clip_abs_for_chart", self.yoy_clip_abs_for_chart),
            ("cagr_clip_abs_for_chart", self.cagr_clip_abs_for_chart),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(PipelineError::Config(format!(
                    "{name} must be a positive finite number"
                )));
            }
        }
        if self.rank_lookback_years < 0 {
            return Err(PipelineError::Config(
                "rank_lookback_years cannot be negative".into(),
            ));
        }
        Ok(self)
    }

    pub fn gold_facts_path(&self) -> PathBuf {
        self.gold_dir.join(GOLD_FACTS_FILE)
    }

    pub fn gold_growth_path(&self) -> PathBuf {
        self.gold_dir.join(GOLD_GROWTH_FILE)
    }

    pub fn gold_structural_path(&self) -> PathBuf {
        self.gold_dir.join(GOLD_STRUCTURAL_FILE)
    }

    pub fn quality_report_path(&self) -> PathBuf {
        self.checks_dir.join(QUALITY_REPORT_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join(REPORT_FILE)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.report_dir.join(ASSETS_DIR)
    }

    /// Rooted copy used by tests and the `--root` flag.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.input_facts = root.join(&self.input_facts);
        self.input_growth = self.input_growth.map(|p| root.join(p));
        self.gold_dir = root.join(&self.gold_dir);
        self.checks_dir = root.join(&self.checks_dir);
        self.report_dir = root.join(&self.report_dir);
        self
    }
}
