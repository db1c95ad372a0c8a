// Quality gate over the table files at the stage boundaries.
//
// Two terminal states. A missing or empty file fails the gate at once and no
// table is read. Otherwise every table is read: missing expected columns are
// errors, while null rates and value ranges are recorded for diagnosis only.
// The gate fails iff the error list is non-empty at the end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::output::write_json;
use crate::util::parse_f64_safe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChecks {
    pub rows: usize,
    pub cols: usize,
    pub missing_expected_cols: Vec<String>,
    /// Rows the reader could not decode; skipped and counted, never fatal.
    #[serde(default)]
    pub unreadable_rows: usize,
    /// Share of rows (0..=1) whose cell is empty or not numeric.
    pub null_rates: BTreeMap<String, Option<f64>>,
    pub ranges: BTreeMap<String, ValueRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub status: QualityStatus,
    pub files: BTreeMap<String, FileStatus>,
    pub checks: BTreeMap<String, TableChecks>,
    pub errors: Vec<String>,
}

impl QualityReport {
    pub fn is_ok(&self) -> bool {
        self.status == QualityStatus::Ok
    }
}

/// One table the gate knows how to check. Each expected column lists the
/// header names that satisfy it; stats use the first name present.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub stage: &'static str,
    pub path: PathBuf,
    pub expected: &'static [&'static [&'static str]],
    pub null_cols: &'static [&'static [&'static str]],
    pub range_cols: &'static [&'static [&'static str]],
}

const GEO: &[&str] = &["geo"];
const INDICATOR: &[&str] = &["indicator", "indic_sbs"];
const YEAR: &[&str] = &["year"];

/// Tables checked after the gold stage, in order.
pub fn table_specs(cfg: &Config) -> Vec<TableSpec> {
    vec![
        TableSpec {
            stage: "facts",
            path: cfg.input_facts.clone(),
            expected: &[GEO, INDICATOR, YEAR, &["value_num", "value"]],
            null_cols: &[&["year"], &["value_num", "value"]],
            range_cols: &[&["year"], &["value_num", "value"]],
        },
        TableSpec {
            stage: "gold_country_indicator_year",
            path: cfg.gold_facts_path(),
            expected: &[GEO, INDICATOR, YEAR, &["value"]],
            null_cols: &[&["value"]],
            range_cols: &[&["year"], &["value"]],
        },
        TableSpec {
            stage: "gold_yoy_growth",
            path: cfg.gold_growth_path(),
            expected: &[GEO, INDICATOR, YEAR, &["value"], &["value_prev"], &["yoy_pct"]],
            null_cols: &[&["value_prev"], &["yoy_pct"]],
            range_cols: &[&["year"], &["yoy_pct"]],
        },
        TableSpec {
            stage: "gold_structural_metrics",
            path: cfg.gold_structural_path(),
            expected: &[
                GEO,
                INDICATOR,
                &["n_years"],
                &["year_first"],
                &["year_last"],
                &["value_first"],
                &["value_last"],
                &["cagr_pct", "cagr"],
            ],
            null_cols: &[&["cagr_pct", "cagr"], &["rank_delta"]],
            range_cols: &[&["cagr_pct", "cagr"], &["rank_delta"]],
        },
    ]
}

fn file_status(path: &Path) -> FileStatus {
    match std::fs::metadata(path) {
        Ok(m) => FileStatus {
            exists: true,
            size_bytes: Some(m.len()),
        },
        Err(_) => FileStatus {
            exists: false,
            size_bytes: None,
        },
    }
}

fn resolve<'a>(headers: &StringRecord, alts: &[&'a str]) -> Option<(&'a str, usize)> {
    alts.iter()
        .find_map(|name| headers.iter().position(|h| h == *name).map(|i| (*name, i)))
}

fn check_table(spec: &TableSpec) -> std::result::Result<TableChecks, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(&spec.path)?;
    let headers = rdr.headers()?.clone();
    let mut records: Vec<StringRecord> = Vec::new();
    let mut unreadable_rows = 0;
    for result in rdr.records() {
        match result {
            Ok(r) => records.push(r),
            Err(_) => unreadable_rows += 1,
        }
    }
    if unreadable_rows > 0 {
        warn!(table = spec.stage, unreadable_rows, "skipped undecodable rows");
    }

    let mut checks = TableChecks {
        rows: records.len(),
        cols: headers.len(),
        unreadable_rows,
        ..TableChecks::default()
    };
    checks.missing_expected_cols = spec
        .expected
        .iter()
        .filter(|alts| resolve(&headers, alts).is_none())
        .map(|alts| alts.join("|"))
        .collect();

    let numbers = |idx: usize| records.iter().map(move |r| parse_f64_safe(r.get(idx)));

    for alts in spec.null_cols {
        if let Some((name, idx)) = resolve(&headers, alts) {
            let rate = if records.is_empty() {
                None
            } else {
                let nulls = numbers(idx).filter(|v| v.is_none()).count();
                Some(nulls as f64 / records.len() as f64)
            };
            checks.null_rates.insert(name.to_string(), rate);
        }
    }
    for alts in spec.range_cols {
        if let Some((name, idx)) = resolve(&headers, alts) {
            let values: Vec<f64> = numbers(idx).flatten().collect();
            let range = ValueRange {
                min: values.iter().copied().reduce(f64::min),
                max: values.iter().copied().reduce(f64::max),
            };
            checks.ranges.insert(name.to_string(), range);
        }
    }
    Ok(checks)
}

/// Run the gate over `specs` without touching the filesystem beyond reads.
pub fn evaluate(specs: &[TableSpec]) -> QualityReport {
    let mut files = BTreeMap::new();
    let mut errors = Vec::new();

    for spec in specs {
        let status = file_status(&spec.path);
        match status.size_bytes {
            None => errors.push(format!("Missing file: {}", spec.path.display())),
            Some(0) => errors.push(format!("Empty file: {}", spec.path.display())),
            Some(_) => {}
        }
        files.insert(spec.path.display().to_string(), status);
    }
    if !errors.is_empty() {
        return QualityReport {
            status: QualityStatus::Fail,
            files,
            checks: BTreeMap::new(),
            errors,
        };
    }

    let mut checks = BTreeMap::new();
    for spec in specs {
        match check_table(spec) {
            Ok(c) => {
                if !c.missing_expected_cols.is_empty() {
                    errors.push(format!(
                        "{} missing columns: {}",
                        spec.stage,
                        c.missing_expected_cols.join(", ")
                    ));
                }
                checks.insert(spec.stage.to_string(), c);
            }
            Err(e) => errors.push(format!("{} unreadable: {e}", spec.stage)),
        }
    }

    let status = if errors.is_empty() {
        QualityStatus::Ok
    } else {
        QualityStatus::Fail
    };
    QualityReport {
        status,
        files,
        checks,
        errors,
    }
}

/// Evaluate the configured tables and write `quality_report.json` once.
pub fn run_gate(cfg: &Config) -> Result<QualityReport> {
    let report = evaluate(&table_specs(cfg));
    let path = cfg.quality_report_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    write_json(&path, &report)?;

    for (stage, c) in &report.checks {
        info!(stage = %stage, rows = c.rows, cols = c.cols, "quality stats");
        for (col, rate) in &c.null_rates {
            if rate.map_or(false, |r| r > 0.5) {
                warn!(stage = %stage, column = %col, "more than half the cells are null");
            }
        }
    }
    if report.is_ok() {
        info!(path = %path.display(), "quality gate passed");
    } else {
        for e in &report.errors {
            error!("{e}");
        }
    }
    Ok(report)
}

/// Read a previously written quality report; absent or unreadable yields `None`.
pub fn read_quality_report(path: &Path) -> Option<QualityReport> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}
