use crate::error::{PipelineError, Result};
use crate::types::{Fact, GrowthRecord, RawFactRow, RawGrowthRow, RawStructuralRow, StructuralMetric};
use crate::util::{clean_text, growth_pct, parse_f64_safe, parse_i32_safe, parse_usize_safe};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    /// Rows without a usable key (or required number) that were left out.
    pub dropped_rows: usize,
    /// Cells that held text but failed numeric parsing and became null.
    pub coerced_values: usize,
    /// Rows the CSV reader itself could not decode.
    pub parse_errors: usize,
}

impl LoadReport {
    fn log(&self, table: &str) {
        info!(
            table,
            total = self.total_rows,
            kept = self.kept_rows,
            dropped = self.dropped_rows,
            "table loaded"
        );
        if self.coerced_values > 0 || self.parse_errors > 0 {
            warn!(
                table,
                coerced = self.coerced_values,
                parse_errors = self.parse_errors,
                "non-numeric cells were treated as null"
            );
        }
    }
}

/// Each entry lists the accepted header names for one required column.
type Required<'a> = &'a [&'a [&'a str]];

fn has_column(headers: &StringRecord, name: &str) -> bool {
    headers.iter().any(|h| h == name)
}

fn open_checked(
    path: &Path,
    table: &str,
    required: Required<'_>,
) -> Result<(csv::Reader<File>, StringRecord)> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|alts| !alts.iter().any(|c| has_column(&headers, c)))
        .map(|alts| alts.join("|"))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            table: table.to_string(),
            columns: missing,
        });
    }
    Ok((rdr, headers))
}

/// Parse an optional numeric cell, counting text that did not survive.
fn coerce(cell: Option<&str>, coerced: &mut usize) -> Option<f64> {
    let v = parse_f64_safe(cell);
    if v.is_none() && cell.map_or(false, |s| !s.trim().is_empty()) {
        *coerced += 1;
    }
    v
}

/// Load the cleaned fact table.
///
/// The value column is chosen once from the header: `value_num` wins over
/// `value` when both are present.
pub fn load_facts(path: &Path) -> Result<(Vec<Fact>, LoadReport)> {
    let (mut rdr, headers) = open_checked(
        path,
        "facts",
        &[&["geo"], &["indicator", "indic_sbs"], &["year"], &["value_num", "value"]],
    )?;
    let use_value_num = has_column(&headers, "value_num");
    let mut report = LoadReport::default();
    let mut out = Vec::new();

    for result in rdr.deserialize::<RawFactRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                report.parse_errors += 1;
                continue;
            }
        };
        let (Some(geo), Some(indicator), Some(year)) = (
            clean_text(row.geo),
            clean_text(row.indicator),
            parse_i32_safe(row.year.as_deref()),
        ) else {
            report.dropped_rows += 1;
            continue;
        };
        let cell = if use_value_num { row.value_num } else { row.value };
        let value = coerce(cell.as_deref(), &mut report.coerced_values);
        out.push(Fact::new(geo, indicator, year, value));
    }

    report.kept_rows = out.len();
    report.log("facts");
    Ok((out, report))
}

/// Load a YoY growth table. When the file carries no `yoy_pct` column the
/// percentage is derived from `value` and `value_prev`.
pub fn load_growth(path: &Path) -> Result<(Vec<GrowthRecord>, LoadReport)> {
    let (mut rdr, headers) = open_checked(
        path,
        "growth",
        &[&["geo"], &["indicator", "indic_sbs"], &["year"], &["value"], &["value_prev"]],
    )?;
    let has_yoy = has_column(&headers, "yoy_pct");
    let mut report = LoadReport::default();
    let mut out = Vec::new();

    for result in rdr.deserialize::<RawGrowthRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                report.parse_errors += 1;
                continue;
            }
        };
        let (Some(geo), Some(indicator), Some(year)) = (
            clean_text(row.geo),
            clean_text(row.indicator),
            parse_i32_safe(row.year.as_deref()),
        ) else {
            report.dropped_rows += 1;
            continue;
        };
        let Some(value) = coerce(row.value.as_deref(), &mut report.coerced_values) else {
            report.dropped_rows += 1;
            continue;
        };
        let value_prev = coerce(row.value_prev.as_deref(), &mut report.coerced_values);
        let yoy_pct = if has_yoy {
            coerce(row.yoy_pct.as_deref(), &mut report.coerced_values)
        } else {
            growth_pct(Some(value), value_prev)
        };
        out.push(GrowthRecord {
            geo,
            indicator,
            year,
            value,
            value_prev,
            yoy_pct,
        });
    }

    report.kept_rows = out.len();
    report.log("growth");
    Ok((out, report))
}

/// Load a structural metrics table. The CAGR column is resolved once from the
/// header: `cagr_pct` first, then the legacy `cagr`; neither means no CAGR.
pub fn load_structural(path: &Path) -> Result<(Vec<StructuralMetric>, LoadReport)> {
    let (mut rdr, headers) = open_checked(
        path,
        "structural",
        &[
            &["geo"],
            &["indicator", "indic_sbs"],
            &["n_years"],
            &["year_first"],
            &["year_last"],
            &["value_first"],
            &["value_last"],
        ],
    )?;
    let cagr_col = if has_column(&headers, "cagr_pct") {
        Some("cagr_pct")
    } else if has_column(&headers, "cagr") {
        Some("cagr")
    } else {
        None
    };
    let mut report = LoadReport::default();
    let mut out = Vec::new();

    for result in rdr.deserialize::<RawStructuralRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                report.parse_errors += 1;
                continue;
            }
        };
        let c = &mut report.coerced_values;
        let (
            Some(geo),
            Some(indicator),
            Some(n_years),
            Some(year_first),
            Some(year_last),
            Some(value_first),
            Some(value_last),
        ) = (
            clean_text(row.geo),
            clean_text(row.indicator),
            parse_usize_safe(row.n_years.as_deref()),
            parse_i32_safe(row.year_first.as_deref()),
            parse_i32_safe(row.year_last.as_deref()),
            coerce(row.value_first.as_deref(), c),
            coerce(row.value_last.as_deref(), c),
        )
        else {
            report.dropped_rows += 1;
            continue;
        };
        let cagr_cell = match cagr_col {
            Some("cagr_pct") => row.cagr_pct,
            Some(_) => row.cagr,
            None => None,
        };
        out.push(StructuralMetric {
            geo,
            indicator,
            year_min: parse_i32_safe(row.year_min.as_deref()).unwrap_or(year_first),
            year_max: parse_i32_safe(row.year_max.as_deref()).unwrap_or(year_last),
            n_years,
            year_first,
            year_last,
            value_first,
            value_last,
            abs_change: coerce(row.abs_change.as_deref(), c).unwrap_or(value_last - value_first),
            pct_change: coerce(row.pct_change.as_deref(), c),
            cagr_pct: coerce(cagr_cell.as_deref(), c),
            yoy_mean: coerce(row.yoy_mean.as_deref(), c),
            yoy_volatility: coerce(row.yoy_volatility.as_deref(), c),
            yoy_n: parse_usize_safe(row.yoy_n.as_deref()).unwrap_or(0),
            rank_first_year: parse_usize_safe(row.rank_first_year.as_deref())
                .and_then(|v| u32::try_from(v).ok()),
            rank_last_year: parse_usize_safe(row.rank_last_year.as_deref())
                .and_then(|v| u32::try_from(v).ok()),
            rank_delta: parse_i32_safe(row.rank_delta.as_deref()).map(i64::from),
        });
    }

    report.kept_rows = out.len();
    report.log("structural");
    Ok((out, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn facts_drop_keyless_rows_and_coerce_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "facts.csv",
            "geo,indic_sbs,year,value\n\
             DE,V1,2019,100\n\
             ,V1,2019,5\n\
             FR,V1,,7\n\
             FR,V1,2020,:\n\
             FR,V1,2021,\n",
        );
        let (facts, report) = load_facts(&path).unwrap();
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0], Fact::new("DE", "V1", 2019, Some(100.0)));
        assert_eq!(facts[1].value, None);
        assert_eq!(facts[2].value, None);
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(report.coerced_values, 1);
    }

    #[test]
    fn scientific_notation_survives_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("growth.csv");
        let rows = vec![GrowthRecord {
            geo: "DE".into(),
            indicator: "V1".into(),
            year: 2020,
            value: 100.0,
            value_prev: Some(100.0),
            yoy_pct: Some(0.000001),
        }];
        crate::output::write_csv(&path, &rows).unwrap();
        let (loaded, report) = load_growth(&path).unwrap();
        assert_eq!(loaded[0].yoy_pct, Some(0.000001));
        assert_eq!(report.coerced_values, 0);

        let facts = write_file(
            dir.path(),
            "facts.csv",
            "geo,indicator,year,value
DE,V1,2019,1.5e-05
DE,V1,2020,2E+3
",
        );
        let (facts, report) = load_facts(&facts).unwrap();
        let values: Vec<Option<f64>> = facts.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![Some(0.000015), Some(2000.0)]);
        assert_eq!(report.coerced_values, 0);
    }

    #[test]
    fn value_num_takes_precedence_over_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "facts.csv",
            "geo,indicator,year,value,value_num\nDE,V1,2019,1 p,1.5\n",
        );
        let (facts, report) = load_facts(&path).unwrap();
        assert_eq!(facts[0].value, Some(1.5));
        assert_eq!(report.coerced_values, 0);
    }

    #[test]
    fn missing_year_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "facts.csv", "geo,indicator,value\nDE,V1,1\n");
        match load_facts(&path) {
            Err(PipelineError::Schema { table, columns }) => {
                assert_eq!(table, "facts");
                assert_eq!(columns, vec!["year".to_string()]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = load_facts(Path::new("/nope/facts.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }

    #[test]
    fn growth_without_yoy_column_derives_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "yoy.csv",
            "geo,indicator,year,value,value_prev\nDE,V1,2020,150,100\nDE,V1,2019,100,\n",
        );
        let (rows, _) = load_growth(&path).unwrap();
        assert_eq!(rows[0].yoy_pct, Some(50.0));
        assert_eq!(rows[1].value_prev, None);
        assert_eq!(rows[1].yoy_pct, None);
    }

    #[test]
    fn structural_prefers_cagr_pct_then_legacy_cagr() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = write_file(
            dir.path(),
            "legacy.csv",
            "geo,indicator,n_years,year_first,year_last,value_first,value_last,cagr\n\
             DE,V1,2,2019,2020,100,150,50\n",
        );
        let (rows, _) = load_structural(&legacy).unwrap();
        assert_eq!(rows[0].cagr_pct, Some(50.0));
        assert_eq!(rows[0].abs_change, 50.0);
        assert_eq!(rows[0].year_min, 2019);

        let both = write_file(
            dir.path(),
            "both.csv",
            "geo,indicator,n_years,year_first,year_last,value_first,value_last,cagr,cagr_pct\n\
             DE,V1,2,2019,2020,100,150,1,50\n",
        );
        let (rows, _) = load_structural(&both).unwrap();
        assert_eq!(rows[0].cagr_pct, Some(50.0));

        let none = write_file(
            dir.path(),
            "none.csv",
            "geo,indicator,n_years,year_first,year_last,value_first,value_last\n\
             DE,V1,2,2019,2020,100,150\n",
        );
        let (rows, _) = load_structural(&none).unwrap();
        assert_eq!(rows[0].cagr_pct, None);
        assert_eq!(rows[0].yoy_n, 0);
    }
}
