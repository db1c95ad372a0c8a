// Stage orchestration. Each stage reads complete tables, builds new ones,
// and stops the run on the first error.

use std::path::PathBuf;

use tracing::info;

use crate::aggregate::{dedupe_facts, dedupe_structural, regroup_growth};
use crate::charts::render_charts;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::growth::compute_growth;
use crate::insights::synthesize;
use crate::loader::{load_facts, load_growth, load_structural, LoadReport};
use crate::output::write_csv;
use crate::quality::{read_quality_report, run_gate, QualityReport};
use crate::ranking::{build_selections, compute_coverage, retain_geos};
use crate::report::{write_report, ReportContext};
use crate::structural::compute_structural;
use crate::types::{Fact, GrowthRecord, Insight, Selections, StructuralMetric};
use crate::util::is_country_geo;

#[derive(Debug, Clone)]
pub struct GoldOutput {
    pub load: LoadReport,
    pub facts: Vec<Fact>,
    pub growth: Vec<GrowthRecord>,
    pub structural: Vec<StructuralMetric>,
}

#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub path: PathBuf,
    pub selections: Selections,
    pub insights: Vec<Insight>,
}

/// Facts → dedup → growth → structural, persisted under `gold_dir`.
pub fn run_gold(cfg: &Config) -> Result<GoldOutput> {
    let (raw, load) = load_facts(&cfg.input_facts)?;
    let facts = dedupe_facts(&raw);
    info!(raw = raw.len(), deduped = facts.len(), "facts deduplicated");

    let growth = compute_growth(&facts);
    let yoy_source = match &cfg.input_growth {
        Some(path) => {
            let (rows, _) = load_growth(path)?;
            regroup_growth(&rows)
        }
        None => growth.clone(),
    };
    let structural = compute_structural(&facts, &yoy_source);

    write_csv(&cfg.gold_facts_path(), &facts)?;
    write_csv(&cfg.gold_growth_path(), &growth)?;
    write_csv(&cfg.gold_structural_path(), &structural)?;
    info!(
        facts = facts.len(),
        growth = growth.len(),
        structural = structural.len(),
        dir = %cfg.gold_dir.display(),
        "gold tables written"
    );

    Ok(GoldOutput {
        load,
        facts,
        growth,
        structural,
    })
}

/// Run the quality gate; a failing gate is an error carrying its findings.
pub fn run_quality(cfg: &Config) -> Result<QualityReport> {
    let report = run_gate(cfg)?;
    if report.is_ok() {
        Ok(report)
    } else {
        Err(PipelineError::QualityGateFailure {
            report_path: cfg.quality_report_path(),
            errors: report.errors,
        })
    }
}

/// Gold tables → selections → insights → charts → document.
pub fn run_report(cfg: &Config) -> Result<ReportOutput> {
    let (facts, _) = load_facts(&cfg.gold_facts_path())?;
    let (growth, _) = load_growth(&cfg.gold_growth_path())?;
    let (structural, _) = load_structural(&cfg.gold_structural_path())?;

    let mut facts = dedupe_facts(&facts);
    let mut growth = regroup_growth(&growth);
    let mut structural = structural;
    if cfg.country_only {
        facts = retain_geos(facts, is_country_geo);
        growth = retain_geos(growth, is_country_geo);
        structural = retain_geos(structural, is_country_geo);
    }
    let structural = dedupe_structural(structural);

    let coverage = compute_coverage(&facts, &growth, &structural);
    let quality = read_quality_report(&cfg.quality_report_path());

    let selections = build_selections(cfg, &facts, &growth, &structural)?;
    let insights = synthesize(&selections, cfg);
    let charts = render_charts(&selections, cfg)?;

    let path = write_report(&ReportContext {
        cfg,
        selections: &selections,
        insights: &insights,
        coverage: &coverage,
        quality: quality.as_ref(),
        charts: &charts,
    })?;

    Ok(ReportOutput {
        path,
        selections,
        insights,
    })
}

/// Gold, then the gate, then the report. The report is never rendered from
/// tables that failed the gate.
pub fn run_all(cfg: &Config) -> Result<ReportOutput> {
    run_gold(cfg)?;
    run_quality(cfg)?;
    run_report(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const FACTS: &str = "geo,indic_sbs,year,value_num\n\
        DE,IND1,2019,100\n\
        DE,IND1,2020,100\n\
        DE,IND1,2020,50\n\
        FR,IND1,2019,200\n\
        FR,IND1,2020,190\n\
        IT,IND1,2019,150\n\
        IT,IND1,2020,120\n\
        EU27_2020,IND1,2019,5000\n\
        EU27_2020,IND1,2020,5200\n";

    fn setup(facts: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            cagr_min_years: 2,
            ..Config::default()
        }
        .rooted_at(dir.path());
        std::fs::create_dir_all(cfg.input_facts.parent().unwrap()).unwrap();
        std::fs::write(&cfg.input_facts, facts).unwrap();
        (dir, cfg)
    }

    fn exists(p: &Path) -> bool {
        p.exists() && std::fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false)
    }

    #[test]
    fn gold_stage_dedups_and_persists_tables() {
        let (_dir, cfg) = setup(FACTS);
        let out = run_gold(&cfg).unwrap();
        assert_eq!(out.load.total_rows, 9);
        assert_eq!(out.facts.len(), 8);
        let de_2020 = out
            .facts
            .iter()
            .find(|f| f.geo == "DE" && f.year == 2020)
            .unwrap();
        assert_eq!(de_2020.value, Some(150.0));

        let (growth, _) = load_growth(&cfg.gold_growth_path()).unwrap();
        let de = growth.iter().find(|r| r.geo == "DE" && r.year == 2020).unwrap();
        assert_eq!(de.yoy_pct, Some(50.0));

        let (structural, _) = load_structural(&cfg.gold_structural_path()).unwrap();
        let de = structural.iter().find(|r| r.geo == "DE").unwrap();
        assert_eq!(de.cagr_pct, Some(50.0));
        // aggregates stay in the gold tables: EU27, FR, then DE in 2020
        assert_eq!(de.rank_last_year, Some(3));
    }

    #[test]
    fn full_run_writes_quality_report_charts_and_document() {
        let (_dir, cfg) = setup(FACTS);
        let out = run_all(&cfg).unwrap();

        assert!(exists(&cfg.quality_report_path()));
        assert!(exists(&out.path));
        assert!(exists(&cfg.assets_dir().join("top_value.svg")));
        assert!(exists(&cfg.assets_dir().join("top_yoy.svg")));
        assert!(exists(&cfg.assets_dir().join("rank_movers_up.svg")));

        let sel = &out.selections;
        assert_eq!(sel.indicator, "IND1");
        assert!(sel.top_value.iter().all(|r| r.geo != "EU27_2020"));
        assert_eq!(sel.top_value[0].geo, "FR");
        assert_eq!(sel.movers_up[0].geo, "DE");
        assert_eq!(sel.movers_down[0].geo, "IT");
        assert_eq!(sel.cagr_top[0].geo, "DE");

        let doc = std::fs::read_to_string(&out.path).unwrap();
        assert!(doc.contains("Status: **OK**"));
        assert!(doc.contains("assets/top_value.svg"));
        assert!(!out.insights.is_empty());
    }

    #[test]
    fn all_geos_keeps_aggregates_in_selections() {
        let (_dir, cfg) = setup(FACTS);
        let cfg = Config {
            country_only: false,
            ..cfg
        };
        let out = run_all(&cfg).unwrap();
        assert_eq!(out.selections.top_value[0].geo, "EU27_2020");
    }

    #[test]
    fn missing_input_aborts_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default().rooted_at(dir.path());
        let err = run_all(&cfg).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
        assert!(!cfg.gold_facts_path().exists());
    }

    #[test]
    fn undecodable_input_row_passes_gold_and_gate() {
        let (_dir, cfg) = setup(FACTS);
        let mut bytes = FACTS.as_bytes().to_vec();
        bytes.extend_from_slice(b"X\xff,IND1,2020,1\n");
        std::fs::write(&cfg.input_facts, bytes).unwrap();

        let gold = run_gold(&cfg).unwrap();
        assert_eq!(gold.load.parse_errors, 1);
        let report = run_quality(&cfg).unwrap();
        assert_eq!(report.checks["facts"].unreadable_rows, 1);
    }

    #[test]
    fn failing_gate_stops_the_report() {
        let (_dir, cfg) = setup(FACTS);
        run_gold(&cfg).unwrap();
        std::fs::write(
            cfg.gold_facts_path(),
            "geo,indicator,value\nDE,IND1,150\n",
        )
        .unwrap();
        let err = run_quality(&cfg).unwrap_err();
        match err {
            PipelineError::QualityGateFailure { errors, .. } => {
                assert!(errors.iter().any(|e| e.contains("year")));
            }
            other => panic!("expected gate failure, got {other:?}"),
        }
        let written = read_quality_report(&cfg.quality_report_path()).unwrap();
        assert!(!written.is_ok());
        assert!(written.checks.contains_key("gold_yoy_growth"));
    }

    #[test]
    fn prior_growth_table_feeds_volatility_stats() {
        let (dir, cfg) = setup(FACTS);
        let prior = dir.path().join("prior_yoy.csv");
        std::fs::write(
            &prior,
            "geo,indicator,year,value,value_prev\n\
             DE,IND1,2020,10,5\n\
             DE,IND1,2020,10,5\n\
             DE,IND1,2021,30,20\n",
        )
        .unwrap();
        let cfg = Config {
            input_growth: Some(prior),
            ..cfg
        };
        let out = run_gold(&cfg).unwrap();
        let de = out.structural.iter().find(|r| r.geo == "DE").unwrap();
        // 2020 regrouped: 20 over 10 -> 100%; 2021: 30 over 20 -> 50%
        assert_eq!(de.yoy_n, 2);
        assert_eq!(de.yoy_mean, Some(75.0));
    }
}
