// Markdown report assembly.
//
// The document embeds the selection tables (true, unclipped values), links
// the chart images by relative path, and lists the methodology parameters.
// A selection with no rows gets no section at all.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::charts::ChartSet;
use crate::config::Config;
use crate::error::Result;
use crate::output::markdown_table;
use crate::quality::{QualityReport, QualityStatus};
use crate::types::{
    CagrDisplayRow, Coverage, CoverageDisplayRow, Insight, RankDisplayRow, RankMove, Selections,
    StructuralMetric, ValueDisplayRow, ValueRow, YoyDisplayRow, YoyRow,
};
use crate::util::{format_int, human_number, pct1, pct2};

pub struct ReportContext<'a> {
    pub cfg: &'a Config,
    pub selections: &'a Selections,
    pub insights: &'a [Insight],
    pub coverage: &'a Coverage,
    pub quality: Option<&'a QualityReport>,
    pub charts: &'a ChartSet,
}

pub fn value_rows(rows: &[ValueRow]) -> Vec<ValueDisplayRow> {
    rows.iter()
        .map(|r| ValueDisplayRow {
            geo: r.geo.clone(),
            year: r.year.to_string(),
            value: human_number(Some(r.value), 2),
        })
        .collect()
}

pub fn yoy_rows(rows: &[YoyRow]) -> Vec<YoyDisplayRow> {
    rows.iter()
        .map(|r| YoyDisplayRow {
            geo: r.geo.clone(),
            year: r.year.to_string(),
            value: human_number(Some(r.value), 2),
            prev: human_number(Some(r.value_prev), 2),
            delta_abs: human_number(Some(r.value - r.value_prev), 2),
            yoy: pct1(Some(r.yoy_pct)),
        })
        .collect()
}

pub fn rank_rows(rows: &[RankMove]) -> Vec<RankDisplayRow> {
    rows.iter()
        .map(|r| RankDisplayRow {
            geo: r.geo.clone(),
            rank_base: r.rank_base,
            rank_last: r.rank_last,
            rank_delta: r.rank_delta,
            value_base: human_number(Some(r.value_base), 2),
            value_last: human_number(Some(r.value_last), 2),
            pct_change: pct1(r.pct_change),
        })
        .collect()
}

pub fn cagr_rows(rows: &[StructuralMetric]) -> Vec<CagrDisplayRow> {
    rows.iter()
        .map(|r| CagrDisplayRow {
            geo: r.geo.clone(),
            years: format!("{}→{}", r.year_first, r.year_last),
            n_years: r.n_years,
            cagr: pct2(r.cagr_pct),
            pct_change: pct2(r.pct_change),
            abs_change: human_number(Some(r.abs_change), 2),
        })
        .collect()
}

fn year_span(min: Option<i32>, max: Option<i32>) -> String {
    match (min, max) {
        (Some(a), Some(b)) => format!("{a}–{b}"),
        _ => "—".to_string(),
    }
}

fn coverage_rows(c: &Coverage) -> Vec<CoverageDisplayRow> {
    vec![
        CoverageDisplayRow {
            table: "Country × indicator × year".to_string(),
            rows: format_int(c.top_rows),
            countries: format_int(c.top_countries),
            indicators: format_int(c.top_indicators),
            years: year_span(c.top_year_min, c.top_year_max),
            missing: format!("{:.1}% value", c.top_missing_value_pct),
        },
        CoverageDisplayRow {
            table: "YoY growth".to_string(),
            rows: format_int(c.yoy_rows),
            countries: format_int(c.yoy_countries),
            indicators: format_int(c.yoy_indicators),
            years: year_span(c.yoy_year_min, c.yoy_year_max),
            missing: format!("{:.1}% yoy", c.yoy_missing_pct),
        },
    ]
}

fn section(out: &mut String, heading: &str, chart: Option<&str>, table: Option<String>) {
    let Some(table) = table else {
        return;
    };
    out.push_str(&format!("## {heading}\n\n"));
    if let Some(src) = chart {
        out.push_str(&format!("![{heading}]({src})\n\n"));
    }
    out.push_str(&table);
    out.push_str("\n\n");
}

/// Render the complete document. Pure apart from the timestamp argument.
pub fn render_markdown(ctx: &ReportContext<'_>, generated_at: DateTime<Utc>) -> String {
    let cfg = ctx.cfg;
    let sel = ctx.selections;
    let n = cfg.top_n;
    let mut out = String::new();

    out.push_str("# Gold Report\n\n");
    out.push_str(&format!(
        "_Generated at {}_\n\n",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!("- Main indicator: **{}**\n", sel.indicator));
    out.push_str(&format!("- Latest value year: {}\n", sel.year_top));
    out.push_str(&format!("- Latest YoY year: {}\n", sel.year_yoy));
    out.push_str(&format!("- Rank base year: {}\n", sel.rank_base_year));
    out.push_str(&format!(
        "- Geography: {}\n\n",
        if cfg.country_only {
            "countries only (aggregates removed)"
        } else {
            "all codes"
        }
    ));

    out.push_str("## Coverage\n\n");
    if let Some(t) = markdown_table(&coverage_rows(ctx.coverage)) {
        out.push_str(&t);
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "Structural rows: {} (CAGR available: {})\n\n",
        format_int(ctx.coverage.struct_rows),
        if ctx.coverage.struct_has_cagr { "yes" } else { "no" }
    ));

    out.push_str("## Quality\n\n");
    match ctx.quality {
        Some(q) => {
            let status = match q.status {
                QualityStatus::Ok => "OK",
                QualityStatus::Fail => "FAIL",
            };
            out.push_str(&format!("Status: **{status}**\n\n"));
            for e in &q.errors {
                out.push_str(&format!("- {e}\n"));
            }
            if !q.errors.is_empty() {
                out.push('\n');
            }
        }
        None => out.push_str("No quality report found.\n\n"),
    }

    if !ctx.insights.is_empty() {
        out.push_str("## Insights\n\n");
        for i in ctx.insights {
            out.push_str(&format!("- **{}**: {}\n", i.title, i.text));
        }
        out.push('\n');
    }

    let charts = ctx.charts;
    section(
        &mut out,
        &format!("Top {n} by value ({})", sel.year_top),
        charts.value.as_deref(),
        markdown_table(&value_rows(&sel.top_value)),
    );
    section(
        &mut out,
        &format!("Top {n} YoY growth ({})", sel.year_yoy),
        charts.yoy.as_deref(),
        markdown_table(&yoy_rows(&sel.top_yoy)),
    );
    section(
        &mut out,
        &format!("Rank movers up ({}→{})", sel.rank_base_year, sel.year_top),
        charts.rank_up.as_deref(),
        markdown_table(&rank_rows(&sel.movers_up)),
    );
    section(
        &mut out,
        &format!("Rank movers down ({}→{})", sel.rank_base_year, sel.year_top),
        charts.rank_down.as_deref(),
        markdown_table(&rank_rows(&sel.movers_down)),
    );
    if sel.has_cagr {
        section(
            &mut out,
            &format!("Top {n} CAGR"),
            charts.cagr_top.as_deref(),
            markdown_table(&cagr_rows(&sel.cagr_top)),
        );
        section(
            &mut out,
            &format!("Bottom {n} CAGR"),
            charts.cagr_bottom.as_deref(),
            markdown_table(&cagr_rows(&sel.cagr_bottom)),
        );
    }

    out.push_str("## Methodology\n\n");
    out.push_str(&format!(
        "- YoY minimum baseline (value_prev): {}\n",
        cfg.yoy_min_prev_value
    ));
    out.push_str(&format!(
        "- YoY chart clip: ±{}% (tables show true values)\n",
        cfg.yoy_clip_abs_for_chart
    ));
    out.push_str(&format!(
        "- CAGR chart clip: ±{}% (tables show true values)\n",
        cfg.cagr_clip_abs_for_chart
    ));
    out.push_str(&format!("- CAGR minimum years: {}\n", cfg.cagr_min_years));
    out.push_str(&format!("- Top-N size: {}\n", n));
    out.push_str("- Ranks: dense, descending by value (1 = highest)\n");
    out.push_str("- CAGR period: year_last − year_first (calendar span)\n");
    out
}

/// Write the document to `<report_dir>/gold_report.md`.
pub fn write_report(ctx: &ReportContext<'_>) -> Result<PathBuf> {
    std::fs::create_dir_all(&ctx.cfg.report_dir)?;
    let path = ctx.cfg.report_path();
    let doc = render_markdown(ctx, Utc::now());
    std::fs::write(&path, doc)?;
    info!(path = %path.display(), "report generated");
    Ok(path)
}
