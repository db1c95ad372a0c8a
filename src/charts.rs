// Bar charts for the report, one SVG per non-empty selection.
//
// Values may be clipped to a symmetric bound so one outlier does not flatten
// every other bar. Clipping affects the picture only; report tables always
// show the true numbers.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::debug;

use crate::config::{Config, ASSETS_DIR};
use crate::error::{PipelineError, Result};
use crate::types::Selections;

const CHART_SIZE: (u32, u32) = (1050, 480);

fn chart_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Chart(e.to_string())
}

/// Chart file for each selection, relative to the report directory.
/// `None` means the selection was empty and nothing was drawn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSet {
    pub value: Option<String>,
    pub yoy: Option<String>,
    pub rank_up: Option<String>,
    pub rank_down: Option<String>,
    pub cagr_top: Option<String>,
    pub cagr_bottom: Option<String>,
}

pub fn clip_for_chart(values: &[f64], clip_abs: Option<f64>) -> Vec<f64> {
    match clip_abs {
        Some(bound) => {
            let b = bound.abs();
            values.iter().map(|v| v.clamp(-b, b)).collect()
        }
        None => values.to_vec(),
    }
}

fn y_bounds(values: &[f64]) -> (f64, f64) {
    let lo = values.iter().copied().fold(0.0_f64, f64::min);
    let hi = values.iter().copied().fold(0.0_f64, f64::max);
    let pad = (hi - lo) * 0.05;
    let lo = if lo < 0.0 { lo - pad } else { 0.0 };
    let mut hi = if hi > 0.0 { hi + pad } else { 0.0 };
    if hi - lo < 1e-9 {
        hi = lo + 1.0;
    }
    (lo, hi)
}

/// Draw a bar chart of `(label, value)` pairs. Returns `false` without
/// touching the filesystem when there is nothing to draw.
pub fn save_bar_chart(
    path: &Path,
    title: &str,
    y_label: &str,
    bars: &[(String, f64)],
    clip_abs: Option<f64>,
) -> Result<bool> {
    let bars: Vec<&(String, f64)> = bars.iter().filter(|(_, v)| v.is_finite()).collect();
    if bars.is_empty() {
        return Ok(false);
    }
    let labels: Vec<String> = bars.iter().map(|(l, _)| l.clone()).collect();
    let raw: Vec<f64> = bars.iter().map(|(_, v)| *v).collect();
    let values = clip_for_chart(&raw, clip_abs);
    let (lo, hi) = y_bounds(&values);
    let n = labels.len();

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(36)
        .y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), lo..hi)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x: &SegmentValue<usize>| match x {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Geo")
        .y_desc(y_label)
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
                BLUE.mix(0.7).filled(),
            );
            bar.set_margin(0, 0, 6, 6);
            bar
        }))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    debug!(path = %path.display(), bars = n, "chart written");
    Ok(true)
}

/// Render every chart for `sel` into `<report_dir>/assets`.
pub fn render_charts(sel: &Selections, cfg: &Config) -> Result<ChartSet> {
    let assets = cfg.assets_dir();
    std::fs::create_dir_all(&assets)?;
    let n = cfg.top_n;
    let ind = &sel.indicator;

    let draw = |file: &str,
                title: String,
                y_label: &str,
                bars: Vec<(String, f64)>,
                clip: Option<f64>|
     -> Result<Option<String>> {
        let path: PathBuf = assets.join(file);
        let drawn = save_bar_chart(&path, &title, y_label, &bars, clip)?;
        Ok(drawn.then(|| format!("{ASSETS_DIR}/{file}")))
    };

    Ok(ChartSet {
        value: draw(
            "top_value.svg",
            format!("Top {n} countries by value: {ind} ({})", sel.year_top),
            "Value",
            sel.top_value.iter().map(|r| (r.geo.clone(), r.value)).collect(),
            None,
        )?,
        yoy: draw(
            "top_yoy.svg",
            format!(
                "Top {n} YoY growth (%): {ind} ({}) | prev ≥ {}",
                sel.year_yoy, cfg.yoy_min_prev_value
            ),
            "YoY (%)",
            sel.top_yoy.iter().map(|r| (r.geo.clone(), r.yoy_pct)).collect(),
            Some(cfg.yoy_clip_abs_for_chart),
        )?,
        rank_up: draw(
            "rank_movers_up.svg",
            format!(
                "Rank movers UP (value rank): {ind} ({}→{})",
                sel.rank_base_year, sel.year_top
            ),
            "Δ rank (positive = up)",
            sel.movers_up
                .iter()
                .map(|m| (m.geo.clone(), m.rank_delta as f64))
                .collect(),
            None,
        )?,
        rank_down: draw(
            "rank_movers_down.svg",
            format!(
                "Rank movers DOWN (value rank): {ind} ({}→{})",
                sel.rank_base_year, sel.year_top
            ),
            "Δ rank (magnitude)",
            sel.movers_down
                .iter()
                .map(|m| (m.geo.clone(), m.rank_delta.abs() as f64))
                .collect(),
            None,
        )?,
        cagr_top: draw(
            "top_cagr.svg",
            format!("Top {n} CAGR (%): {ind} | min years={}", cfg.cagr_min_years),
            "CAGR (%)",
            sel.cagr_top
                .iter()
                .filter_map(|r| Some((r.geo.clone(), r.cagr_pct?)))
                .collect(),
            Some(cfg.cagr_clip_abs_for_chart),
        )?,
        cagr_bottom: draw(
            "bottom_cagr.svg",
            format!("Bottom {n} CAGR (%): {ind} | min years={}", cfg.cagr_min_years),
            "CAGR (%)",
            sel.cagr_bottom
                .iter()
                .filter_map(|r| Some((r.geo.clone(), r.cagr_pct?)))
                .collect(),
            Some(cfg.cagr_clip_abs_for_chart),
        )?,
    })
}
