// Short rule-based statements derived from the ranked selections.

use crate::config::Config;
use crate::types::{Insight, Selections};
use crate::util::{human_number, pct1, pct2};

fn insight(title: &str, text: String) -> Insight {
    Insight {
        title: title.to_string(),
        text,
    }
}

/// Map the selections to an ordered list of insights.
///
/// Each data insight reads only the first row of its own selection; the
/// methodology notes depend on configuration alone and are emitted whenever
/// their selection is non-empty.
pub fn synthesize(sel: &Selections, cfg: &Config) -> Vec<Insight> {
    let mut out = Vec::new();

    if let Some(lead) = sel.top_value.first() {
        out.push(insight(
            "Latest-year leader",
            format!(
                "In {}, {} leads {} by total country value ({}).",
                sel.year_top,
                lead.geo,
                sel.indicator,
                human_number(Some(lead.value), 2)
            ),
        ));
    }

    if let Some(best) = sel.top_yoy.first() {
        out.push(insight(
            "Fastest YoY growth (cleaned)",
            format!(
                "In {}, {} grows {} YoY (prev={}).",
                sel.year_yoy,
                best.geo,
                pct1(Some(best.yoy_pct)),
                human_number(Some(best.value_prev), 2)
            ),
        ));
        out.push(insight(
            "Why YoY can look 'zero'",
            "If Value and Prev are very close, YoY becomes a small fraction and rounds to 0.0% \
             at 1 decimal. Use Δ abs to interpret small changes."
                .to_string(),
        ));
        out.push(insight(
            "Why YoY is filtered",
            format!(
                "YoY excludes near-zero baselines (prev < {}) and the chart is clipped at ±{}% \
                 for readability.",
                cfg.yoy_min_prev_value, cfg.yoy_clip_abs_for_chart
            ),
        ));
    }

    if let Some(m) = sel.movers_up.first() {
        out.push(insight(
            "Biggest rank gain (value rank)",
            format!(
                "{} improves by +{} positions from {} to {} (Δ%={}).",
                m.geo,
                m.rank_delta,
                sel.rank_base_year,
                sel.year_top,
                pct1(m.pct_change)
            ),
        ));
    }

    if let Some(m) = sel.movers_down.first() {
        out.push(insight(
            "Biggest rank loss (value rank)",
            format!(
                "{} drops by {} positions from {} to {} (Δ%={}).",
                m.geo,
                m.rank_delta.abs(),
                sel.rank_base_year,
                sel.year_top,
                pct1(m.pct_change)
            ),
        ));
    }

    if !sel.movers_up.is_empty() || !sel.movers_down.is_empty() {
        out.push(insight(
            "How ties are handled",
            "Ranks are computed with dense ranking (ties share the same rank). Rank deltas \
             reflect changes in the ordered position, not row index."
                .to_string(),
        ));
    }

    if let Some(c) = sel.cagr_top.first() {
        out.push(insight(
            "Best long-run performer (CAGR)",
            format!(
                "{} shows the strongest CAGR: {} over {}→{} (min years={}).",
                c.geo,
                pct2(c.cagr_pct),
                c.year_first,
                c.year_last,
                cfg.cagr_min_years
            ),
        ));
    }

    if let Some(c) = sel.cagr_bottom.first() {
        out.push(insight(
            "Weakest long-run performer (CAGR)",
            format!(
                "{} shows the weakest CAGR: {} over {}→{}.",
                c.geo,
                pct2(c.cagr_pct),
                c.year_first,
                c.year_last
            ),
        ));
    }

    if !sel.cagr_top.is_empty() {
        out.push(insight(
            "Interpreting negative CAGR",
            "Negative CAGR means the indicator decreases over the period. Whether that is good \
             or bad depends on the indicator semantics."
                .to_string(),
        ));
    }

    out
}
