// Year-over-year growth per (geo, indicator) series.

use std::collections::BTreeMap;

use crate::types::{Fact, GrowthRecord};
use crate::util::growth_pct;

/// Compute `value_prev` and `yoy_pct` for every observation.
///
/// Facts without a value are not observations and are skipped, so within a
/// series `value_prev` is null exactly on the first row. "Previous" is the
/// prior element after sorting by year, not the prior calendar year.
/// Expects deduplicated input; the year sort is stable for anything else.
pub fn compute_growth(facts: &[Fact]) -> Vec<GrowthRecord> {
    let mut series: BTreeMap<(&str, &str), Vec<(i32, f64)>> = BTreeMap::new();
    for f in facts {
        let Some(value) = f.value.filter(|v| v.is_finite()) else {
            continue;
        };
        series
            .entry((f.geo.as_str(), f.indicator.as_str()))
            .or_default()
            .push((f.year, value));
    }

    let mut out = Vec::with_capacity(facts.len());
    for ((geo, indicator), mut points) in series {
        points.sort_by_key(|(year, _)| *year);
        let mut prev: Option<f64> = None;
        for (year, value) in points {
            out.push(GrowthRecord {
                geo: geo.to_string(),
                indicator: indicator.to_string(),
                year,
                value,
                value_prev: prev,
                yoy_pct: growth_pct(Some(value), prev),
            });
            prev = Some(value);
        }
    }
    out
}
