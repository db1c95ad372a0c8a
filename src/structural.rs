// Long-run metrics per (geo, indicator): first/last values, CAGR, YoY
// volatility and cross-country rank mobility.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{Fact, GrowthRecord, StructuralMetric};
use crate::util::{finite, mean, std_sample};

/// Compound annual growth rate in percent over `periods` calendar years.
///
/// Undefined on a non-positive base, a non-positive period, or non-finite
/// endpoints.
pub fn cagr(first: f64, last: f64, periods: i32) -> Option<f64> {
    if !first.is_finite() || !last.is_finite() {
        return None;
    }
    if first <= 0.0 || periods <= 0 {
        return None;
    }
    finite(((last / first).powf(1.0 / f64::from(periods)) - 1.0) * 100.0)
}

/// Dense ranks, highest value first: `[100, 100, 80, 50]` -> `[1, 1, 2, 3]`.
pub fn dense_rank_desc(values: &[f64]) -> Vec<u32> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    values
        .iter()
        .map(|v| {
            let idx = distinct
                .binary_search_by(|probe| v.total_cmp(probe))
                .unwrap_or_default();
            idx as u32 + 1
        })
        .collect()
}

#[derive(Debug, Default)]
struct YoyStats {
    mean: Option<f64>,
    volatility: Option<f64>,
    n: usize,
}

fn yoy_stats(growth: &[GrowthRecord]) -> HashMap<(&str, &str), YoyStats> {
    let mut by_key: HashMap<(&str, &str), Vec<f64>> = HashMap::new();
    for r in growth {
        if let Some(v) = r.yoy_pct.and_then(finite) {
            by_key
                .entry((r.geo.as_str(), r.indicator.as_str()))
                .or_default()
                .push(v);
        }
    }
    by_key
        .into_iter()
        .map(|(k, v)| {
            let stats = YoyStats {
                mean: mean(&v),
                volatility: std_sample(&v),
                n: v.len(),
            };
            (k, stats)
        })
        .collect()
}

/// Dense rank of each geo within one indicator at one reference year.
fn ranks_at_year<'a>(
    rows: &[(&'a str, i32, f64)],
    year: i32,
) -> HashMap<&'a str, u32> {
    let at_year: Vec<(&str, f64)> = rows
        .iter()
        .filter(|(_, y, _)| *y == year)
        .map(|(g, _, v)| (*g, *v))
        .collect();
    let values: Vec<f64> = at_year.iter().map(|(_, v)| *v).collect();
    let ranks = dense_rank_desc(&values);
    let mut out = HashMap::new();
    for ((geo, _), rank) in at_year.into_iter().zip(ranks) {
        out.entry(geo).or_insert(rank);
    }
    out
}

/// Build one structural row per (geo, indicator) with at least one valued
/// observation.
///
/// `yoy_volatility` is the sample standard deviation of the series' YoY
/// percentages, so it needs at least two growth rows. Rank fields refer to
/// each indicator's globally earliest and latest years, not to the entity's
/// own first and last years.
pub fn compute_structural(facts: &[Fact], growth: &[GrowthRecord]) -> Vec<StructuralMetric> {
    let mut rows: Vec<(&str, &str, i32, f64)> = facts
        .iter()
        .filter_map(|f| {
            let v = f.value.and_then(finite)?;
            Some((f.geo.as_str(), f.indicator.as_str(), f.year, v))
        })
        .collect();
    rows.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)).then_with(|| a.2.cmp(&b.2)));

    let mut groups: BTreeMap<(&str, &str), Vec<(i32, f64)>> = BTreeMap::new();
    let mut by_indicator: BTreeMap<&str, Vec<(&str, i32, f64)>> = BTreeMap::new();
    for (geo, indicator, year, value) in &rows {
        groups.entry((*geo, *indicator)).or_default().push((*year, *value));
        by_indicator.entry(*indicator).or_default().push((*geo, *year, *value));
    }

    let mut rank_first: HashMap<(&str, &str), u32> = HashMap::new();
    let mut rank_last: HashMap<(&str, &str), u32> = HashMap::new();
    for (indicator, ind_rows) in &by_indicator {
        let earliest = ind_rows.iter().map(|(_, y, _)| *y).min();
        let latest = ind_rows.iter().map(|(_, y, _)| *y).max();
        if let (Some(earliest), Some(latest)) = (earliest, latest) {
            for (geo, rank) in ranks_at_year(ind_rows, earliest) {
                rank_first.insert((geo, *indicator), rank);
            }
            for (geo, rank) in ranks_at_year(ind_rows, latest) {
                rank_last.insert((geo, *indicator), rank);
            }
        }
    }

    let stats = yoy_stats(growth);

    let mut out: Vec<StructuralMetric> = Vec::with_capacity(groups.len());
    for ((geo, indicator), points) in &groups {
        let (Some(&(year_first, value_first)), Some(&(year_last, value_last))) =
            (points.first(), points.last())
        else {
            continue;
        };
        let years: BTreeSet<i32> = points.iter().map(|(y, _)| *y).collect();
        let year_min = years.iter().next().copied().unwrap_or(year_first);
        let year_max = years.iter().next_back().copied().unwrap_or(year_last);

        let pct_change = if value_first > 0.0 {
            finite((value_last / value_first - 1.0) * 100.0)
        } else {
            None
        };
        let periods = year_last - year_first;

        let s = stats.get(&(*geo, *indicator));
        let rf = rank_first.get(&(*geo, *indicator)).copied();
        let rl = rank_last.get(&(*geo, *indicator)).copied();

        out.push(StructuralMetric {
            geo: geo.to_string(),
            indicator: indicator.to_string(),
            year_min,
            year_max,
            n_years: years.len(),
            year_first,
            year_last,
            value_first,
            value_last,
            abs_change: value_last - value_first,
            pct_change,
            cagr_pct: cagr(value_first, value_last, periods),
            yoy_mean: s.and_then(|s| s.mean),
            yoy_volatility: s.and_then(|s| s.volatility),
            yoy_n: s.map_or(0, |s| s.n),
            rank_first_year: rf,
            rank_last_year: rl,
            rank_delta: match (rf, rl) {
                (Some(f), Some(l)) => Some(i64::from(f) - i64::from(l)),
                _ => None,
            },
        });
    }

    out.sort_by(|a, b| {
        a.indicator
            .cmp(&b.indicator)
            .then_with(|| cmp_desc_nulls_last(a.cagr_pct, b.cagr_pct))
    });
    out
}

/// Descending order for nullable numbers with nulls after every value.
pub fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
