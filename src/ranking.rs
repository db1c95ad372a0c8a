// Bounded, deterministically ordered views over the gold tables.
//
// Every sort here is stable, so rows that tie on the ranking key keep their
// input order and repeated runs give identical output.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::structural::dense_rank_desc;
use crate::types::{
    Coverage, Fact, GrowthRecord, RankMove, Selections, StructuralMetric, ValueRow, YoyRow,
};
use crate::util::{finite, growth_pct};

/// Rows keyed by a geo code, so one inclusion predicate serves every table.
pub trait HasGeo {
    fn geo(&self) -> &str;
}

impl HasGeo for Fact {
    fn geo(&self) -> &str {
        &self.geo
    }
}

impl HasGeo for GrowthRecord {
    fn geo(&self) -> &str {
        &self.geo
    }
}

impl HasGeo for StructuralMetric {
    fn geo(&self) -> &str {
        &self.geo
    }
}

pub fn retain_geos<T: HasGeo>(rows: Vec<T>, keep: impl Fn(&str) -> bool) -> Vec<T> {
    rows.into_iter().filter(|r| keep(r.geo())).collect()
}

/// The forced indicator when it occurs in the data, otherwise the most
/// frequent one (ties go to the lexicographically smallest code).
pub fn pick_main_indicator(facts: &[Fact], forced: Option<&str>) -> Option<String> {
    if let Some(f) = forced {
        if facts.iter().any(|r| r.indicator == f) {
            return Some(f.to_string());
        }
        debug!(forced = f, "forced indicator not present; falling back to most frequent");
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in facts {
        *counts.entry(r.indicator.as_str()).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (ind, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((ind, n));
        }
    }
    best.map(|(ind, _)| ind.to_string())
}

/// Configured base year if observed; else `latest - lookback` if observed;
/// else the earliest observed year.
pub fn resolve_rank_base_year(
    years: &BTreeSet<i32>,
    latest: i32,
    configured: Option<i32>,
    lookback: i32,
) -> Option<i32> {
    if let Some(y) = configured.filter(|y| years.contains(y)) {
        return Some(y);
    }
    let candidate = latest - lookback;
    if years.contains(&candidate) {
        return Some(candidate);
    }
    years.iter().next().copied()
}

pub fn top_by_value(facts: &[Fact], year: i32, n: usize) -> Vec<ValueRow> {
    let mut rows: Vec<ValueRow> = facts
        .iter()
        .filter(|f| f.year == year)
        .filter_map(|f| {
            Some(ValueRow {
                geo: f.geo.clone(),
                year: f.year,
                value: f.value.and_then(finite)?,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));
    rows.truncate(n);
    rows
}

/// Fastest growers at `year`, leaving out rows whose baseline is below
/// `min_prev` (a missing baseline counts as zero) or whose growth is null.
pub fn top_by_yoy(growth: &[GrowthRecord], year: i32, min_prev: f64, n: usize) -> Vec<YoyRow> {
    let mut rows: Vec<YoyRow> = growth
        .iter()
        .filter(|r| r.year == year)
        .filter(|r| r.value_prev.unwrap_or(0.0) >= min_prev)
        .filter_map(|r| {
            Some(YoyRow {
                geo: r.geo.clone(),
                year: r.year,
                value: r.value,
                value_prev: r.value_prev.and_then(finite)?,
                yoy_pct: r.yoy_pct.and_then(finite)?,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.yoy_pct.total_cmp(&a.yoy_pct));
    rows.truncate(n);
    rows
}

/// (geo, value, dense rank) at `year`, highest value first.
fn ranking_at(facts: &[Fact], year: i32) -> Vec<(String, f64, u32)> {
    let mut rows: Vec<(String, f64)> = facts
        .iter()
        .filter(|f| f.year == year)
        .filter_map(|f| Some((f.geo.clone(), f.value.and_then(finite)?)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    let values: Vec<f64> = rows.iter().map(|(_, v)| *v).collect();
    let ranks = dense_rank_desc(&values);
    rows.into_iter()
        .zip(ranks)
        .map(|((geo, value), rank)| (geo, value, rank))
        .collect()
}

/// Join the base-year ranking to the latest-year ranking on geo.
pub fn rank_changes(facts: &[Fact], base_year: i32, last_year: i32) -> Vec<RankMove> {
    let last = ranking_at(facts, last_year);
    let mut last_by_geo: HashMap<&str, (f64, u32)> = HashMap::new();
    for (geo, value, rank) in &last {
        last_by_geo.entry(geo.as_str()).or_insert((*value, *rank));
    }
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (geo, value_base, rank_base) in ranking_at(facts, base_year) {
        let Some(&(value_last, rank_last)) = last_by_geo.get(geo.as_str()) else {
            continue;
        };
        if !seen.insert(geo.clone()) {
            continue;
        }
        out.push(RankMove {
            geo,
            rank_base,
            rank_last,
            rank_delta: i64::from(rank_base) - i64::from(rank_last),
            value_base,
            value_last,
            pct_change: growth_pct(Some(value_last), Some(value_base)),
        });
    }
    out
}

/// Biggest climbers (positive delta) and biggest fallers (negative delta),
/// each bounded to `n`.
pub fn rank_movers(moves: &[RankMove], n: usize) -> (Vec<RankMove>, Vec<RankMove>) {
    let mut up: Vec<RankMove> = moves.iter().filter(|m| m.rank_delta > 0).cloned().collect();
    up.sort_by(|a, b| b.rank_delta.cmp(&a.rank_delta));
    up.truncate(n);

    let mut down: Vec<RankMove> = moves.iter().filter(|m| m.rank_delta < 0).cloned().collect();
    down.sort_by(|a, b| a.rank_delta.cmp(&b.rank_delta));
    down.truncate(n);

    (up, down)
}

/// CAGR leaders and laggards among rows with a CAGR and enough years.
pub fn cagr_leaders(
    rows: &[StructuralMetric],
    min_years: usize,
    n: usize,
) -> (Vec<StructuralMetric>, Vec<StructuralMetric>) {
    let eligible: Vec<&StructuralMetric> = rows
        .iter()
        .filter(|r| r.cagr_pct.and_then(finite).is_some() && r.n_years >= min_years)
        .collect();
    let key = |r: &StructuralMetric| r.cagr_pct.unwrap_or(0.0);

    let mut top = eligible.clone();
    top.sort_by(|a, b| key(*b).total_cmp(&key(*a)));
    let mut bottom = eligible;
    bottom.sort_by(|a, b| key(*a).total_cmp(&key(*b)));

    (
        top.into_iter().take(n).cloned().collect(),
        bottom.into_iter().take(n).cloned().collect(),
    )
}

fn year_range<I: Iterator<Item = i32>>(years: I) -> (Option<i32>, Option<i32>) {
    let years: Vec<i32> = years.collect();
    (years.iter().min().copied(), years.iter().max().copied())
}

pub fn compute_coverage(
    facts: &[Fact],
    growth: &[GrowthRecord],
    structural: &[StructuralMetric],
) -> Coverage {
    let pct = |missing: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            missing as f64 / total as f64 * 100.0
        }
    };
    let (top_year_min, top_year_max) = year_range(facts.iter().map(|f| f.year));
    let (yoy_year_min, yoy_year_max) = year_range(growth.iter().map(|r| r.year));
    Coverage {
        top_rows: facts.len(),
        top_countries: facts.iter().map(|f| f.geo.as_str()).collect::<HashSet<_>>().len(),
        top_indicators: facts
            .iter()
            .map(|f| f.indicator.as_str())
            .collect::<HashSet<_>>()
            .len(),
        top_year_min,
        top_year_max,
        top_missing_value_pct: pct(
            facts.iter().filter(|f| f.value.is_none()).count(),
            facts.len(),
        ),
        yoy_rows: growth.len(),
        yoy_countries: growth.iter().map(|r| r.geo.as_str()).collect::<HashSet<_>>().len(),
        yoy_indicators: growth
            .iter()
            .map(|r| r.indicator.as_str())
            .collect::<HashSet<_>>()
            .len(),
        yoy_year_min,
        yoy_year_max,
        yoy_missing_pct: pct(
            growth.iter().filter(|r| r.yoy_pct.is_none()).count(),
            growth.len(),
        ),
        struct_rows: structural.len(),
        struct_has_cagr: structural.iter().any(|r| r.cagr_pct.is_some()),
    }
}

/// Build every selection for the main indicator.
///
/// Fails with `EmptyResult` when no indicator can be chosen or when the main
/// indicator has no valued facts or no row with a valid YoY.
pub fn build_selections(
    cfg: &Config,
    facts: &[Fact],
    growth: &[GrowthRecord],
    structural: &[StructuralMetric],
) -> Result<Selections> {
    let indicator = pick_main_indicator(facts, cfg.force_indicator.as_deref()).ok_or_else(|| {
        PipelineError::EmptyResult("could not select a main indicator (fact table is empty)".into())
    })?;

    let facts_main: Vec<Fact> = facts
        .iter()
        .filter(|f| f.indicator == indicator)
        .cloned()
        .collect();
    let growth_main: Vec<GrowthRecord> = growth
        .iter()
        .filter(|r| r.indicator == indicator)
        .cloned()
        .collect();
    let struct_main: Vec<StructuralMetric> = structural
        .iter()
        .filter(|r| r.indicator == indicator)
        .cloned()
        .collect();

    let years: BTreeSet<i32> = facts_main
        .iter()
        .filter(|f| f.value.is_some())
        .map(|f| f.year)
        .collect();
    let year_top = *years.iter().next_back().ok_or_else(|| {
        PipelineError::EmptyResult(format!("no valued facts for indicator {indicator}"))
    })?;
    // A series' first row has no YoY, so a new entrant must not move the period.
    let year_yoy = growth_main
        .iter()
        .filter(|r| r.yoy_pct.and_then(finite).is_some())
        .map(|r| r.year)
        .max()
        .ok_or_else(|| {
            PipelineError::EmptyResult(format!("no valid YoY rows for indicator {indicator}"))
        })?;
    let rank_base_year = resolve_rank_base_year(
        &years,
        year_top,
        cfg.rank_base_year,
        cfg.rank_lookback_years,
    )
    .unwrap_or(year_top);

    let top_value = top_by_value(&facts_main, year_top, cfg.top_n);
    let top_yoy = top_by_yoy(&growth_main, year_yoy, cfg.yoy_min_prev_value, cfg.top_n);
    let moves = rank_changes(&facts_main, rank_base_year, year_top);
    let (movers_up, movers_down) = rank_movers(&moves, cfg.top_n);
    let has_cagr = struct_main.iter().any(|r| r.cagr_pct.is_some());
    let (cagr_top, cagr_bottom) = if has_cagr {
        cagr_leaders(&struct_main, cfg.cagr_min_years, cfg.top_n)
    } else {
        (Vec::new(), Vec::new())
    };

    info!(
        indicator = %indicator,
        year_top,
        year_yoy,
        rank_base_year,
        top_value = top_value.len(),
        top_yoy = top_yoy.len(),
        movers_up = movers_up.len(),
        movers_down = movers_down.len(),
        cagr_top = cagr_top.len(),
        "selections built"
    );

    Ok(Selections {
        indicator,
        year_top,
        year_yoy,
        rank_base_year,
        top_value,
        top_yoy,
        movers_up,
        movers_down,
        has_cagr,
        cagr_top,
        cagr_bottom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::compute_growth;
    use crate::structural::compute_structural;
    use crate::util::is_country_geo;

    fn reference_facts() -> Vec<Fact> {
        vec![
            Fact::new("DE", "IND1", 2019, Some(100.0)),
            Fact::new("DE", "IND1", 2020, Some(150.0)),
            Fact::new("FR", "IND1", 2019, Some(200.0)),
            Fact::new("FR", "IND1", 2020, Some(190.0)),
            Fact::new("IT", "IND1", 2019, Some(150.0)),
            Fact::new("IT", "IND1", 2020, Some(120.0)),
        ]
    }

    fn rank_move(geo: &str, delta: i64) -> RankMove {
        RankMove {
            geo: geo.to_string(),
            rank_base: 5,
            rank_last: (5 - delta) as u32,
            rank_delta: delta,
            value_base: 1.0,
            value_last: 1.0,
            pct_change: Some(0.0),
        }
    }

    #[test]
    fn indicator_pick_forced_then_mode() {
        let mut facts = reference_facts();
        facts.push(Fact::new("DE", "IND0", 2020, Some(1.0)));
        assert_eq!(pick_main_indicator(&facts, None).as_deref(), Some("IND1"));
        assert_eq!(pick_main_indicator(&facts, Some("IND0")).as_deref(), Some("IND0"));
        assert_eq!(pick_main_indicator(&facts, Some("NOPE")).as_deref(), Some("IND1"));
        assert_eq!(pick_main_indicator(&[], None), None);

        let tie = vec![
            Fact::new("DE", "B", 2020, Some(1.0)),
            Fact::new("DE", "A", 2020, Some(1.0)),
        ];
        assert_eq!(pick_main_indicator(&tie, None).as_deref(), Some("A"));
    }

    #[test]
    fn base_year_resolution() {
        let years: BTreeSet<i32> = [2012, 2015, 2020].into_iter().collect();
        assert_eq!(resolve_rank_base_year(&years, 2020, Some(2012), 5), Some(2012));
        assert_eq!(resolve_rank_base_year(&years, 2020, Some(2013), 5), Some(2015));
        assert_eq!(resolve_rank_base_year(&years, 2020, None, 3), Some(2012));
        assert_eq!(resolve_rank_base_year(&BTreeSet::new(), 2020, None, 5), None);
    }

    #[test]
    fn value_top_n_is_bounded_and_stable_on_ties() {
        let facts = vec![
            Fact::new("AT", "I", 2020, Some(5.0)),
            Fact::new("BE", "I", 2020, Some(9.0)),
            Fact::new("CZ", "I", 2020, Some(5.0)),
            Fact::new("DK", "I", 2020, None),
            Fact::new("EE", "I", 2019, Some(99.0)),
        ];
        let out = top_by_value(&facts, 2020, 2);
        let geos: Vec<&str> = out.iter().map(|r| r.geo.as_str()).collect();
        assert_eq!(geos, vec!["BE", "AT"]);
        let all = top_by_value(&facts, 2020, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].geo, "CZ");
    }

    #[test]
    fn yoy_min_baseline_excludes_small_prev() {
        let growth = compute_growth(&reference_facts());
        let out = top_by_yoy(&growth, 2020, 120.0, 10);
        let geos: Vec<&str> = out.iter().map(|r| r.geo.as_str()).collect();
        // DE grew 50% but from a baseline of 100
        assert_eq!(geos, vec!["FR", "IT"]);

        let out = top_by_yoy(&growth, 2020, 1.0, 10);
        assert_eq!(out[0].geo, "DE");
        assert_eq!(out[0].yoy_pct, 50.0);
    }

    #[test]
    fn yoy_drops_null_growth() {
        let growth = vec![GrowthRecord {
            geo: "DE".into(),
            indicator: "I".into(),
            year: 2020,
            value: 1.0,
            value_prev: Some(5.0),
            yoy_pct: None,
        }];
        assert!(top_by_yoy(&growth, 2020, 1.0, 10).is_empty());
    }

    #[test]
    fn rank_changes_for_reference_fixture() {
        let moves = rank_changes(&reference_facts(), 2019, 2020);
        assert_eq!(moves.len(), 3);
        let de = moves.iter().find(|m| m.geo == "DE").unwrap();
        assert_eq!((de.rank_base, de.rank_last, de.rank_delta), (3, 2, 1));
        assert_eq!(de.pct_change, Some(50.0));
        let fr = moves.iter().find(|m| m.geo == "FR").unwrap();
        assert_eq!(fr.rank_delta, 0);
        let it = moves.iter().find(|m| m.geo == "IT").unwrap();
        assert_eq!(it.rank_delta, -1);

        let (up, down) = rank_movers(&moves, 10);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].geo, "DE");
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].geo, "IT");
    }

    #[test]
    fn improving_from_five_to_two_is_plus_three() {
        let mut facts = Vec::new();
        for (geo, base, last) in [
            ("A", 90.0, 10.0),
            ("B", 80.0, 20.0),
            ("C", 70.0, 30.0),
            ("D", 60.0, 80.0),
            ("E", 50.0, 40.0),
        ] {
            facts.push(Fact::new(geo, "I", 2015, Some(base)));
            facts.push(Fact::new(geo, "I", 2020, Some(last)));
        }
        let moves = rank_changes(&facts, 2015, 2020);
        let d = moves.iter().find(|m| m.geo == "D").unwrap();
        assert_eq!((d.rank_base, d.rank_last, d.rank_delta), (4, 1, 3));
        let e = moves.iter().find(|m| m.geo == "E").unwrap();
        assert_eq!((e.rank_base, e.rank_last, e.rank_delta), (5, 2, 3));
    }

    #[test]
    fn movers_are_split_and_ordered() {
        let moves = vec![
            rank_move("A", 1),
            rank_move("B", -3),
            rank_move("C", 0),
            rank_move("D", 4),
            rank_move("E", -1),
            rank_move("F", 4),
        ];
        let (up, down) = rank_movers(&moves, 2);
        let up: Vec<&str> = up.iter().map(|m| m.geo.as_str()).collect();
        let down: Vec<&str> = down.iter().map(|m| m.geo.as_str()).collect();
        assert_eq!(up, vec!["D", "F"]);
        assert_eq!(down, vec!["B", "E"]);
    }

    #[test]
    fn cagr_leaders_respect_min_years() {
        let facts = reference_facts();
        let structural = compute_structural(&facts, &compute_growth(&facts));
        let (top, bottom) = cagr_leaders(&structural, 2, 10);
        assert_eq!(top[0].geo, "DE");
        assert_eq!(bottom[0].geo, "IT");
        let (top, bottom) = cagr_leaders(&structural, 3, 10);
        assert!(top.is_empty() && bottom.is_empty());
    }

    #[test]
    fn country_filter_applies_to_any_table() {
        let mut facts = reference_facts();
        facts.push(Fact::new("EU27_2020", "IND1", 2020, Some(1e9)));
        let kept = retain_geos(facts, is_country_geo);
        assert_eq!(kept.len(), 6);
    }

    #[test]
    fn selections_for_reference_fixture() {
        let cfg = Config {
            cagr_min_years: 2,
            ..Config::default()
        };
        let facts = reference_facts();
        let growth = compute_growth(&facts);
        let structural = compute_structural(&facts, &growth);
        let sel = build_selections(&cfg, &facts, &growth, &structural).unwrap();
        assert_eq!(sel.indicator, "IND1");
        assert_eq!(sel.year_top, 2020);
        assert_eq!(sel.year_yoy, 2020);
        // 2015 is not observed, so the earliest year is the base
        assert_eq!(sel.rank_base_year, 2019);
        assert_eq!(sel.top_value[0].geo, "FR");
        assert_eq!(sel.top_yoy.len(), 3);
        assert_eq!(sel.top_yoy[0].geo, "DE");
        assert_eq!(sel.movers_up[0].geo, "DE");
        assert!(sel.has_cagr);
        assert_eq!(sel.cagr_top[0].geo, "DE");
    }

    #[test]
    fn new_entrant_in_latest_year_keeps_yoy_period() {
        let facts = vec![
            Fact::new("DE", "IND1", 2019, Some(100.0)),
            Fact::new("DE", "IND1", 2020, Some(150.0)),
            Fact::new("FR", "IND1", 2019, Some(200.0)),
            Fact::new("FR", "IND1", 2020, Some(190.0)),
            Fact::new("PT", "IND1", 2021, Some(80.0)),
        ];
        let growth = compute_growth(&facts);
        let structural = compute_structural(&facts, &growth);
        let sel = build_selections(&Config::default(), &facts, &growth, &structural).unwrap();
        assert_eq!(sel.year_top, 2021);
        assert_eq!(sel.year_yoy, 2020);
        let geos: Vec<&str> = sel.top_yoy.iter().map(|r| r.geo.as_str()).collect();
        assert_eq!(geos, vec!["DE", "FR"]);
    }

    #[test]
    fn single_year_series_have_no_yoy_period() {
        let facts = vec![
            Fact::new("DE", "IND1", 2020, Some(100.0)),
            Fact::new("FR", "IND1", 2020, Some(200.0)),
        ];
        let growth = compute_growth(&facts);
        let err = build_selections(&Config::default(), &facts, &growth, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult(_)));
    }

    #[test]
    fn empty_inputs_are_empty_result_errors() {
        let cfg = Config::default();
        let err = build_selections(&cfg, &[], &[], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult(_)));

        let err = build_selections(&cfg, &reference_facts(), &[], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn coverage_counts() {
        let facts = reference_facts();
        let growth = compute_growth(&facts);
        let cov = compute_coverage(&facts, &growth, &[]);
        assert_eq!(cov.top_rows, 6);
        assert_eq!(cov.top_countries, 3);
        assert_eq!(cov.top_year_min, Some(2019));
        assert_eq!(cov.yoy_missing_pct, 50.0);
        assert!(!cov.struct_has_cagr);
    }
}
