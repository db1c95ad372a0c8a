// Collapse duplicate keys before any derived metric is computed.

use std::collections::BTreeMap;

use crate::types::{Fact, GrowthRecord, StructuralMetric};
use crate::util::growth_pct;

type Key = (String, String, i32);

/// Null-aware addition: a missing value contributes nothing, and a group
/// with no values at all stays null instead of turning into zero.
fn add_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// One fact per (geo, indicator, year) holding the sum of the group's values.
///
/// Output is ordered by key; running it on its own output changes nothing.
pub fn dedupe_facts(facts: &[Fact]) -> Vec<Fact> {
    let mut groups: BTreeMap<Key, Option<f64>> = BTreeMap::new();
    for f in facts {
        if f.geo.trim().is_empty() || f.indicator.trim().is_empty() {
            continue;
        }
        let key = (f.geo.clone(), f.indicator.clone(), f.year);
        let slot = groups.entry(key).or_insert(None);
        *slot = add_opt(*slot, f.value);
    }
    groups
        .into_iter()
        .map(|((geo, indicator, year), value)| Fact::new(geo, indicator, year, value))
        .collect()
}

/// Re-aggregate growth rows that share a key.
///
/// `value` and `value_prev` are summed and `yoy_pct` is recomputed from the
/// sums. Per-row percentages are never averaged.
pub fn regroup_growth(rows: &[GrowthRecord]) -> Vec<GrowthRecord> {
    let mut groups: BTreeMap<Key, (f64, Option<f64>)> = BTreeMap::new();
    for r in rows {
        if r.geo.trim().is_empty() || r.indicator.trim().is_empty() {
            continue;
        }
        let key = (r.geo.clone(), r.indicator.clone(), r.year);
        let slot = groups.entry(key).or_insert((0.0, None));
        slot.0 += r.value;
        slot.1 = add_opt(slot.1, r.value_prev);
    }
    groups
        .into_iter()
        .map(|((geo, indicator, year), (value, value_prev))| GrowthRecord {
            geo,
            indicator,
            year,
            value,
            value_prev,
            yoy_pct: growth_pct(Some(value), value_prev),
        })
        .collect()
}

/// Keep one structural row per (geo, indicator): most distinct years first,
/// then the latest `year_last`. The sort is stable, so among full ties the
/// row seen first wins.
pub fn dedupe_structural(mut rows: Vec<StructuralMetric>) -> Vec<StructuralMetric> {
    rows.sort_by(|a, b| {
        a.geo
            .cmp(&b.geo)
            .then_with(|| a.indicator.cmp(&b.indicator))
            .then_with(|| b.n_years.cmp(&a.n_years))
            .then_with(|| b.year_last.cmp(&a.year_last))
    });
    rows.dedup_by(|later, kept| later.geo == kept.geo && later.indicator == kept.indicator);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn metric(geo: &str, n_years: usize, year_last: i32, value_last: f64) -> StructuralMetric {
        StructuralMetric {
            geo: geo.to_string(),
            indicator: "V1".to_string(),
            year_min: 2010,
            year_max: year_last,
            n_years,
            year_first: 2010,
            year_last,
            value_first: 1.0,
            value_last,
            abs_change: value_last - 1.0,
            pct_change: None,
            cagr_pct: None,
            yoy_mean: None,
            yoy_volatility: None,
            yoy_n: 0,
            rank_first_year: None,
            rank_last_year: None,
            rank_delta: None,
        }
    }

    #[test]
    fn duplicates_are_summed() {
        let facts = vec![
            Fact::new("DE", "V1", 2020, Some(10.0)),
            Fact::new("DE", "V1", 2020, Some(5.0)),
            Fact::new("DE", "V1", 2019, None),
            Fact::new("DE", "V1", 2020, None),
            Fact::new("", "V1", 2020, Some(99.0)),
        ];
        let out = dedupe_facts(&facts);
        assert_eq!(
            out,
            vec![
                Fact::new("DE", "V1", 2019, None),
                Fact::new("DE", "V1", 2020, Some(15.0)),
            ]
        );
    }

    #[test]
    fn growth_regroup_recomputes_pct_from_sums() {
        let rows = vec![
            GrowthRecord {
                geo: "DE".into(),
                indicator: "V1".into(),
                year: 2020,
                value: 110.0,
                value_prev: Some(100.0),
                yoy_pct: Some(10.0),
            },
            GrowthRecord {
                geo: "DE".into(),
                indicator: "V1".into(),
                year: 2020,
                value: 20.0,
                value_prev: Some(10.0),
                yoy_pct: Some(100.0),
            },
        ];
        let out = regroup_growth(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 130.0);
        assert_eq!(out[0].value_prev, Some(110.0));
        // (130 / 110 - 1) * 100, not the 55% average of the inputs
        let pct = out[0].yoy_pct.unwrap();
        assert!((pct - 18.181818).abs() < 1e-4);
    }

    #[test]
    fn growth_regroup_with_zero_base_is_null() {
        let rows = vec![GrowthRecord {
            geo: "DE".into(),
            indicator: "V1".into(),
            year: 2020,
            value: 5.0,
            value_prev: Some(0.0),
            yoy_pct: None,
        }];
        assert_eq!(regroup_growth(&rows)[0].yoy_pct, None);
    }

    #[test]
    fn structural_dedup_prefers_more_years_then_later_last_year() {
        let rows = vec![
            metric("NL", 3, 2020, 1.0),
            metric("NL", 5, 2019, 2.0),
            metric("NL", 5, 2021, 3.0),
            metric("NL", 5, 2021, 4.0),
            metric("DE", 1, 2020, 5.0),
        ];
        let out = dedupe_structural(rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].geo, "DE");
        assert_eq!(out[1].geo, "NL");
        assert_eq!(out[1].value_last, 3.0);
    }

    fn arb_fact() -> impl Strategy<Value = Fact> {
        (
            prop::sample::select(vec!["DE", "FR", "IT"]),
            prop::sample::select(vec!["V1", "V2"]),
            2018i32..2022,
            prop::option::of(-1000i32..1000),
        )
            .prop_map(|(g, i, y, v)| Fact::new(g, i, y, v.map(f64::from)))
    }

    proptest! {
        #[test]
        fn dedup_keys_are_unique_and_sums_hold(facts in prop::collection::vec(arb_fact(), 0..60)) {
            let out = dedupe_facts(&facts);
            let mut seen = std::collections::HashSet::new();
            for f in &out {
                prop_assert!(seen.insert((f.geo.clone(), f.indicator.clone(), f.year)));
            }
            let mut expected: HashMap<Key, Option<f64>> = HashMap::new();
            for f in &facts {
                let slot = expected.entry((f.geo.clone(), f.indicator.clone(), f.year)).or_insert(None);
                *slot = add_opt(*slot, f.value);
            }
            prop_assert_eq!(out.len(), expected.len());
            for f in &out {
                let want = expected[&(f.geo.clone(), f.indicator.clone(), f.year)];
                prop_assert_eq!(f.value, want);
            }
        }

        #[test]
        fn dedup_is_idempotent(facts in prop::collection::vec(arb_fact(), 0..60)) {
            let once = dedupe_facts(&facts);
            let twice = dedupe_facts(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
