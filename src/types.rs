use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One row of the input fact table as it comes off disk. Every field stays
/// textual here so parse failures can be counted instead of aborting the read.
#[derive(Debug, Deserialize)]
pub struct RawFactRow {
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default, alias = "indic_sbs")]
    pub indicator: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_num: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawGrowthRow {
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default, alias = "indic_sbs")]
    pub indicator: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_prev: Option<String>,
    #[serde(default)]
    pub yoy_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawStructuralRow {
    #[serde(default)]
    pub geo: Option<String>,
    #[serde(default, alias = "indic_sbs")]
    pub indicator: Option<String>,
    #[serde(default)]
    pub year_min: Option<String>,
    #[serde(default)]
    pub year_max: Option<String>,
    #[serde(default)]
    pub n_years: Option<String>,
    #[serde(default)]
    pub year_first: Option<String>,
    #[serde(default)]
    pub year_last: Option<String>,
    #[serde(default)]
    pub value_first: Option<String>,
    #[serde(default)]
    pub value_last: Option<String>,
    #[serde(default)]
    pub abs_change: Option<String>,
    #[serde(default)]
    pub pct_change: Option<String>,
    #[serde(default)]
    pub cagr_pct: Option<String>,
    #[serde(default)]
    pub cagr: Option<String>,
    #[serde(default)]
    pub yoy_mean: Option<String>,
    #[serde(default)]
    pub yoy_volatility: Option<String>,
    #[serde(default)]
    pub yoy_n: Option<String>,
    #[serde(default)]
    pub rank_first_year: Option<String>,
    #[serde(default)]
    pub rank_last_year: Option<String>,
    #[serde(default)]
    pub rank_delta: Option<String>,
}

/// A single (geo, indicator, year) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub geo: String,
    pub indicator: String,
    pub year: i32,
    pub value: Option<f64>,
}

impl Fact {
    pub fn new(
        geo: impl Into<String>,
        indicator: impl Into<String>,
        year: i32,
        value: Option<f64>,
    ) -> Self {
        Fact {
            geo: geo.into(),
            indicator: indicator.into(),
            year,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthRecord {
    pub geo: String,
    pub indicator: String,
    pub year: i32,
    pub value: f64,
    pub value_prev: Option<f64>,
    pub yoy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralMetric {
    pub geo: String,
    pub indicator: String,
    pub year_min: i32,
    pub year_max: i32,
    pub n_years: usize,
    pub year_first: i32,
    pub year_last: i32,
    pub value_first: f64,
    pub value_last: f64,
    pub abs_change: f64,
    pub pct_change: Option<f64>,
    pub cagr_pct: Option<f64>,
    pub yoy_mean: Option<f64>,
    pub yoy_volatility: Option<f64>,
    pub yoy_n: usize,
    pub rank_first_year: Option<u32>,
    pub rank_last_year: Option<u32>,
    pub rank_delta: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRow {
    pub geo: String,
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YoyRow {
    pub geo: String,
    pub year: i32,
    pub value: f64,
    pub value_prev: f64,
    pub yoy_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankMove {
    pub geo: String,
    pub rank_base: u32,
    pub rank_last: u32,
    /// Positive means the entity moved up (its rank number got smaller).
    pub rank_delta: i64,
    pub value_base: f64,
    pub value_last: f64,
    pub pct_change: Option<f64>,
}

/// All bounded views the report is built from, for one indicator.
#[derive(Debug, Clone)]
pub struct Selections {
    pub indicator: String,
    pub year_top: i32,
    pub year_yoy: i32,
    pub rank_base_year: i32,
    pub top_value: Vec<ValueRow>,
    pub top_yoy: Vec<YoyRow>,
    pub movers_up: Vec<RankMove>,
    pub movers_down: Vec<RankMove>,
    pub has_cagr: bool,
    pub cagr_top: Vec<StructuralMetric>,
    pub cagr_bottom: Vec<StructuralMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Coverage {
    pub top_rows: usize,
    pub top_countries: usize,
    pub top_indicators: usize,
    pub top_year_min: Option<i32>,
    pub top_year_max: Option<i32>,
    pub top_missing_value_pct: f64,
    pub yoy_rows: usize,
    pub yoy_countries: usize,
    pub yoy_indicators: usize,
    pub yoy_year_min: Option<i32>,
    pub yoy_year_max: Option<i32>,
    pub yoy_missing_pct: f64,
    pub struct_rows: usize,
    pub struct_has_cagr: bool,
}

#[derive(Debug, Tabled, Clone)]
pub struct ValueDisplayRow {
    #[tabled(rename = "Geo")]
    pub geo: String,
    #[tabled(rename = "Year")]
    pub year: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct YoyDisplayRow {
    #[tabled(rename = "Geo")]
    pub geo: String,
    #[tabled(rename = "Year")]
    pub year: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Prev")]
    pub prev: String,
    #[tabled(rename = "Δ abs")]
    pub delta_abs: String,
    #[tabled(rename = "YoY")]
    pub yoy: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct RankDisplayRow {
    #[tabled(rename = "Geo")]
    pub geo: String,
    #[tabled(rename = "Rank (base)")]
    pub rank_base: u32,
    #[tabled(rename = "Rank (last)")]
    pub rank_last: u32,
    #[tabled(rename = "Δ rank")]
    pub rank_delta: i64,
    #[tabled(rename = "Value (base)")]
    pub value_base: String,
    #[tabled(rename = "Value (last)")]
    pub value_last: String,
    #[tabled(rename = "Δ%")]
    pub pct_change: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct CagrDisplayRow {
    #[tabled(rename = "Geo")]
    pub geo: String,
    #[tabled(rename = "Years")]
    pub years: String,
    #[tabled(rename = "N years")]
    pub n_years: usize,
    #[tabled(rename = "CAGR")]
    pub cagr: String,
    #[tabled(rename = "Δ%")]
    pub pct_change: String,
    #[tabled(rename = "Δ abs")]
    pub abs_change: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct CoverageDisplayRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
    #[tabled(rename = "Countries")]
    pub countries: String,
    #[tabled(rename = "Indicators")]
    pub indicators: String,
    #[tabled(rename = "Years")]
    pub years: String,
    #[tabled(rename = "Missing")]
    pub missing: String,
}
