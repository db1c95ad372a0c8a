// Parsing, numeric guards and formatting helpers.
//
// Every "dirty" value conversion lives here so the engines can work with
// `Option<f64>` and never depend on NaN/inf semantics for control flow.
use num_format::{Locale, ToFormattedString};

/// Parse a textual cell into a finite `f64`.
///
/// - Trims whitespace and rejects empty cells.
/// - Strips thousands separators like `","` before parsing.
/// - Accepts scientific notation (`1e-6`, `2E+3`), which the CSV writer emits
///   for very small or large values.
/// - Returns `None` for anything that cannot be parsed or is not finite
///   (`NaN`, `inf`, status flags).
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().and_then(finite)
}

/// Years exported by dataframe tools sometimes arrive as `2019.0`; accept
/// those as long as they are integral.
pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok().and_then(finite)?;
    if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

pub fn parse_usize_safe(s: Option<&str>) -> Option<usize> {
    parse_i32_safe(s).and_then(|v| usize::try_from(v).ok())
}

/// Trimmed, non-empty text or `None`.
pub fn clean_text(s: Option<String>) -> Option<String> {
    let s = s?.trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn finite(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

/// `(numerator / denominator - 1) * 100`, or `None` when the denominator is
/// zero or either side is missing/non-finite.
pub fn growth_pct(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let num = numerator.and_then(finite)?;
    let den = denominator.and_then(finite)?;
    if den == 0.0 {
        return None;
    }
    finite((num / den - 1.0) * 100.0)
}

pub fn mean(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    finite(sum / v.len() as f64)
}

/// Sample standard deviation (n - 1 denominator); undefined below two values.
pub fn std_sample(v: &[f64]) -> Option<f64> {
    if v.len() < 2 {
        return None;
    }
    let m = mean(v)?;
    let ss: f64 = v.iter().map(|x| (x - m) * (x - m)).sum();
    finite((ss / (v.len() as f64 - 1.0)).sqrt())
}

/// Aggregates like `EU27_2020`, `EA19` or `EU` are not countries.
pub fn is_country_geo(geo: &str) -> bool {
    let g = geo.trim().to_uppercase();
    if g.contains('_') {
        return false;
    }
    if g.starts_with("EU") || g.starts_with("EA") {
        return false;
    }
    matches!(g.chars().count(), 2 | 3)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale thousands separators, e.g. `1,234,567.89`.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Compact magnitude for report tables: `1.23M`, `4.50K`, `—` for null.
pub fn human_number(x: Option<f64>, decimals: usize) -> String {
    let Some(x) = x.and_then(finite) else {
        return "—".to_string();
    };
    let abs = x.abs();
    if abs >= 1e12 {
        format!("{:.*}T", decimals, x / 1e12)
    } else if abs >= 1e9 {
        format!("{:.*}B", decimals, x / 1e9)
    } else if abs >= 1e6 {
        format!("{:.*}M", decimals, x / 1e6)
    } else if abs >= 1e3 {
        format!("{:.*}K", decimals, x / 1e3)
    } else if abs >= 100.0 {
        format_number(x, 0)
    } else {
        format_number(x, decimals)
    }
}

pub fn pct1(x: Option<f64>) -> String {
    match x.and_then(finite) {
        Some(v) => format!("{:.1}%", v),
        None => "—".to_string(),
    }
}

pub fn pct2(x: Option<f64>) -> String {
    match x.and_then(finite) {
        Some(v) => format!("{:.2}%", v),
        None => "—".to_string(),
    }
}
