use std::{cmp::Ordering, collections::HashMap};

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::model::Position;

const STABLE_MARKERS: &[&str] = &["USD", "DAI", "FRAX", "LUSD", "GHO"];
const MAJOR_ASSETS: &[&str] = &["ETH", "WETH", "STETH", "WSTETH", "BTC", "WBTC", "CBBTC"];
const SECONDS_PER_YEAR: f64 = 31_536_000.0;
const RAY: f64 = 1e27;

pub fn parse_tuple_string(data: String) -> Vec<String> {
    if data.is_empty() {
        return Vec::new();
    }

    let str = &data[1..];
    let splited = str.split(",(");
    let mut items: Vec<String> = Vec::new();

    for c in splited {
        if let Some(index) = c.find(')') {
            let tuple_data = &c[0..index];
            items.push(tuple_data.to_owned());
        }
    }

    items
}

pub fn parse_list(data: &str) -> Vec<String> {
    data.split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Reads a JSON value as a finite number. Numeric strings are accepted,
/// everything else (null, garbage, NaN, infinities) is absent.
pub fn finite_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

/// Serde adapter for source payload fields that should be numbers but are
/// not always. Use with `#[serde(default, deserialize_with = "lenient_f64")]`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(finite_f64))
}

/// Field adapter for payload values that may be null or of the wrong shape.
/// Either case falls back to `T::default()` instead of failing the record.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default())
}

/// Decodes list elements one at a time, dropping the ones that do not fit.
pub fn decode_each<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    let total = values.len();
    let decoded: Vec<T> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();

    if decoded.len() < total {
        tracing::debug!("Dropped {} undecodable record(s)", total - decoded.len());
    }

    decoded
}

/// [`decode_each`] as a field adapter. A missing or non-list value is empty.
pub fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(values)) => values,
        _ => vec![],
    };
    Ok(decode_each(values))
}

pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join("-")
}

pub fn is_stable_symbol(symbol: &str) -> bool {
    let symbol = symbol.to_uppercase();
    STABLE_MARKERS.iter().any(|marker| symbol.contains(marker))
}

/// Stable when every named asset is a stablecoin.
pub fn is_stable_pair(symbols: &[&str]) -> bool {
    let symbols: Vec<&&str> =
        symbols.iter().filter(|s| !s.trim().is_empty()).collect();
    !symbols.is_empty() && symbols.iter().all(|s| is_stable_symbol(s))
}

/// Rough impermanent-loss exposure on a 0-100 scale.
pub fn estimate_il_risk(symbols: &[&str]) -> f64 {
    let symbols: Vec<String> = symbols
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_uppercase())
        .collect();

    if symbols.len() <= 1 {
        return 0.0;
    }

    if symbols.iter().all(|s| is_stable_symbol(s)) {
        return 5.0;
    }

    if symbols
        .iter()
        .all(|s| is_stable_symbol(s) || MAJOR_ASSETS.contains(&s.as_str()))
    {
        return 30.0;
    }

    60.0
}

/// Weighted risk score, lower is safer. `audit_score` is 0-100 where 100
/// is fully audited.
pub fn risk_score(il_risk: f64, liquidation_risk: f64, audit_score: f64) -> f64 {
    let score =
        il_risk * 0.4 + liquidation_risk * 0.4 + (100.0 - audit_score) * 0.2;
    score.clamp(0.0, 100.0)
}

pub fn fraction_to_percent(value: Option<f64>) -> Option<f64> {
    value.map(|v| v * 100.0).filter(|v| v.is_finite())
}

/// Ray-denominated (1e27) annual rate as a percentage.
pub fn ray_to_percent(value: Option<f64>) -> Option<f64> {
    value.map(|v| v / RAY * 100.0).filter(|v| v.is_finite())
}

/// Per-second compounding of an APR percentage.
pub fn apr_to_apy(apr: Option<f64>) -> Option<f64> {
    apr.map(|apr| {
        ((1.0 + apr / 100.0 / SECONDS_PER_YEAR).powf(SECONDS_PER_YEAR) - 1.0)
            * 100.0
    })
    .filter(|v| v.is_finite())
}

/// Descending order with absent values last.
pub fn cmp_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ascending order with absent values last.
pub fn cmp_asc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Collapses duplicate identities, keeping the last occurrence in place of
/// the first.
pub fn dedup_positions(positions: Vec<Position>) -> Vec<Position> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut items: Vec<Position> = Vec::with_capacity(positions.len());

    for position in positions {
        let key = (
            position.protocol_name.to_owned(),
            position.pool_address.to_owned(),
        );
        match index.get(&key) {
            Some(i) => items[*i] = position,
            None => {
                index.insert(key, items.len());
                items.push(position);
            },
        }
    }

    items
}
