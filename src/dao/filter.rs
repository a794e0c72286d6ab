use std::{cmp::Ordering, fmt, io, str::FromStr};

use serde::Deserialize;

use crate::{
    helpers::{cmp_asc, cmp_desc, slugify},
    model::{ChainId, LP_Position, RiskLevel},
};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Apy,
    Tvl,
    Volume,
    Risk,
}

impl SortBy {
    pub fn column(&self) -> &'static str {
        match self {
            SortBy::Apy => r#"p."apy""#,
            SortBy::Tvl => r#"p."tvl_usd""#,
            SortBy::Volume => r#"p."volume_24h""#,
            SortBy::Risk => r#"p."il_risk""#,
        }
    }

    fn value(&self, position: &LP_Position) -> Option<f64> {
        match self {
            SortBy::Apy => position.apy,
            SortBy::Tvl => position.tvl_usd,
            SortBy::Volume => position.volume_24h,
            SortBy::Risk => position.il_risk,
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SortBy::Apy => write!(f, "apy"),
            SortBy::Tvl => write!(f, "tvl"),
            SortBy::Volume => write!(f, "volume"),
            SortBy::Risk => write!(f, "risk"),
        }
    }
}

impl FromStr for SortBy {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<SortBy, Self::Err> {
        match value.to_lowercase().as_str() {
            "apy" => Ok(SortBy::Apy),
            "tvl" => Ok(SortBy::Tvl),
            "volume" => Ok(SortBy::Volume),
            "risk" => Ok(SortBy::Risk),
            _ => Err(io::Error::other("Sort field not supported")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<SortOrder, Self::Err> {
        match value.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(io::Error::other("Sort order not supported")),
        }
    }
}

/// Narrowing applied to stored positions. Absent criteria match everything;
/// numeric bounds never match a position lacking the value.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionFilter {
    pub chain: Option<String>,
    pub protocol: Option<String>,
    pub min_apy: Option<f64>,
    pub max_apy: Option<f64>,
    pub min_tvl: Option<f64>,
    pub risk_levels: Vec<RiskLevel>,
    pub stable_only: bool,
    pub asset: Option<String>,
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PositionFilter {
    fn default() -> Self {
        PositionFilter {
            chain: None,
            protocol: None,
            min_apy: None,
            max_apy: None,
            min_tvl: None,
            risk_levels: vec![],
            stable_only: false,
            asset: None,
            sort_by: SortBy::default(),
            order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PositionFilter {
    pub fn limit(&self) -> i64 {
        self.limit.clamp(0, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }

    /// Chain criterion in its stored form.
    pub fn chain_key(&self) -> Option<String> {
        self.chain
            .as_deref()
            .map(|chain| ChainId::from_name(chain).to_string())
    }

    /// Substring pattern for `ILIKE ... ESCAPE '\'`. LIKE wildcards in the
    /// input match literally, the same as [`PositionFilter::matches`].
    pub fn asset_pattern(&self) -> Option<String> {
        self.asset.as_deref().map(|asset| {
            let mut pattern = String::with_capacity(asset.len() + 2);
            pattern.push('%');
            for c in asset.chars() {
                if matches!(c, '\\' | '%' | '_') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }

    pub fn matches(&self, position: &LP_Position) -> bool {
        if let Some(chain) = self.chain_key() {
            if position.chain_id != chain {
                return false;
            }
        }

        if let Some(protocol) = &self.protocol {
            let by_name =
                position.protocol_name.to_lowercase() == protocol.to_lowercase();
            if !by_name && slugify(&position.protocol_name) != slugify(protocol) {
                return false;
            }
        }

        if let Some(min) = self.min_apy {
            if !position.apy.is_some_and(|apy| apy >= min) {
                return false;
            }
        }

        if let Some(max) = self.max_apy {
            if !position.apy.is_some_and(|apy| apy <= max) {
                return false;
            }
        }

        if let Some(min) = self.min_tvl {
            if !position.tvl_usd.is_some_and(|tvl| tvl >= min) {
                return false;
            }
        }

        if !self.risk_levels.is_empty() {
            match position.risk() {
                Some(level) if self.risk_levels.contains(&level) => {},
                _ => return false,
            }
        }

        if self.stable_only && !position.is_stable {
            return false;
        }

        if let Some(asset) = &self.asset {
            let asset = asset.to_lowercase();
            let token0 = position.token0_symbol.to_lowercase().contains(&asset);
            let token1 = position
                .token1_symbol
                .as_deref()
                .is_some_and(|symbol| symbol.to_lowercase().contains(&asset));
            if !token0 && !token1 {
                return false;
            }
        }

        true
    }

    /// Requested column first, absent values last, then tvl descending and
    /// insertion order.
    pub fn compare(&self, a: &LP_Position, b: &LP_Position) -> Ordering {
        let (x, y) = (self.sort_by.value(a), self.sort_by.value(b));
        let primary = match self.order {
            SortOrder::Asc => cmp_asc(x, y),
            SortOrder::Desc => cmp_desc(x, y),
        };

        primary
            .then_with(|| cmp_desc(a.tvl_usd, b.tvl_usd))
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::helpers::fixtures::position;

    fn stored(id: i64, protocol: &str, apy: Option<f64>, tvl: Option<f64>) -> LP_Position {
        let position = position(protocol, &format!("0x{}", id), apy, tvl);
        LP_Position::from_position(id, 1, &position, Utc::now())
    }

    #[test]
    fn absent_criteria_match_everything() {
        let filter = PositionFilter::default();
        assert!(filter.matches(&stored(1, "Curve", None, None)));
        assert_eq!(filter.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn numeric_bounds_exclude_missing_values() {
        let filter = PositionFilter {
            min_apy: Some(5.0),
            ..PositionFilter::default()
        };
        assert!(filter.matches(&stored(1, "Curve", Some(5.0), None)));
        assert!(!filter.matches(&stored(2, "Curve", Some(4.9), None)));
        assert!(!filter.matches(&stored(3, "Curve", None, None)));
    }

    #[test]
    fn protocol_matches_name_or_slug() {
        let filter = PositionFilter {
            protocol: Some(String::from("aave-v3")),
            ..PositionFilter::default()
        };
        assert!(filter.matches(&stored(1, "Aave V3", None, None)));
        assert!(!filter.matches(&stored(2, "Beefy", None, None)));
    }

    #[test]
    fn chain_and_asset_criteria() {
        let filter = PositionFilter {
            chain: Some(String::from("ethereum")),
            asset: Some(String::from("eth")),
            ..PositionFilter::default()
        };
        assert!(filter.matches(&stored(1, "Curve", None, None)));

        let filter = PositionFilter {
            chain: Some(String::from("arbitrum")),
            ..PositionFilter::default()
        };
        assert!(!filter.matches(&stored(1, "Curve", None, None)));

        let filter = PositionFilter {
            asset: Some(String::from("dai")),
            ..PositionFilter::default()
        };
        assert!(!filter.matches(&stored(1, "Curve", None, None)));
    }

    #[test]
    fn asset_wildcards_match_literally() {
        let filter = PositionFilter {
            asset: Some(String::from("50%_a\\b")),
            ..PositionFilter::default()
        };
        assert_eq!(filter.asset_pattern().as_deref(), Some("%50\\%\\_a\\\\b%"));

        let filter = PositionFilter {
            asset: Some(String::from("W_TH")),
            ..PositionFilter::default()
        };
        assert!(!filter.matches(&stored(1, "Curve", None, None)));

        let mut row = stored(2, "Curve", None, None);
        row.token1_symbol = Some(String::from("W_TH"));
        assert!(filter.matches(&row));

        assert_eq!(PositionFilter::default().asset_pattern(), None);
    }

    #[test]
    fn risk_levels_and_stable_only() {
        let mut row = stored(1, "Curve", None, None);
        let filter = PositionFilter {
            risk_levels: vec![RiskLevel::Low],
            ..PositionFilter::default()
        };
        assert!(!filter.matches(&row));

        let filter = PositionFilter {
            risk_levels: vec![RiskLevel::Low, RiskLevel::Medium],
            stable_only: true,
            ..PositionFilter::default()
        };
        assert!(!filter.matches(&row));
        row.is_stable = true;
        assert!(filter.matches(&row));
    }

    #[test]
    fn ascending_sort_keeps_absent_values_last() {
        let filter = PositionFilter {
            sort_by: SortBy::Tvl,
            order: SortOrder::Asc,
            ..PositionFilter::default()
        };
        let mut rows = vec![
            stored(1, "A", None, None),
            stored(2, "A", None, Some(20.0)),
            stored(3, "A", None, Some(10.0)),
        ];
        rows.sort_by(|a, b| filter.compare(a, b));

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn sort_names_parse() {
        assert_eq!(SortBy::from_str("TVL").unwrap(), SortBy::Tvl);
        assert_eq!(SortOrder::from_str("asc").unwrap(), SortOrder::Asc);
        assert!(SortBy::from_str("fees").is_err());
    }
}
