use std::{fmt, io, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chain a position lives on. Known chain names are folded into their
/// numeric id by [`ChainId::from_name`]; anything else stays symbolic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainId {
    Numeric(u64),
    Named(String),
}

const KNOWN_CHAINS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("mainnet", 1),
    ("optimism", 10),
    ("bsc", 56),
    ("polygon", 137),
    ("fantom", 250),
    ("zksync", 324),
    ("mantle", 5000),
    ("base", 8453),
    ("arbitrum", 42161),
    ("arbitrum-one", 42161),
    ("avalanche", 43114),
    ("avax", 43114),
    ("linea", 59144),
    ("sonic", 146),
];

impl ChainId {
    pub fn from_name(name: &str) -> ChainId {
        let name = name.trim().to_lowercase();
        if let Ok(id) = name.parse::<u64>() {
            return ChainId::Numeric(id);
        }

        KNOWN_CHAINS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, id)| ChainId::Numeric(*id))
            .unwrap_or(ChainId::Named(name))
    }

    pub fn numeric(&self) -> Option<u64> {
        match self {
            ChainId::Numeric(id) => Some(*id),
            ChainId::Named(_) => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainId::Numeric(id) => write!(f, "{}", id),
            ChainId::Named(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Maps a 0-100 risk score (lower is safer) onto a level.
    pub fn from_score(score: f64) -> RiskLevel {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

impl From<RiskLevel> for String {
    fn from(value: RiskLevel) -> Self {
        value.to_string()
    }
}

impl FromStr for RiskLevel {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<RiskLevel, Self::Err> {
        match value.to_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(io::Error::other("Risk level not supported")),
        }
    }
}

/// Canonical position produced by every source adapter.
///
/// Identity is `(protocol_name, pool_address)`. A position is rebuilt from
/// scratch every cycle; rates are percentages and absent when the source
/// did not provide a finite number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub protocol_name: String,
    pub pool_address: String,
    pub pool_name: String,
    pub chain_id: ChainId,
    pub token0_symbol: String,
    pub token0_address: Option<String>,
    pub token1_symbol: Option<String>,
    pub token1_address: Option<String>,
    pub apy: Option<f64>,
    pub apr: Option<f64>,
    pub tvl_usd: Option<f64>,
    pub volume_24h: Option<f64>,
    pub fees_24h: Option<f64>,
    pub il_risk: Option<f64>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub farm_rewards: Vec<Value>,
    pub is_stable: bool,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_names_fold_into_ids() {
        assert_eq!(ChainId::from_name("Ethereum"), ChainId::Numeric(1));
        assert_eq!(ChainId::from_name("arbitrum"), ChainId::Numeric(42161));
        assert_eq!(ChainId::from_name("8453"), ChainId::Numeric(8453));
        assert_eq!(
            ChainId::from_name("Hyperliquid"),
            ChainId::Named(String::from("hyperliquid"))
        );
    }

    #[test]
    fn chain_id_serializes_untagged() {
        let numeric = serde_json::to_string(&ChainId::Numeric(10)).unwrap();
        let named =
            serde_json::to_string(&ChainId::Named(String::from("sui")))
                .unwrap();

        assert_eq!(numeric, "10");
        assert_eq!(named, "\"sui\"");
    }

    #[test]
    fn risk_level_from_score() {
        assert_eq!(RiskLevel::from_score(10.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_str("medium").unwrap(), RiskLevel::Medium);
        assert!(RiskLevel::from_str("EXTREME").is_err());
    }
}
