//! Database entity structs.

use std::{fmt, io, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};

use super::{Position, RiskLevel};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Protocol {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub chain_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written when a protocol row is created.
#[derive(Debug, Clone)]
pub struct New_Protocol {
    pub name: String,
    pub slug: String,
    pub chain_id: i64,
}

/// Persisted position joined with its protocol name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LP_Position {
    pub id: i64,
    pub protocol_id: i32,
    pub protocol_name: String,
    pub pool_address: String,
    pub pool_name: String,
    pub chain_id: String,
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
    pub risk_level: String,
    pub farm_rewards: Json<Vec<Value>>,
    pub is_stable: bool,
    pub extra: Json<Map<String, Value>>,
    pub last_fetched: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LP_Position {
    pub fn from_position(
        id: i64,
        protocol_id: i32,
        position: &Position,
        fetched_at: DateTime<Utc>,
    ) -> LP_Position {
        LP_Position {
            id,
            protocol_id,
            protocol_name: position.protocol_name.to_owned(),
            pool_address: position.pool_address.to_owned(),
            pool_name: position.pool_name.to_owned(),
            chain_id: position.chain_id.to_string(),
            token0_symbol: position.token0_symbol.to_owned(),
            token0_address: position.token0_address.to_owned(),
            token1_symbol: position.token1_symbol.to_owned(),
            token1_address: position.token1_address.to_owned(),
            apy: position.apy,
            apr: position.apr,
            tvl_usd: position.tvl_usd,
            volume_24h: position.volume_24h,
            fees_24h: position.fees_24h,
            il_risk: position.il_risk,
            risk_level: position.risk_level.to_string(),
            farm_rewards: Json(position.farm_rewards.to_owned()),
            is_stable: position.is_stable,
            extra: Json(position.extra.to_owned()),
            last_fetched: fetched_at,
            created_at: fetched_at,
        }
    }

    /// Overwrites the mutable attributes with a fresh observation.
    /// Identity, names and token descriptors keep their first-seen values.
    pub fn refresh(&mut self, position: &Position, fetched_at: DateTime<Utc>) {
        self.apy = position.apy;
        self.apr = position.apr;
        self.tvl_usd = position.tvl_usd;
        self.volume_24h = position.volume_24h;
        self.fees_24h = position.fees_24h;
        self.il_risk = position.il_risk;
        self.risk_level = position.risk_level.to_string();
        self.farm_rewards = Json(position.farm_rewards.to_owned());
        self.is_stable = position.is_stable;
        self.last_fetched = fetched_at;
    }

    pub fn risk(&self) -> Option<RiskLevel> {
        RiskLevel::from_str(&self.risk_level).ok()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Action_History {
    pub action_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type, Debug)]
pub enum Actions {
    AggregationAction,
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Actions::AggregationAction => write!(f, "aggregation"),
        }
    }
}

impl From<Actions> for String {
    fn from(value: Actions) -> Self {
        value.to_string()
    }
}

impl FromStr for Actions {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<Actions, Self::Err> {
        match value {
            "aggregation" => Ok(Actions::AggregationAction),
            _ => Err(io::Error::other("Action Type not supported")),
        }
    }
}
