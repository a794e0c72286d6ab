use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Map};

use crate::{
    error::Error,
    helpers::{
        cmp_desc, fraction_to_percent, is_stable_pair, lenient, lenient_f64,
        lenient_list, non_empty, risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

const PROTOCOL: &str = "Pendle";
const AUDIT_SCORE: f64 = 90.0;
const IL_RISK: f64 = 10.0;

#[derive(Debug, Default, Deserialize)]
pub struct PendleToken {
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendleLiquidity {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usd: Option<f64>,
}

/// Market entry of the per-chain markets listing. Rates are fractions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendleMarket {
    #[serde(default, deserialize_with = "lenient")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub underlying: PendleToken,
    #[serde(default, deserialize_with = "lenient")]
    pub pt: PendleToken,
    #[serde(default, deserialize_with = "lenient")]
    pub yt: PendleToken,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub maturity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub liquidity: PendleLiquidity,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fees24h: Option<f64>,
    #[serde(default, rename = "impliedAPY", deserialize_with = "lenient_f64")]
    pub implied_apy: Option<f64>,
    #[serde(default, rename = "tradingAPY", deserialize_with = "lenient_f64")]
    pub trading_apy: Option<f64>,
    #[serde(default, rename = "fixedAPY", deserialize_with = "lenient_f64")]
    pub fixed_apy: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PendleMarkets {
    #[serde(default, deserialize_with = "lenient_list")]
    results: Vec<PendleMarket>,
}

#[derive(Debug)]
pub struct PendleRecord {
    pub chain_id: u64,
    pub market: PendleMarket,
}

/// Pendle yield markets, one listing per configured chain.
pub struct Pendle {
    http: Arc<HTTP>,
    base_url: String,
    chains: Vec<u64>,
    limit: usize,
}

impl Pendle {
    pub fn new(
        http: Arc<HTTP>,
        base_url: String,
        chains: Vec<u64>,
        limit: usize,
    ) -> Pendle {
        Pendle {
            http,
            base_url,
            chains,
            limit,
        }
    }

    async fn fetch_chain(&self, chain_id: u64) -> Result<Vec<PendleRecord>, Error> {
        let url = format!("{}/core/v1/{}/markets", self.base_url, chain_id);
        let markets = self.http.get_json::<PendleMarkets>(&url).await?;

        Ok(markets
            .results
            .into_iter()
            .map(|market| PendleRecord { chain_id, market })
            .collect())
    }
}

#[async_trait]
impl Source for Pendle {
    type Raw = PendleRecord;

    fn label(&self) -> &'static str {
        "pendle"
    }

    async fn fetch(&self) -> Result<Vec<PendleRecord>, Error> {
        let chains = self.chains.iter().map(|chain_id| self.fetch_chain(*chain_id));
        let mut records: Vec<PendleRecord> =
            try_join_all(chains).await?.into_iter().flatten().collect();

        records.sort_by(|a, b| {
            cmp_desc(a.market.liquidity.usd, b.market.liquidity.usd)
        });
        records.truncate(self.limit);

        Ok(records)
    }

    fn normalize(&self, raw: PendleRecord) -> Option<Position> {
        let PendleRecord { chain_id, market } = raw;
        let pool_address = non_empty(market.address.as_deref())?;
        let underlying = non_empty(market.underlying.symbol.as_deref())
            .unwrap_or_else(|| String::from("UNKNOWN"));

        let implied_apy = fraction_to_percent(market.implied_apy);
        let trading_apy = fraction_to_percent(market.trading_apy);

        // Total yield is the implied fixed rate plus swap fees.
        let apy = match (implied_apy, trading_apy) {
            (Some(implied), Some(trading)) => Some(implied + trading),
            (implied, None) => implied,
            (None, trading) => trading,
        };

        let mut extra = Map::new();
        if let Some(maturity) = market.maturity {
            extra.insert(String::from("maturity"), json!(maturity as i64));
        }
        if let Some(pt) = non_empty(market.pt.address.as_deref()) {
            extra.insert(String::from("ptAddress"), json!(pt));
        }
        if let Some(yt) = non_empty(market.yt.address.as_deref()) {
            extra.insert(String::from("ytAddress"), json!(yt));
        }
        if let Some(fixed) = fraction_to_percent(market.fixed_apy) {
            extra.insert(String::from("fixedApy"), json!(fixed));
        }

        Some(Position {
            protocol_name: String::from(PROTOCOL),
            pool_address,
            pool_name: format!("Pendle {} Pool", underlying),
            chain_id: ChainId::Numeric(chain_id),
            is_stable: is_stable_pair(&[underlying.as_str()]),
            token0_symbol: underlying,
            token0_address: non_empty(market.underlying.address.as_deref()),
            token1_symbol: non_empty(market.pt.symbol.as_deref()),
            token1_address: non_empty(market.pt.address.as_deref()),
            apy,
            apr: implied_apy,
            tvl_usd: market.liquidity.usd,
            volume_24h: market.volume24h,
            fees_24h: market.fees24h,
            il_risk: Some(IL_RISK),
            risk_level: RiskLevel::from_score(risk_score(IL_RISK, 0.0, AUDIT_SCORE)),
            farm_rewards: vec![json!({ "token": "PENDLE" })],
            extra,
        })
    }
}
