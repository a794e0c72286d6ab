use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    error::Error,
    helpers::{
        cmp_desc, decode_each, estimate_il_risk, fraction_to_percent,
        is_stable_pair, lenient, lenient_f64, non_empty, risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

const PROTOCOL: &str = "Yearn";
const AUDIT_SCORE: f64 = 95.0;

#[derive(Debug, Default, Deserialize)]
pub struct YearnToken {
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearnTvl {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tvl: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearnApy {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net_apy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gross_apr: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct YearnVault {
    #[serde(default, deserialize_with = "lenient")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub token: YearnToken,
    #[serde(default, deserialize_with = "lenient")]
    pub tvl: YearnTvl,
    #[serde(default, deserialize_with = "lenient")]
    pub apy: YearnApy,
}

#[derive(Debug)]
pub struct YearnRecord {
    pub chain_id: u64,
    pub vault: YearnVault,
}

/// Yearn vaults, one request per configured chain. Rates are fractions.
pub struct Yearn {
    http: Arc<HTTP>,
    base_url: String,
    chains: Vec<u64>,
    limit: usize,
}

impl Yearn {
    pub fn new(
        http: Arc<HTTP>,
        base_url: String,
        chains: Vec<u64>,
        limit: usize,
    ) -> Yearn {
        Yearn {
            http,
            base_url,
            chains,
            limit,
        }
    }

    async fn fetch_chain(&self, chain_id: u64) -> Result<Vec<YearnRecord>, Error> {
        let url = format!("{}/v1/chains/{}/vaults/all", self.base_url, chain_id);
        let vaults = self.http.get_json::<Vec<Value>>(&url).await?;

        Ok(decode_each::<YearnVault>(vaults)
            .into_iter()
            .map(|vault| YearnRecord { chain_id, vault })
            .collect())
    }
}

#[async_trait]
impl Source for Yearn {
    type Raw = YearnRecord;

    fn label(&self) -> &'static str {
        "yearn"
    }

    async fn fetch(&self) -> Result<Vec<YearnRecord>, Error> {
        let chains = self.chains.iter().map(|chain_id| self.fetch_chain(*chain_id));
        let mut records: Vec<YearnRecord> =
            try_join_all(chains).await?.into_iter().flatten().collect();

        records.sort_by(|a, b| cmp_desc(a.vault.tvl.tvl, b.vault.tvl.tvl));
        records.truncate(self.limit);

        Ok(records)
    }

    fn normalize(&self, raw: YearnRecord) -> Option<Position> {
        let YearnRecord { chain_id, vault } = raw;
        let pool_address = non_empty(vault.address.as_deref())?;

        let token0_symbol = non_empty(vault.token.symbol.as_deref())
            .or(non_empty(vault.symbol.as_deref()))
            .unwrap_or_default();
        let il_risk = estimate_il_risk(&[token0_symbol.as_str()]);

        let mut extra = Map::new();
        if let Some(kind) = &vault.kind {
            extra.insert(String::from("type"), json!(kind));
        }
        if let Some(version) = &vault.version {
            extra.insert(String::from("version"), json!(version));
        }

        Some(Position {
            protocol_name: String::from(PROTOCOL),
            pool_address,
            pool_name: vault.name.unwrap_or_else(|| token0_symbol.clone()),
            chain_id: ChainId::Numeric(chain_id),
            is_stable: is_stable_pair(&[token0_symbol.as_str()]),
            token0_symbol,
            token0_address: non_empty(vault.token.address.as_deref()),
            token1_symbol: None,
            token1_address: None,
            apy: fraction_to_percent(vault.apy.net_apy),
            apr: fraction_to_percent(vault.apy.gross_apr),
            tvl_usd: vault.tvl.tvl,
            volume_24h: None,
            fees_24h: None,
            il_risk: Some(il_risk),
            risk_level: RiskLevel::from_score(risk_score(il_risk, 0.0, AUDIT_SCORE)),
            farm_rewards: vec![],
            extra,
        })
    }
}
