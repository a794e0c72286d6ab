use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Map};

use crate::{
    error::Error,
    helpers::{
        estimate_il_risk, is_stable_pair, lenient, lenient_f64, lenient_list,
        non_empty, risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

const AUDIT_SCORE: f64 = 70.0;

const POOLS_QUERY: &str = r#"
query GetIndexedPools($limit: Int, $offset: Int) {
    pools(first: $limit, skip: $offset, orderBy: tvlUsd, orderDirection: desc) {
        id
        protocol
        poolAddress
        tokenA
        tokenB
        tvlUsd
        volume24h
        fees24h
        apy
        blockNumber
    }
}
"#;

/// Indexed pool. `apy` is already a percentage.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedPool {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub pool_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub token_a: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub token_b: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tvl_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fees24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub apy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub block_number: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexedPools {
    #[serde(default, deserialize_with = "lenient_list")]
    pools: Vec<IndexedPool>,
}

/// Envio HyperIndex GraphQL indexer.
pub struct Envio {
    http: Arc<HTTP>,
    url: String,
    api_key: String,
    network_id: u64,
    limit: usize,
}

impl Envio {
    pub fn new(
        http: Arc<HTTP>,
        url: String,
        api_key: String,
        network_id: u64,
        limit: usize,
    ) -> Envio {
        Envio {
            http,
            url,
            api_key,
            network_id,
            limit,
        }
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "x-network-id",
            HeaderValue::from_str(&self.network_id.to_string())?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl Source for Envio {
    type Raw = IndexedPool;

    fn label(&self) -> &'static str {
        "envio"
    }

    async fn fetch(&self) -> Result<Vec<IndexedPool>, Error> {
        let url = format!("{}/graphql", self.url);
        let variables = json!({ "limit": self.limit, "offset": 0 });
        let data: IndexedPools = self
            .http
            .post_graphql(&url, POOLS_QUERY, variables, self.headers()?)
            .await?;

        Ok(data.pools)
    }

    fn normalize(&self, raw: IndexedPool) -> Option<Position> {
        let protocol_name = non_empty(raw.protocol.as_deref())?;
        let pool_address = non_empty(raw.pool_address.as_deref())?;

        let token0_symbol = non_empty(raw.token_a.as_deref()).unwrap_or_default();
        let token1_symbol = non_empty(raw.token_b.as_deref());
        let symbols = [
            token0_symbol.as_str(),
            token1_symbol.as_deref().unwrap_or_default(),
        ];
        let il_risk = estimate_il_risk(&symbols);

        let mut extra = Map::new();
        if let Some(id) = &raw.id {
            extra.insert(String::from("indexId"), json!(id));
        }
        if let Some(block) = raw.block_number {
            extra.insert(String::from("blockNumber"), json!(block));
        }

        Some(Position {
            protocol_name,
            pool_address,
            pool_name: match &token1_symbol {
                Some(token1) => format!("{}/{}", token0_symbol, token1),
                None => token0_symbol.to_owned(),
            },
            chain_id: ChainId::Numeric(self.network_id),
            is_stable: is_stable_pair(&symbols),
            token0_symbol: token0_symbol.to_owned(),
            token0_address: None,
            token1_symbol: token1_symbol.to_owned(),
            token1_address: None,
            apy: raw.apy,
            apr: None,
            tvl_usd: raw.tvl_usd,
            volume_24h: raw.volume24h,
            fees_24h: raw.fees24h,
            il_risk: Some(il_risk),
            risk_level: RiskLevel::from_score(risk_score(il_risk, 0.0, AUDIT_SCORE)),
            farm_rewards: vec![],
            extra,
        })
    }
}
