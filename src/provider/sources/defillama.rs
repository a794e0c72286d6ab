use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    error::Error,
    helpers::{
        cmp_desc, estimate_il_risk, is_stable_pair, lenient, lenient_f64,
        lenient_list, non_empty, risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

/// Aggregated feeds carry no audit information.
const AUDIT_SCORE: f64 = 70.0;

/// One pool of the yields feed. Rates are already percentages.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlamaPool {
    #[serde(default, deserialize_with = "lenient")]
    pub pool: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub chain: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub project: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tvl_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub apy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub apy_base: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub apy_reward: Option<f64>,
    #[serde(default, rename = "volumeUsd1d", deserialize_with = "lenient_f64")]
    pub volume_usd_1d: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub stablecoin: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub il_risk: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub exposure: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub pool_meta: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reward_tokens: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub underlying_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub predictions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LlamaPools {
    #[serde(default, deserialize_with = "lenient_list")]
    data: Vec<LlamaPool>,
}

/// DefiLlama yields feed covering many protocols in one call.
pub struct DefiLlama {
    http: Arc<HTTP>,
    base_url: String,
    limit: usize,
}

impl DefiLlama {
    pub fn new(http: Arc<HTTP>, base_url: String, limit: usize) -> DefiLlama {
        DefiLlama {
            http,
            base_url,
            limit,
        }
    }
}

#[async_trait]
impl Source for DefiLlama {
    type Raw = LlamaPool;

    fn label(&self) -> &'static str {
        "defillama"
    }

    async fn fetch(&self) -> Result<Vec<LlamaPool>, Error> {
        let url = format!("{}/pools", self.base_url);
        let mut pools = self.http.get_json::<LlamaPools>(&url).await?.data;

        pools.sort_by(|a, b| cmp_desc(a.tvl_usd, b.tvl_usd));
        pools.truncate(self.limit);

        Ok(pools)
    }

    fn normalize(&self, raw: LlamaPool) -> Option<Position> {
        let protocol_name = non_empty(raw.project.as_deref())?;
        let pool_address = non_empty(raw.pool.as_deref())?;

        let symbol = raw.symbol.unwrap_or_default();
        let symbols: Vec<&str> = symbol
            .split('-')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let underlying = raw.underlying_tokens.unwrap_or_default();

        let il_risk = match raw.il_risk.as_deref() {
            Some("no") => 0.0,
            _ => estimate_il_risk(&symbols),
        };

        let farm_rewards = raw
            .reward_tokens
            .unwrap_or_default()
            .into_iter()
            .map(|token| json!({ "token": token, "apy": raw.apy_reward }))
            .collect();

        let mut extra = Map::new();
        if let Some(base) = raw.apy_base {
            extra.insert(String::from("apyBase"), json!(base));
        }
        if let Some(exposure) = &raw.exposure {
            extra.insert(String::from("exposure"), json!(exposure));
        }
        if let Some(meta) = &raw.pool_meta {
            extra.insert(String::from("poolMeta"), json!(meta));
        }
        if let Some(predictions) = raw.predictions {
            extra.insert(String::from("predictions"), predictions);
        }

        Some(Position {
            protocol_name,
            pool_address,
            pool_name: symbol.clone(),
            chain_id: ChainId::from_name(raw.chain.as_deref().unwrap_or_default()),
            token0_symbol: symbols.first().map(|s| s.to_string()).unwrap_or_default(),
            token0_address: underlying.first().cloned(),
            token1_symbol: symbols.get(1).map(|s| s.to_string()),
            token1_address: underlying.get(1).cloned(),
            apy: raw.apy,
            apr: raw.apy_base,
            tvl_usd: raw.tvl_usd,
            volume_24h: raw.volume_usd_1d,
            fees_24h: None,
            il_risk: Some(il_risk),
            risk_level: RiskLevel::from_score(risk_score(il_risk, 0.0, AUDIT_SCORE)),
            farm_rewards,
            is_stable: raw
                .stablecoin
                .unwrap_or_else(|| is_stable_pair(&symbols)),
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::provider::sources::Adapter;

    #[tokio::test]
    async fn pools_keep_the_largest_by_tvl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": [
                    {
                        "pool": "small", "chain": "Base", "project": "aerodrome-v1",
                        "symbol": "USDC-AERO", "tvlUsd": 1000, "apy": 40
                    },
                    {
                        "pool": "747c1d2a", "chain": "Ethereum", "project": "lido",
                        "symbol": "STETH", "tvlUsd": 24000000000.0, "apy": 2.9,
                        "apyBase": 2.9, "stablecoin": false, "ilRisk": "no",
                        "underlyingTokens": ["0x0000000000000000000000000000000000000000"]
                    },
                    {
                        "pool": "db678df9", "chain": "Ethereum", "project": "curve-dex",
                        "symbol": "DAI-USDC-USDT", "tvlUsd": "180000000", "apy": null,
                        "apyReward": 1.2, "rewardTokens": ["0xD533"], "ilRisk": "no",
                        "stablecoin": true
                    },
                    { "chain": "Ethereum", "project": "ghost", "symbol": "X", "tvlUsd": 5e9 }
                ]
            })))
            .mount(&server)
            .await;

        let http = HTTP::with_timeout(Duration::from_secs(5)).unwrap();
        let llama = DefiLlama::new(Arc::new(http), server.uri(), 3);

        let positions = llama.fetch_positions().await.unwrap();

        // "ghost" is in the top three by TVL but has no pool id.
        assert_eq!(positions.len(), 2);

        let lido = &positions[0];
        assert_eq!(lido.protocol_name, "lido");
        assert_eq!(lido.pool_address, "747c1d2a");
        assert_eq!(lido.apy, Some(2.9));
        assert_eq!(lido.il_risk, Some(0.0));
        assert!(!lido.is_stable);

        let curve = &positions[1];
        assert_eq!(curve.apy, None);
        assert_eq!(curve.tvl_usd, Some(180000000.0));
        assert_eq!(curve.token1_symbol.as_deref(), Some("USDC"));
        assert_eq!(curve.farm_rewards.len(), 1);
        assert!(curve.is_stable);
    }

    #[tokio::test]
    async fn garbled_pool_fields_become_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "pool": "good", "chain": "Arbitrum", "project": "uniswap-v3",
                        "symbol": "WETH-USDC", "tvlUsd": 900, "apy": 12
                    },
                    {
                        "pool": "odd", "chain": null, "project": "balancer-v2",
                        "symbol": null, "tvlUsd": 800, "stablecoin": "yes",
                        "rewardTokens": null, "underlyingTokens": [1, 2]
                    },
                    { "pool": 17, "project": "broken", "tvlUsd": 700 }
                ]
            })))
            .mount(&server)
            .await;

        let http = HTTP::with_timeout(Duration::from_secs(5)).unwrap();
        let llama = DefiLlama::new(Arc::new(http), server.uri(), 10);

        let positions = llama.fetch_positions().await.unwrap();

        let pools: Vec<&str> = positions.iter().map(|p| p.pool_address.as_str()).collect();
        assert_eq!(pools, vec!["good", "odd"]);
        assert_eq!(positions[0].chain_id, ChainId::Numeric(42161));

        let odd = &positions[1];
        assert_eq!(odd.protocol_name, "balancer-v2");
        assert_eq!(odd.pool_name, "");
        assert_eq!(odd.token0_address, None);
        assert!(odd.farm_rewards.is_empty());
        assert!(!odd.is_stable);
    }
}
