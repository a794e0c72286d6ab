use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Map};

use crate::{
    error::Error,
    helpers::{
        apr_to_apy, is_stable_pair, lenient, lenient_f64, lenient_list,
        non_empty, ray_to_percent, risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

const PROTOCOL: &str = "Aave V3";
const AUDIT_SCORE: f64 = 92.0;

const MARKETS_QUERY: &str = r#"
query GetMarkets {
    markets(first: 100, where: { isActive: true }) {
        id
        name
        liquidityRate
        variableBorrowRate
        totalLiquidity
        totalCurrentVariableDebt
        utilizationRate
        inputToken {
            id
            symbol
        }
    }
}
"#;

#[derive(Debug, Default, Deserialize)]
pub struct AaveToken {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,
}

/// Reserve market. Rates are ray (1e27) fixed-point annual rates.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaveMarket {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub liquidity_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub variable_borrow_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_liquidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_current_variable_debt: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub utilization_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub input_token: AaveToken,
}

#[derive(Debug, Deserialize)]
struct AaveMarkets {
    #[serde(default, deserialize_with = "lenient_list")]
    markets: Vec<AaveMarket>,
}

#[derive(Debug)]
pub struct AaveRecord {
    pub chain: String,
    pub market: AaveMarket,
}

/// Aave v3 lending reserves, one subgraph per chain.
pub struct Aave {
    http: Arc<HTTP>,
    subgraphs: Vec<(String, String)>,
}

impl Aave {
    pub fn new(http: Arc<HTTP>, subgraphs: Vec<(String, String)>) -> Aave {
        Aave { http, subgraphs }
    }

    async fn fetch_chain(
        &self,
        chain: &str,
        url: &str,
    ) -> Result<Vec<AaveRecord>, Error> {
        let data: AaveMarkets = self
            .http
            .post_graphql(url, MARKETS_QUERY, json!({}), HeaderMap::new())
            .await?;

        Ok(data
            .markets
            .into_iter()
            .map(|market| AaveRecord {
                chain: chain.to_owned(),
                market,
            })
            .collect())
    }
}

#[async_trait]
impl Source for Aave {
    type Raw = AaveRecord;

    fn label(&self) -> &'static str {
        "aave"
    }

    async fn fetch(&self) -> Result<Vec<AaveRecord>, Error> {
        let chains = self
            .subgraphs
            .iter()
            .map(|(chain, url)| self.fetch_chain(chain, url));

        Ok(try_join_all(chains).await?.into_iter().flatten().collect())
    }

    fn normalize(&self, raw: AaveRecord) -> Option<Position> {
        let AaveRecord { chain, market } = raw;
        let pool_address = non_empty(market.id.as_deref())?;
        let symbol = non_empty(market.input_token.symbol.as_deref())
            .unwrap_or_else(|| String::from("UNKNOWN"));
        let apr = ray_to_percent(market.liquidity_rate);

        let mut extra = Map::new();
        if let Some(borrow) = ray_to_percent(market.variable_borrow_rate) {
            extra.insert(String::from("borrowApr"), json!(borrow));
        }
        if let Some(debt) = market.total_current_variable_debt {
            extra.insert(String::from("totalDebt"), json!(debt));
        }
        if let Some(utilization) = market.utilization_rate {
            extra.insert(String::from("utilization"), json!(utilization * 100.0));
        }

        Some(Position {
            protocol_name: String::from(PROTOCOL),
            pool_address,
            pool_name: market
                .name
                .unwrap_or_else(|| format!("Aave {} Market", symbol)),
            chain_id: ChainId::from_name(&chain),
            is_stable: is_stable_pair(&[symbol.as_str()]),
            token0_symbol: symbol,
            token0_address: non_empty(market.input_token.id.as_deref()),
            token1_symbol: None,
            token1_address: None,
            apy: apr_to_apy(apr),
            apr,
            tvl_usd: market.total_liquidity,
            volume_24h: None,
            fees_24h: None,
            il_risk: Some(0.0),
            risk_level: RiskLevel::from_score(risk_score(0.0, 0.0, AUDIT_SCORE)),
            farm_rewards: vec![],
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
    async fn ray_rates_become_percent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/aave/protocol-v3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "markets": [
                        {
                            "id": "0xreserve",
                            "liquidityRate": "35000000000000000000000000",
                            "variableBorrowRate": "50000000000000000000000000",
                            "totalLiquidity": "125000000.25",
                            "utilizationRate": "0.8",
                            "inputToken": { "id": "0xa0b8", "symbol": "USDC" }
                        },
                        {
                            "liquidityRate": "1",
                            "inputToken": { "symbol": "WETH" }
                        }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let http = HTTP::with_timeout(Duration::from_secs(5)).unwrap();
        let aave = Aave::new(
            Arc::new(http),
            vec![(
                String::from("ethereum"),
                format!("{}/aave/protocol-v3", server.uri()),
            )],
        );

        let positions = aave.fetch_positions().await.unwrap();

        assert_eq!(positions.len(), 1);
        let usdc = &positions[0];
        assert_eq!(usdc.protocol_name, "Aave V3");
        assert_eq!(usdc.chain_id, ChainId::Numeric(1));
        assert_eq!(usdc.pool_name, "Aave USDC Market");
        assert!((usdc.apr.unwrap() - 3.5).abs() < 1e-9);
        assert!(usdc.apy.unwrap() > usdc.apr.unwrap());
        assert_eq!(usdc.tvl_usd, Some(125000000.25));
        assert!((usdc.extra["borrowApr"].as_f64().unwrap() - 5.0).abs() < 1e-9);
        assert!(usdc.is_stable);
        assert_eq!(usdc.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn null_token_keeps_the_market() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/aave/protocol-v3-polygon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "markets": [
                        {
                            "id": "0xgood",
                            "name": "Aave Polygon DAI",
                            "liquidityRate": "20000000000000000000000000",
                            "inputToken": { "id": "0x8f3c", "symbol": "DAI" }
                        },
                        {
                            "id": "0xbare",
                            "name": null,
                            "liquidityRate": null,
                            "inputToken": null
                        },
                        [1, 2, 3]
                    ]
                }
            })))
            .mount(&server)
            .await;

        let http = HTTP::with_timeout(Duration::from_secs(5)).unwrap();
        let aave = Aave::new(
            Arc::new(http),
            vec![(
                String::from("polygon"),
                format!("{}/aave/protocol-v3-polygon", server.uri()),
            )],
        );

        let positions = aave.fetch_positions().await.unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].pool_name, "Aave Polygon DAI");
        assert!((positions[0].apr.unwrap() - 2.0).abs() < 1e-9);

        let bare = &positions[1];
        assert_eq!(bare.pool_address, "0xbare");
        assert_eq!(bare.pool_name, "Aave UNKNOWN Market");
        assert_eq!(bare.chain_id, ChainId::Numeric(137));
        assert_eq!(bare.apr, None);
        assert_eq!(bare.apy, None);
    }
}
