use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    error::Error,
    helpers::{
        cmp_desc, decode_each, estimate_il_risk, finite_f64,
        fraction_to_percent, is_stable_pair, lenient, lenient_f64, non_empty,
        risk_score,
    },
    model::{ChainId, Position, RiskLevel},
    provider::HTTP,
};

use super::Source;

const PROTOCOL: &str = "Beefy";
const AUDIT_SCORE: f64 = 85.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeefyVault {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub chain: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub token_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub assets: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub earn_contract_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub platform_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeefyApyBreakdown {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_apy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vault_apr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub trading_apr: Option<f64>,
}

/// A vault joined with its rate breakdown and TVL by vault id.
#[derive(Debug)]
pub struct BeefyRecord {
    pub vault: BeefyVault,
    pub apy: Option<BeefyApyBreakdown>,
    pub tvl: Option<f64>,
}

/// Beefy auto-compounding vaults. Rates arrive as fractions.
pub struct Beefy {
    http: Arc<HTTP>,
    base_url: String,
    limit: usize,
}

impl Beefy {
    pub fn new(http: Arc<HTTP>, base_url: String, limit: usize) -> Beefy {
        Beefy {
            http,
            base_url,
            limit,
        }
    }
}

#[async_trait]
impl Source for Beefy {
    type Raw = BeefyRecord;

    fn label(&self) -> &'static str {
        "beefy"
    }

    async fn fetch(&self) -> Result<Vec<BeefyRecord>, Error> {
        let vaults_url = format!("{}/vaults", self.base_url);
        let apy_url = format!("{}/apy/breakdown", self.base_url);
        let tvl_url = format!("{}/tvl", self.base_url);

        let (vaults, mut apys, tvls) = tokio::try_join!(
            self.http.get_json::<Vec<Value>>(&vaults_url),
            self.http.get_json::<HashMap<String, Value>>(&apy_url),
            self.http.get_json::<HashMap<String, Value>>(&tvl_url),
        )?;

        // TVL is grouped by chain id; vault ids are unique across chains.
        let tvls: HashMap<String, Value> = tvls
            .into_values()
            .filter_map(|chain| match chain {
                Value::Object(entries) => Some(entries),
                _ => None,
            })
            .flatten()
            .collect();

        let mut records: Vec<BeefyRecord> = decode_each::<BeefyVault>(vaults)
            .into_iter()
            .filter(|vault| vault.status.as_deref() == Some("active"))
            .map(|vault| {
                let tvl = tvls.get(&vault.id).and_then(finite_f64);
                let apy = apys
                    .remove(&vault.id)
                    .and_then(|apy| serde_json::from_value(apy).ok());
                BeefyRecord { vault, apy, tvl }
            })
            .collect();

        records.sort_by(|a, b| cmp_desc(a.tvl, b.tvl));
        records.truncate(self.limit);

        Ok(records)
    }

    fn normalize(&self, raw: BeefyRecord) -> Option<Position> {
        let BeefyRecord { vault, apy, tvl } = raw;
        let pool_address = non_empty(vault.earn_contract_address.as_deref())?;
        let apy = apy.unwrap_or_default();

        let token0_symbol = vault
            .assets
            .first()
            .cloned()
            .or(vault.token.clone())
            .unwrap_or_default();
        let token1_symbol = vault.assets.get(1).cloned();
        let symbols: Vec<&str> = vault.assets.iter().map(String::as_str).collect();
        let il_risk = estimate_il_risk(&symbols);

        let mut extra = Map::new();
        extra.insert(String::from("vaultId"), json!(vault.id));
        if let Some(platform) = &vault.platform_id {
            extra.insert(String::from("platform"), json!(platform));
        }
        if let Some(trading_apr) = fraction_to_percent(apy.trading_apr) {
            extra.insert(String::from("tradingApr"), json!(trading_apr));
        }

        Some(Position {
            protocol_name: String::from(PROTOCOL),
            pool_address,
            pool_name: non_empty(vault.name.as_deref())
                .unwrap_or_else(|| vault.id.clone()),
            chain_id: ChainId::from_name(vault.chain.as_deref().unwrap_or_default()),
            token0_symbol,
            token0_address: non_empty(vault.token_address.as_deref()),
            token1_symbol,
            token1_address: None,
            apy: fraction_to_percent(apy.total_apy),
            apr: fraction_to_percent(apy.vault_apr),
            tvl_usd: tvl,
            volume_24h: None,
            fees_24h: None,
            il_risk: Some(il_risk),
            risk_level: RiskLevel::from_score(risk_score(il_risk, 0.0, AUDIT_SCORE)),
            farm_rewards: vec![json!({ "token": "BIFI", "autoCompounded": true })],
            is_stable: is_stable_pair(&symbols),
            extra,
        })
    }
}
