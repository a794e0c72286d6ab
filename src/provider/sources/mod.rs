//! External position sources.
//!
//! Every source implements [`Source`]: a side-effect free `fetch` of raw
//! records plus its own `normalize` into the canonical [`Position`]. The
//! aggregator only sees the object-safe [`Adapter`] view.

use std::{fmt, io, str::FromStr, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{configuration::Config, error::Error, model::Position, provider::HTTP};

pub use self::{
    aave::Aave, beefy::Beefy, defillama::DefiLlama, envio::Envio,
    pendle::Pendle, yearn::Yearn,
};

mod aave;
mod beefy;
mod defillama;
mod envio;
mod pendle;
mod yearn;

#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Raw: Send;

    fn label(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<Self::Raw>, Error>;

    /// `None` when the record lacks a protocol name or pool address.
    fn normalize(&self, raw: Self::Raw) -> Option<Position>;
}

#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_positions(&self) -> Result<Vec<Position>, Error>;
}

#[async_trait]
impl<S: Source> Adapter for S {
    fn name(&self) -> &str {
        self.label()
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, Error> {
        let records = self.fetch().await?;
        let total = records.len();
        let positions: Vec<Position> = records
            .into_iter()
            .filter_map(|record| self.normalize(record))
            .collect();

        if positions.len() < total {
            debug!(
                source = self.label(),
                "Dropped {} record(s) without identity",
                total - positions.len()
            );
        }

        Ok(positions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Beefy,
    Yearn,
    Pendle,
    Aave,
    DefiLlama,
    Envio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SourceKind::Beefy => write!(f, "beefy"),
            SourceKind::Yearn => write!(f, "yearn"),
            SourceKind::Pendle => write!(f, "pendle"),
            SourceKind::Aave => write!(f, "aave"),
            SourceKind::DefiLlama => write!(f, "defillama"),
            SourceKind::Envio => write!(f, "envio"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<SourceKind, Self::Err> {
        match value.to_lowercase().as_str() {
            "beefy" => Ok(SourceKind::Beefy),
            "yearn" => Ok(SourceKind::Yearn),
            "pendle" => Ok(SourceKind::Pendle),
            "aave" => Ok(SourceKind::Aave),
            "defillama" => Ok(SourceKind::DefiLlama),
            "envio" => Ok(SourceKind::Envio),
            _ => Err(io::Error::other(format!(
                "Source not supported: {}",
                value
            ))),
        }
    }
}

/// Builds the enabled adapters, all sharing one HTTP client.
pub fn from_config(config: &Config, http: Arc<HTTP>) -> Vec<Arc<dyn Adapter>> {
    let limit = config.source_record_limit;
    let mut adapters: Vec<Arc<dyn Adapter>> = vec![];

    for kind in &config.enabled_sources {
        let adapter: Arc<dyn Adapter> = match kind {
            SourceKind::Beefy => Arc::new(Beefy::new(
                http.clone(),
                config.beefy_api.to_owned(),
                limit,
            )),
            SourceKind::Yearn => Arc::new(Yearn::new(
                http.clone(),
                config.yearn_api.to_owned(),
                config.yearn_chains.to_owned(),
                limit,
            )),
            SourceKind::Pendle => Arc::new(Pendle::new(
                http.clone(),
                config.pendle_api.to_owned(),
                config.pendle_chains.to_owned(),
                limit,
            )),
            SourceKind::Aave => Arc::new(Aave::new(
                http.clone(),
                config.aave_subgraphs.to_owned(),
            )),
            SourceKind::DefiLlama => Arc::new(DefiLlama::new(
                http.clone(),
                config.defillama_api.to_owned(),
                limit,
            )),
            SourceKind::Envio => match &config.envio_api_key {
                Some(api_key) => Arc::new(Envio::new(
                    http.clone(),
                    config.envio_hyperindex_url.to_owned(),
                    api_key.to_owned(),
                    config.envio_network_id,
                    limit,
                )),
                None => {
                    warn!("ENVIO_API_KEY is empty, skipping envio source");
                    continue;
                },
            },
        };
        adapters.push(adapter);
    }

    adapters
}
