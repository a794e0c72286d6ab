use std::{env, fs, num::NonZeroUsize, ops::Deref, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing::{info, warn};
use url::Url;

use crate::{
    dao::{MemoryStore, PositionStore},
    error::Error,
    handler::{Aggregator, Scheduler},
    helpers::{parse_list, parse_tuple_string},
    migration,
    provider::{sources, DatabasePool, SourceKind, HTTP},
    query::QueryFacade,
};

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

/// Handles constructed once at process start and shared by the
/// scheduler, the administrative commands and the query layer.
pub struct State {
    pub config: Config,
    pub store: Arc<dyn PositionStore>,
    pub aggregator: Arc<Aggregator>,
    pub scheduler: Scheduler,
    pub query: QueryFacade,
}

impl State {
    pub async fn new(config: Config) -> Result<State, Error> {
        let store = Self::init_store(&config).await?;
        let http = Arc::new(HTTP::new(&config)?);
        let adapters = sources::from_config(&config, http);

        info!(
            "Configured {} source(s): {}",
            adapters.len(),
            adapters
                .iter()
                .map(|a| a.name().to_owned())
                .collect::<Vec<String>>()
                .join(", ")
        );

        let aggregator = Arc::new(Aggregator::new(
            adapters,
            store.clone(),
            config.max_concurrent_sources,
        ));
        let scheduler =
            Scheduler::new(aggregator.clone(), config.aggregation_period());
        let query = QueryFacade::new(store.clone());

        Ok(State {
            config,
            store,
            aggregator,
            scheduler,
            query,
        })
    }

    async fn init_store(
        config: &Config,
    ) -> Result<Arc<dyn PositionStore>, Error> {
        match &config.database_url {
            Some(database_url) => {
                migration::run_migrations(database_url).await?;
                let database = DatabasePool::new(config).await?;
                Ok(Arc::new(database))
            },
            None => {
                warn!("DATABASE_URL is empty, positions are kept in memory");
                Ok(Arc::new(MemoryStore::new(config.default_chain_id)))
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub aggregation_interval: u64,
    pub max_concurrent_sources: NonZeroUsize,
    pub timeout: u64,
    pub source_record_limit: usize,
    pub default_chain_id: i64,
    pub enabled_sources: Vec<SourceKind>,
    pub beefy_api: String,
    pub yearn_api: String,
    pub yearn_chains: Vec<u64>,
    pub pendle_api: String,
    pub pendle_chains: Vec<u64>,
    pub aave_subgraphs: Vec<(String, String)>,
    pub defillama_api: String,
    pub envio_hyperindex_url: String,
    pub envio_api_key: Option<String>,
    pub envio_network_id: u64,
}

impl Config {
    pub fn aggregation_period(&self) -> Duration {
        Duration::from_secs(self.aggregation_interval * 60)
    }
}

pub fn get_configuration() -> Result<Config, Error> {
    let database_url = optional_var("DATABASE_URL");
    let aggregation_interval =
        env::var("AGGREGATION_INTERVAL_IN_MIN")?.parse()?;
    let max_concurrent_sources =
        env::var("MAX_CONCURRENT_SOURCES")?.parse()?;
    let timeout = env::var("TIMEOUT")?.parse()?;
    let source_record_limit = env::var("SOURCE_RECORD_LIMIT")?.parse()?;
    let default_chain_id = env::var("DEFAULT_CHAIN_ID")?.parse()?;

    let mut enabled_sources = vec![];
    for item in parse_list(&env::var("ENABLED_SOURCES")?) {
        enabled_sources.push(SourceKind::from_str(&item)?);
    }

    let beefy_api = get_url("BEEFY_API")?;
    let yearn_api = get_url("YEARN_API")?;
    let yearn_chains = get_chain_ids("YEARN_CHAINS")?;
    let pendle_api = get_url("PENDLE_API")?;
    let pendle_chains = get_chain_ids("PENDLE_CHAINS")?;
    let aave_subgraphs = get_aave_subgraphs()?;
    let defillama_api = get_url("DEFILLAMA_API")?;
    let envio_hyperindex_url = get_url("ENVIO_HYPERINDEX_URL")?;
    let envio_api_key = optional_var("ENVIO_API_KEY");
    let envio_network_id = env::var("ENVIO_NETWORK_ID")?.parse()?;

    if aggregation_interval == 0 {
        return Err(Error::ConfigurationError(String::from(
            "AGGREGATION_INTERVAL_IN_MIN must be positive",
        )));
    }

    let config = Config {
        database_url,
        aggregation_interval,
        max_concurrent_sources,
        timeout,
        source_record_limit,
        default_chain_id,
        enabled_sources,
        beefy_api,
        yearn_api,
        yearn_chains,
        pendle_api,
        pendle_chains,
        aave_subgraphs,
        defillama_api,
        envio_hyperindex_url,
        envio_api_key,
        envio_network_id,
    };

    Ok(config)
}

/// Loads `.env` (optional) and `aggregator.conf` from the manifest
/// directory into the process environment. Variables already present in
/// the environment win, then `.env`, then `aggregator.conf`.
pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";
    let aggregator_config_file: &str = "aggregator.conf";

    let directory = env!("CARGO_MANIFEST_DIR");
    let path = format!("{}/{}", directory, config_file);
    let aggregator_config_path =
        format!("{}/{}", directory, aggregator_config_file);

    match fs::read_to_string(&path) {
        Ok(config_string) => parse_config_string(config_string),
        Err(e) => info!("Skipping {}: {}", path, e),
    }

    let aggregator_config_string = fs::read_to_string(aggregator_config_path)?;
    parse_config_string(aggregator_config_string);

    Ok(())
}

fn parse_config_string(config: String) {
    for (key, value) in parse_config_pairs(&config) {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }
}

fn parse_config_pairs(config: &str) -> Vec<(&str, &str)> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn get_url(key: &str) -> Result<String, Error> {
    let value = env::var(key)?;
    Url::parse(&value)?;
    Ok(value.trim_end_matches('/').to_owned())
}

fn get_chain_ids(key: &str) -> Result<Vec<u64>, Error> {
    let mut chains = vec![];
    for item in parse_list(&env::var(key)?) {
        chains.push(item.parse()?);
    }
    Ok(chains)
}

fn get_aave_subgraphs() -> Result<Vec<(String, String)>, Error> {
    let mut subgraphs = vec![];

    for item in parse_tuple_string(env::var("AAVE_SUBGRAPHS")?) {
        let (chain, url) = item
            .split_once(',')
            .with_context(|| format!("Malformed AAVE_SUBGRAPHS entry {}", item))?;
        Url::parse(url.trim())?;
        subgraphs.push((chain.trim().to_owned(), url.trim().to_owned()));
    }

    Ok(subgraphs)
}
