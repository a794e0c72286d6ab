//! Read side over the position store, consumed by the CLI and by any API
//! layer built on top of this crate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    dao::{PositionFilter, PositionStore, MAX_LIMIT},
    error::Error,
    model::{Actions, LP_Position, Protocol},
};

#[derive(Debug, Serialize)]
pub struct Status {
    pub last_aggregation: Option<DateTime<Utc>>,
    pub protocols: usize,
}

#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<dyn PositionStore>,
}

impl QueryFacade {
    pub fn new(store: Arc<dyn PositionStore>) -> QueryFacade {
        QueryFacade { store }
    }

    /// Highest apy first, tvl breaking ties. At most `limit` entries.
    pub async fn top_positions(
        &self,
        limit: usize,
    ) -> Result<Vec<LP_Position>, Error> {
        let limit = i64::try_from(limit).unwrap_or(MAX_LIMIT).min(MAX_LIMIT);
        self.store.top_positions(limit).await
    }

    pub async fn positions(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<LP_Position>, Error> {
        self.store.search_positions(filter).await
    }

    pub async fn position(
        &self,
        protocol_name: &str,
        pool_address: &str,
    ) -> Result<Option<LP_Position>, Error> {
        self.store.get_position(protocol_name, pool_address).await
    }

    pub async fn protocols(&self) -> Result<Vec<Protocol>, Error> {
        self.store.protocols().await
    }

    pub async fn status(&self) -> Result<Status, Error> {
        let last_aggregation = self
            .store
            .last_action(Actions::AggregationAction)
            .await?
            .map(|action| action.created_at);
        let protocols = self.store.protocols().await?.len();

        Ok(Status {
            last_aggregation,
            protocols,
        })
    }
}
