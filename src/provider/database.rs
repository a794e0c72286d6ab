use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    configuration::Config,
    dao::{PoolOption, PoolType, PositionFilter, PositionStore},
    error::Error,
    model::{
        Action_History, Actions, LP_Position, New_Protocol, Position, Protocol,
        Table,
    },
};

#[derive(Debug)]
pub struct DatabasePool {
    pub protocol: Table<Protocol>,
    pub lp_position: Table<LP_Position>,
    pub action_history: Table<Action_History>,
    pub pool: PoolType,
    default_chain_id: i64,
}

impl DatabasePool {
    pub async fn new(config: &Config) -> Result<DatabasePool, Error> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            Error::ConfigurationError(String::from("DATABASE_URL is not set"))
        })?;

        let pool = PoolOption::new()
            .after_connect(|_conn, _meta| Box::pin(async move { Ok(()) }))
            .max_connections(20)
            .connect(database_url)
            .await?;

        Ok(DatabasePool {
            protocol: Table::new(pool.clone()),
            lp_position: Table::new(pool.clone()),
            action_history: Table::new(pool.clone()),
            pool,
            default_chain_id: config.default_chain_id,
        })
    }
}

#[async_trait]
impl PositionStore for DatabasePool {
    async fn upsert_protocol(
        &self,
        protocol: &New_Protocol,
        updated_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        Ok(self.protocol.upsert(protocol, updated_at).await?)
    }

    async fn protocol_ids(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, i32>, Error> {
        let ids = self.protocol.get_ids_by_names(names).await?;
        Ok(ids.into_iter().collect())
    }

    async fn upsert_position(
        &self,
        protocol_id: i32,
        position: &Position,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        Ok(self
            .lp_position
            .upsert(protocol_id, position, fetched_at)
            .await?)
    }

    async fn top_positions(&self, limit: i64) -> Result<Vec<LP_Position>, Error> {
        Ok(self.lp_position.get_top(limit).await?)
    }

    async fn search_positions(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<LP_Position>, Error> {
        Ok(self.lp_position.search(filter).await?)
    }

    async fn get_position(
        &self,
        protocol_name: &str,
        pool_address: &str,
    ) -> Result<Option<LP_Position>, Error> {
        Ok(self.lp_position.get_one(protocol_name, pool_address).await?)
    }

    async fn protocols(&self) -> Result<Vec<Protocol>, Error> {
        Ok(self.protocol.get_all().await?)
    }

    async fn record_action(&self, action: Action_History) -> Result<(), Error> {
        Ok(self.action_history.insert(action).await?)
    }

    async fn last_action(
        &self,
        action: Actions,
    ) -> Result<Option<Action_History>, Error> {
        Ok(self
            .action_history
            .get_last_by_type(String::from(action))
            .await?)
    }

    fn default_chain_id(&self) -> i64 {
        self.default_chain_id
    }
}
