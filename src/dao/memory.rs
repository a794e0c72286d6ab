use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::Error,
    helpers::cmp_desc,
    model::{
        Action_History, Actions, LP_Position, New_Protocol, Position, Protocol,
    },
};

use super::{PositionFilter, PositionStore};

#[derive(Debug, Default)]
struct Tables {
    protocols: Vec<Protocol>,
    positions: Vec<LP_Position>,
    actions: Vec<Action_History>,
}

/// Store used when no database is configured. Mirrors the Postgres
/// statements row for row, including composite-key upserts and ordering.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    default_chain_id: i64,
}

impl MemoryStore {
    pub fn new(default_chain_id: i64) -> MemoryStore {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
            default_chain_id,
        }
    }

    pub async fn position_count(&self) -> usize {
        self.tables.read().await.positions.len()
    }

    pub async fn action_count(&self) -> usize {
        self.tables.read().await.actions.len()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn upsert_protocol(
        &self,
        protocol: &New_Protocol,
        updated_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tables = self.tables.write().await;

        match tables.protocols.iter_mut().find(|p| p.name == protocol.name) {
            Some(existing) => existing.updated_at = updated_at,
            None => {
                let id = tables.protocols.len() as i32 + 1;
                tables.protocols.push(Protocol {
                    id,
                    name: protocol.name.to_owned(),
                    slug: protocol.slug.to_owned(),
                    chain_id: protocol.chain_id,
                    is_active: true,
                    created_at: updated_at,
                    updated_at,
                });
            },
        }

        Ok(())
    }

    async fn protocol_ids(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, i32>, Error> {
        let tables = self.tables.read().await;

        Ok(tables
            .protocols
            .iter()
            .filter(|p| names.contains(&p.name))
            .map(|p| (p.name.to_owned(), p.id))
            .collect())
    }

    async fn upsert_position(
        &self,
        protocol_id: i32,
        position: &Position,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tables = self.tables.write().await;

        let existing = tables.positions.iter_mut().find(|p| {
            p.protocol_id == protocol_id && p.pool_address == position.pool_address
        });

        match existing {
            Some(row) => row.refresh(position, fetched_at),
            None => {
                let protocol_name = tables
                    .protocols
                    .iter()
                    .find(|p| p.id == protocol_id)
                    .map(|p| p.name.to_owned())
                    .ok_or_else(|| {
                        Error::ProtocolError(position.protocol_name.to_owned())
                    })?;
                let id = tables.positions.len() as i64 + 1;
                let mut row =
                    LP_Position::from_position(id, protocol_id, position, fetched_at);
                row.protocol_name = protocol_name;
                tables.positions.push(row);
            },
        }

        Ok(())
    }

    async fn top_positions(&self, limit: i64) -> Result<Vec<LP_Position>, Error> {
        let tables = self.tables.read().await;
        let mut rows = tables.positions.clone();

        rows.sort_by(|a, b| {
            cmp_desc(a.apy, b.apy)
                .then_with(|| cmp_desc(a.tvl_usd, b.tvl_usd))
                .then_with(|| a.id.cmp(&b.id))
        });
        rows.truncate(limit.max(0) as usize);

        Ok(rows)
    }

    async fn search_positions(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<LP_Position>, Error> {
        let tables = self.tables.read().await;
        let mut rows: Vec<LP_Position> = tables
            .positions
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        rows.sort_by(|a, b| filter.compare(a, b));

        Ok(rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn get_position(
        &self,
        protocol_name: &str,
        pool_address: &str,
    ) -> Result<Option<LP_Position>, Error> {
        let tables = self.tables.read().await;

        Ok(tables
            .positions
            .iter()
            .find(|p| {
                p.protocol_name == protocol_name && p.pool_address == pool_address
            })
            .cloned())
    }

    async fn protocols(&self) -> Result<Vec<Protocol>, Error> {
        let tables = self.tables.read().await;
        let mut protocols = tables.protocols.clone();
        protocols.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(protocols)
    }

    async fn record_action(&self, action: Action_History) -> Result<(), Error> {
        self.tables.write().await.actions.push(action);
        Ok(())
    }

    async fn last_action(
        &self,
        action: Actions,
    ) -> Result<Option<Action_History>, Error> {
        let action_type = action.to_string();
        let tables = self.tables.read().await;

        Ok(tables
            .actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    fn default_chain_id(&self) -> i64 {
        self.default_chain_id
    }
}
