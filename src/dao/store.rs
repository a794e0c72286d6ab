use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    helpers::slugify,
    model::{
        Action_History, Actions, LP_Position, New_Protocol, Position, Protocol,
    },
};

use super::PositionFilter;

/// Position upserts running at once inside one batch.
const PERSIST_CONCURRENCY: usize = 8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    pub protocols: usize,
    pub upserted: usize,
    pub unresolved: usize,
    pub failed: usize,
}

enum Outcome {
    Upserted,
    Unresolved,
    Failed,
}

/// Durable home of protocols and positions.
///
/// Implementations provide the primitive statements; [`upsert_batch`]
/// drives them in the required order.
///
/// [`upsert_batch`]: PositionStore::upsert_batch
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Creates the protocol or touches its update timestamp.
    async fn upsert_protocol(
        &self,
        protocol: &New_Protocol,
        updated_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    async fn protocol_ids(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, i32>, Error>;

    /// Inserts the position, or overwrites the mutable attributes of the
    /// row keyed by `(protocol_id, pool_address)`.
    async fn upsert_position(
        &self,
        protocol_id: i32,
        position: &Position,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// apy descending, tvl descending, absent values last.
    async fn top_positions(&self, limit: i64) -> Result<Vec<LP_Position>, Error>;

    async fn search_positions(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<LP_Position>, Error>;

    async fn get_position(
        &self,
        protocol_name: &str,
        pool_address: &str,
    ) -> Result<Option<LP_Position>, Error>;

    async fn protocols(&self) -> Result<Vec<Protocol>, Error>;

    async fn record_action(&self, action: Action_History) -> Result<(), Error>;

    async fn last_action(
        &self,
        action: Actions,
    ) -> Result<Option<Action_History>, Error>;

    /// Chain assigned to protocols first seen through a symbolic chain.
    fn default_chain_id(&self) -> i64;

    /// Persists one aggregation result.
    ///
    /// Protocols are upserted before any position, then positions are
    /// written by composite key. A position whose protocol cannot be
    /// resolved, or whose write fails, is logged and skipped; the rest of
    /// the batch is unaffected. Only a failed protocol lookup fails the
    /// whole batch.
    async fn upsert_batch(
        &self,
        positions: &[Position],
    ) -> Result<UpsertReport, Error> {
        let fetched_at = Utc::now();
        let mut report = UpsertReport::default();

        if positions.is_empty() {
            return Ok(report);
        }

        let mut protocols: BTreeMap<&str, i64> = BTreeMap::new();
        for position in positions {
            protocols
                .entry(position.protocol_name.as_str())
                .or_insert_with(|| {
                    position
                        .chain_id
                        .numeric()
                        .and_then(|id| i64::try_from(id).ok())
                        .unwrap_or_else(|| self.default_chain_id())
                });
        }

        for (name, chain_id) in &protocols {
            let protocol = New_Protocol {
                name: name.to_string(),
                slug: slugify(name),
                chain_id: *chain_id,
            };
            match self.upsert_protocol(&protocol, fetched_at).await {
                Ok(()) => report.protocols += 1,
                Err(e) => warn!(protocol = %name, "Protocol upsert failed: {}", e),
            }
        }

        let names: Vec<String> =
            protocols.keys().map(|name| name.to_string()).collect();
        let ids = self.protocol_ids(&names).await?;
        let upserts: Vec<_> = positions
            .iter()
            .map(|position| upsert_one(self, &ids, position, fetched_at))
            .collect();
        let outcomes: Vec<Outcome> = stream::iter(upserts)
            .buffer_unordered(PERSIST_CONCURRENCY)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Upserted => report.upserted += 1,
                Outcome::Unresolved => report.unresolved += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        if report.failed > 0 || report.unresolved > 0 {
            info!(
                "Persisted {} of {} position(s), {} failed, {} unresolved",
                report.upserted,
                positions.len(),
                report.failed,
                report.unresolved
            );
        } else {
            debug!("Persisted {} position(s)", report.upserted);
        }

        Ok(report)
    }
}

async fn upsert_one<S: PositionStore + ?Sized>(
    store: &S,
    ids: &HashMap<String, i32>,
    position: &Position,
    fetched_at: DateTime<Utc>,
) -> Outcome {
    let Some(protocol_id) = ids.get(&position.protocol_name) else {
        warn!(
            protocol = %position.protocol_name,
            pool = %position.pool_address,
            "Protocol unresolved, position skipped"
        );
        return Outcome::Unresolved;
    };

    match store.upsert_position(*protocol_id, position, fetched_at).await {
        Ok(()) => Outcome::Upserted,
        Err(e) => {
            warn!(
                protocol = %position.protocol_name,
                pool = %position.pool_address,
                "Position upsert failed: {}",
                e
            );
            Outcome::Failed
        },
    }
}
