use std::{num::NonZeroUsize, sync::Arc};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    cache::TimedCache,
    cache_keys,
    dao::PositionStore,
    futures_set::join_bounded,
    helpers::dedup_positions,
    model::{Action_History, Actions, Position},
    provider::sources::Adapter,
};

use super::source_guard::guarded_fetch;

/// One aggregation pass over every configured source, fronted by the
/// positions snapshot cache.
pub struct Aggregator {
    sources: Vec<Arc<dyn Adapter>>,
    store: Arc<dyn PositionStore>,
    cache: TimedCache<String>,
    max_concurrent: NonZeroUsize,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn Adapter>>,
        store: Arc<dyn PositionStore>,
        max_concurrent: NonZeroUsize,
    ) -> Aggregator {
        Aggregator {
            sources,
            store,
            cache: TimedCache::new(cache_keys::POSITIONS_TTL_SECS),
            max_concurrent,
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Returns the cached snapshot while it is fresh. Otherwise fans out to
    /// every source, persists the combined batch and caches it.
    ///
    /// Never fails: source errors yield no positions and persistence
    /// errors are logged. The snapshot is cached even when persistence
    /// failed.
    pub async fn run_cycle(&self) -> Vec<Position> {
        if let Some(positions) = self.cached().await {
            info!("Serving {} position(s) from cache", positions.len());
            return positions;
        }

        let positions = self.collect().await;
        self.persist(&positions).await;

        match serde_json::to_string(&positions) {
            Ok(snapshot) => {
                self.cache.set(cache_keys::POSITIONS_ALL, snapshot).await
            },
            Err(e) => error!("Failed to serialize positions snapshot: {}", e),
        }

        positions
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate(cache_keys::POSITIONS_ALL).await;
    }

    async fn cached(&self) -> Option<Vec<Position>> {
        let snapshot = self.cache.get(cache_keys::POSITIONS_ALL).await?;

        match serde_json::from_str(&snapshot) {
            Ok(positions) => Some(positions),
            Err(e) => {
                warn!("Discarding unreadable positions snapshot: {}", e);
                None
            },
        }
    }

    /// Guarded, bounded fan-out. Completion order decides the order of the
    /// combined batch.
    async fn collect(&self) -> Vec<Position> {
        let started = tokio::time::Instant::now();
        let futures: Vec<_> = self
            .sources
            .iter()
            .map(|source| guarded_fetch(Arc::clone(source)))
            .collect();

        let positions = join_bounded(
            futures,
            self.max_concurrent,
            Vec::new(),
            |mut acc, positions| {
                acc.extend(positions);
                acc
            },
            |e| error!("Source task failed to join: {}", e),
        )
        .await;

        let total = positions.len();
        let positions = dedup_positions(positions);

        info!(
            "Collected {} position(s) from {} source(s) in {:?}, {} duplicate(s) collapsed",
            positions.len(),
            self.sources.len(),
            started.elapsed(),
            total - positions.len()
        );

        positions
    }

    async fn persist(&self, positions: &[Position]) {
        match self.store.upsert_batch(positions).await {
            Ok(report) => info!(
                "Stored {} position(s) across {} protocol(s)",
                report.upserted, report.protocols
            ),
            Err(e) => error!("Failed to persist positions batch: {}", e),
        }

        let action = Action_History {
            action_type: Actions::AggregationAction.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_action(action).await {
            warn!("Failed to record aggregation action: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::MemoryStore,
        futures_set::DEFAULT_CAPACITY,
        handler::fakes::{FakeAdapter, Gauge},
        helpers::fixtures::position,
    };

    fn aggregator(
        sources: Vec<Arc<dyn Adapter>>,
        store: Arc<MemoryStore>,
    ) -> Aggregator {
        Aggregator::new(sources, store, DEFAULT_CAPACITY)
    }

    #[tokio::test]
    async fn failing_sources_do_not_reduce_others() {
        let store = Arc::new(MemoryStore::new(1));
        let healthy = Arc::new(FakeAdapter::returning(
            "curve",
            vec![
                position("Curve", "0x1", Some(4.0), Some(10.0)),
                position("Curve", "0x2", Some(6.0), Some(20.0)),
            ],
        ));
        let other = Arc::new(FakeAdapter::returning(
            "beefy",
            vec![position("Beefy", "0x3", Some(9.0), Some(1.0))],
        ));
        let aggregator = aggregator(
            vec![
                healthy as Arc<dyn Adapter>,
                Arc::new(FakeAdapter::failing("down")),
                other,
                Arc::new(FakeAdapter::panicking("broken")),
            ],
            store.clone(),
        );

        let positions = aggregator.run_cycle().await;

        assert_eq!(positions.len(), 3);
        assert_eq!(store.position_count().await, 3);
        assert_eq!(store.action_count().await, 1);
    }

    #[tokio::test]
    async fn total_outage_keeps_prior_rows() {
        let store = Arc::new(MemoryStore::new(1));
        store
            .upsert_batch(&[position("Curve", "0x1", Some(4.0), None)])
            .await
            .unwrap();
        let down = Arc::new(FakeAdapter::failing("down")) as Arc<dyn Adapter>;
        let aggregator = aggregator(vec![down], store.clone());

        let positions = aggregator.run_cycle().await;

        assert!(positions.is_empty());
        assert_eq!(store.position_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_identities_collapse() {
        let store = Arc::new(MemoryStore::new(1));
        let sources: Vec<Arc<dyn Adapter>> = ["first", "second"]
            .into_iter()
            .map(|name| {
                let adapter = FakeAdapter::returning(
                    name,
                    vec![position("Curve", "0x1", Some(4.0), None)],
                );
                Arc::new(adapter) as Arc<dyn Adapter>
            })
            .collect();
        let aggregator = aggregator(sources, store.clone());

        let positions = aggregator.run_cycle().await;

        assert_eq!(positions.len(), 1);
        assert_eq!(store.position_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_serves_cycles_within_ttl() {
        let store = Arc::new(MemoryStore::new(1));
        let source = Arc::new(FakeAdapter::returning(
            "curve",
            vec![position("Curve", "0x1", Some(4.0), None)],
        ));
        let aggregator =
            aggregator(vec![source.clone() as Arc<dyn Adapter>], store.clone());

        let first = aggregator.run_cycle().await;
        tokio::time::advance(Duration::from_secs(300)).await;
        let second = aggregator.run_cycle().await;

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert_eq!(store.action_count().await, 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        aggregator.run_cycle().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(store.action_count().await, 2);
    }

    #[tokio::test]
    async fn invalidated_cache_refetches() {
        let store = Arc::new(MemoryStore::new(1));
        let source = Arc::new(FakeAdapter::returning("curve", vec![]));
        let aggregator = aggregator(vec![source.clone() as Arc<dyn Adapter>], store);

        aggregator.run_cycle().await;
        aggregator.invalidate_cache().await;
        aggregator.run_cycle().await;

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_four_sources_in_flight() {
        let store = Arc::new(MemoryStore::new(1));
        let gauge = Arc::new(Gauge::default());
        let sources: Vec<Arc<dyn Adapter>> = (0..10)
            .map(|i| {
                let adapter = FakeAdapter::returning(
                    &format!("source-{}", i),
                    vec![position("Curve", &format!("0x{}", i), None, None)],
                )
                .with_delay(Duration::from_secs(5))
                .with_gauge(gauge.clone());
                Arc::new(adapter) as Arc<dyn Adapter>
            })
            .collect();
        let aggregator = aggregator(sources, store.clone());

        let positions = aggregator.run_cycle().await;

        assert_eq!(positions.len(), 10);
        assert_eq!(gauge.peak(), 4);
        assert_eq!(store.position_count().await, 10);
    }
}
