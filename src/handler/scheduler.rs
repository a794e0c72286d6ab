use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    time::{self, MissedTickBehavior},
};
use tracing::info;

use crate::{error::Error, model::Position};

use super::Aggregator;

/// Drives aggregation cycles on a fixed period, one at a time.
///
/// Every cycle, periodic or administrative, passes through a single-permit
/// gate. A trigger arriving while a cycle runs waits for it to finish.
#[derive(Clone)]
pub struct Scheduler {
    aggregator: Arc<Aggregator>,
    period: Duration,
    gate: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(aggregator: Arc<Aggregator>, period: Duration) -> Scheduler {
        Scheduler {
            aggregator,
            period,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Runs one cycle once the gate is free. `force` drops the cached
    /// snapshot first so sources are always queried.
    pub async fn trigger(&self, force: bool) -> Result<Vec<Position>, Error> {
        let _permit = match self.gate.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                info!("Aggregation in progress, deferring trigger");
                self.gate.acquire().await?
            },
        };

        if force {
            self.aggregator.invalidate_cache().await;
        }

        Ok(self.aggregator.run_cycle().await)
    }

    /// First cycle starts immediately. A cycle outlasting the period delays
    /// the next tick instead of queueing a burst.
    pub async fn run(&self) -> Result<(), Error> {
        info!("Aggregation scheduled every {:?}", self.period);

        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let positions = self.trigger(false).await?;
            info!("Aggregation cycle finished with {} position(s)", positions.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        dao::MemoryStore,
        futures_set::DEFAULT_CAPACITY,
        handler::fakes::{FakeAdapter, Gauge},
        helpers::fixtures::position,
        provider::sources::Adapter,
    };

    use super::*;

    const PERIOD: Duration = Duration::from_secs(600);

    fn scheduler(
        source: Arc<FakeAdapter>,
        store: Arc<MemoryStore>,
    ) -> Scheduler {
        let sources = vec![source as Arc<dyn Adapter>];
        let aggregator = Aggregator::new(sources, store, DEFAULT_CAPACITY);
        Scheduler::new(Arc::new(aggregator), PERIOD)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_period() {
        let store = Arc::new(MemoryStore::new(1));
        let source = Arc::new(FakeAdapter::returning(
            "curve",
            vec![position("Curve", "0x1", Some(4.0), None)],
        ));
        let scheduler = scheduler(source.clone(), store.clone());

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(store.position_count().await, 1);

        time::sleep(PERIOD).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(store.action_count().await, 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycle_is_never_overlapped() {
        let store = Arc::new(MemoryStore::new(1));
        let gauge = Arc::new(Gauge::default());
        let source = Arc::new(
            FakeAdapter::returning(
                "slow",
                vec![position("Curve", "0x1", Some(4.0), None)],
            )
            .with_delay(Duration::from_secs(900))
            .with_gauge(gauge.clone()),
        );
        let scheduler = scheduler(source.clone(), store.clone());

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.is_running());

        time::sleep(Duration::from_secs(999)).await;
        assert_eq!(gauge.peak(), 1);
        assert_eq!(store.action_count().await, 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_during_cycle_is_deferred() {
        let store = Arc::new(MemoryStore::new(1));
        let gauge = Arc::new(Gauge::default());
        let source = Arc::new(
            FakeAdapter::returning("slow", vec![])
                .with_delay(Duration::from_secs(120))
                .with_gauge(gauge.clone()),
        );
        let scheduler = scheduler(source.clone(), store.clone());

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger(false).await }
        });
        time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.is_running());

        scheduler.trigger(true).await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(gauge.peak(), 1);
        assert_eq!(store.action_count().await, 2);
        assert!(!scheduler.is_running());
    }
}
