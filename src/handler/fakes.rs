use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{error::Error, model::Position, provider::sources::Adapter};

/// Tracks how many fetches run at once across a group of adapters.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Behavior {
    Return(Vec<Position>),
    Fail,
    Panic,
}

pub struct FakeAdapter {
    name: String,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    gauge: Arc<Gauge>,
}

impl FakeAdapter {
    fn new(name: &str, behavior: Behavior) -> FakeAdapter {
        FakeAdapter {
            name: name.to_owned(),
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn returning(name: &str, positions: Vec<Position>) -> FakeAdapter {
        Self::new(name, Behavior::Return(positions))
    }

    pub fn failing(name: &str) -> FakeAdapter {
        Self::new(name, Behavior::Fail)
    }

    pub fn panicking(name: &str) -> FakeAdapter {
        Self::new(name, Behavior::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> FakeAdapter {
        self.delay = delay;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> FakeAdapter {
        self.gauge = gauge;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();

        match &self.behavior {
            Behavior::Return(positions) => Ok(positions.clone()),
            Behavior::Fail => Err(Error::SourceError {
                source_name: self.name.to_owned(),
                message: String::from("connection refused"),
            }),
            Behavior::Panic => panic!("{} exploded", self.name),
        }
    }
}
