// Snapshot aggregator - periodic fold of router counters and registry capture

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::registry::Registry;
use crate::resources;
use crate::router::RouterMetrics;
use crate::stats::Stats;

/// State shared between the aggregator task and the readers of its output
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Registry,
    router: Arc<RouterMetrics>,
    latest: Arc<ArcSwapOption<Stats>>,
    started: Instant,
}

impl Aggregator {
    pub fn new(
        registry: Registry,
        router: Arc<RouterMetrics>,
        latest: Arc<ArcSwapOption<Stats>>,
        started: Instant,
    ) -> Self {
        Self {
            registry,
            router,
            latest,
            started,
        }
    }

    /// Run one collection cycle and publish its snapshot
    ///
    /// Process statistics are captured first, then the router counters are
    /// folded, then the whole registry is walked. Readers of `latest` see the
    /// previous snapshot until the new one is stored.
    pub fn tick(&self) -> Arc<Stats> {
        resources::capture(&self.registry, self.started);
        self.router.aggregate();

        let stats = Arc::new(Stats::capture(&self.registry));
        self.latest.store(Some(Arc::clone(&stats)));

        tracing::debug!(
            counters = stats.counters.len(),
            gauges = stats.gauges.len(),
            histograms = stats.histograms.len(),
            "Metrics snapshot captured"
        );
        stats
    }

    /// Tick every `period` until `shutdown` flips to true or its sender is
    /// dropped
    ///
    /// The first tick fires one full period after start. A tick in progress
    /// always completes before shutdown is observed.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        tracing::info!(
            collection_time_ms = period.as_millis() as u64,
            "Metrics aggregator started"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Metrics aggregator stopped");
    }
}
