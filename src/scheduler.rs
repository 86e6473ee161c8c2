//! Background scheduler for periodic price ingestion.
//!
//! Every cycle fetches each tracked instrument against the quoted currency and
//! stores the successful results. A failing instrument is logged and skipped, it
//! never aborts the rest of the cycle.

use anyhow::{Result, anyhow};
use chrono::Utc;
use futures::{StreamExt, stream};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::core::observation::{NewObservation, ObservationStore};
use crate::core::price::PriceProvider;

/// Outcome counts of one ingestion cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub saved: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
}

pub struct Scheduler {
    instruments: Vec<String>,
    quoted_currency: String,
    interval: Duration,
    concurrency: usize,
    provider: Arc<dyn PriceProvider>,
    store: Arc<dyn ObservationStore>,
}

impl Scheduler {
    pub fn new(
        instruments: Vec<String>,
        quoted_currency: &str,
        interval: Duration,
        provider: Arc<dyn PriceProvider>,
        store: Arc<dyn ObservationStore>,
    ) -> Self {
        Scheduler {
            instruments,
            quoted_currency: quoted_currency.to_string(),
            interval,
            concurrency: 1,
            provider,
            store,
        }
    }

    /// Allows up to `concurrency` fetches in flight. Results are still handled
    /// in instrument order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs a single pass over all tracked instruments.
    pub async fn run_cycle(&self) -> CycleReport {
        let provider = self.provider.as_ref();
        let quoted = self.quoted_currency.as_str();
        debug!(
            provider = provider.name(),
            instruments = self.instruments.len(),
            "Starting price update"
        );

        let mut fetches = stream::iter(self.instruments.iter().cloned())
            .map(|instrument: String| async move {
                let result = provider
                    .fetch_price(&instrument, quoted)
                    .await
                    .map(|price| (price, Utc::now()));
                (instrument, result)
            })
            .buffered(self.concurrency);

        let mut report = CycleReport::default();
        while let Some((instrument, result)) = fetches.next().await {
            let (price, observed_at) = match result {
                Ok(sample) => sample,
                Err(e) => {
                    error!(
                        instrument = %instrument,
                        provider = e.provider(),
                        error = %e,
                        "Failed to get price"
                    );
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let observation = NewObservation {
                instrument: instrument.clone(),
                quoted_instrument: self.quoted_currency.clone(),
                price,
                observed_at,
            };
            match self.store.save(observation).await {
                Ok(stored) => {
                    debug!(instrument = %instrument, price, id = stored.id, "Saved price");
                    report.saved += 1;
                }
                Err(e) => {
                    error!(
                        instrument = %instrument,
                        error = %e,
                        "Failed to save currency information to database"
                    );
                    report.store_failures += 1;
                }
            }
        }

        info!(
            saved = report.saved,
            fetch_failures = report.fetch_failures,
            store_failures = report.store_failures,
            "Price update finished"
        );
        report
    }

    /// Spawns the update loop: one cycle right away, then one per interval.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                provider = self.provider.name(),
                interval_secs = self.interval.as_secs(),
                "Price update scheduler started"
            );

            // First tick completes immediately
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    // Also fires when the handle is dropped
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            info!("Price update stopped");
        });

        SchedulerHandle { stop_tx, task }
    }
}

/// Control handle of a running scheduler loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests the loop to exit. A cycle already running is completed first.
    pub fn stop(&self) {
        if self.stop_tx.send(true).is_err() {
            debug!("Scheduler already stopped");
        }
    }

    /// Stops the loop and waits up to `timeout` for it to exit. On timeout the
    /// task is aborted.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.stop();
        let abort = self.task.abort_handle();

        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("Scheduler task failed: {e}")),
            Err(_) => {
                warn!("Timed out waiting for in-flight price update");
                abort.abort();
                Err(anyhow!(
                    "Scheduler did not stop within {}s",
                    timeout.as_secs()
                ))
            }
        }
    }
}
