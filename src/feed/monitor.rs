//! Metrics snapshot that follows the live feed and polls while it is down.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::{DashboardApiClient, Metrics};
use crate::feed::client::FeedClient;
use crate::feed::proto::FeedEvent;

/// Poll period used by the dashboard when the feed is not connected.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Keeps the latest [`Metrics`] from `kpi_update` events, falling back to
/// `GET /metrics` on every poll tick while the feed is not connected.
///
/// One fetch always happens at start, and another whenever the feed connects
/// or disconnects; that fetch also restarts the poll period. Failed fetches
/// keep the previous snapshot. The background task stops when the monitor is
/// dropped.
#[derive(Debug)]
pub struct MetricsMonitor {
    metrics: watch::Receiver<Option<Metrics>>,
    task: JoinHandle<()>,
}

impl MetricsMonitor {
    pub fn spawn(api: DashboardApiClient, feed: &FeedClient, poll_interval: Duration) -> Self {
        let (metrics_tx, metrics) = watch::channel(None);
        let task = tokio::spawn(monitor_loop(
            api,
            feed.watch_connected(),
            feed.watch_latest(),
            poll_interval.max(Duration::from_millis(1)),
            metrics_tx,
        ));
        Self { metrics, task }
    }

    pub fn current(&self) -> Option<Metrics> {
        self.metrics.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Metrics>> {
        self.metrics.clone()
    }
}

impl Drop for MetricsMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn monitor_loop(
    api: DashboardApiClient,
    mut connected: watch::Receiver<bool>,
    mut latest: watch::Receiver<Option<serde_json::Value>>,
    poll_interval: Duration,
    metrics_tx: watch::Sender<Option<Metrics>>,
) {
    poll_metrics(&api, &metrics_tx).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut feed_alive = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !*connected.borrow() {
                    poll_metrics(&api, &metrics_tx).await;
                }
            }
            changed = connected.changed(), if feed_alive => {
                if changed.is_err() {
                    feed_alive = false;
                    continue;
                }
                let up = *connected.borrow_and_update();
                debug!(event = "metrics_connectivity_changed", connected = up);
                poll_metrics(&api, &metrics_tx).await;
                ticker.reset();
            }
            changed = latest.changed(), if feed_alive => {
                if changed.is_err() {
                    feed_alive = false;
                    continue;
                }
                let event = latest.borrow_and_update().as_ref().map(FeedEvent::from_value);
                if let Some(FeedEvent::KpiUpdate { data }) = event {
                    debug!(event = "metrics_live_update");
                    metrics_tx.send_replace(Some(data));
                }
            }
        }
    }
}

async fn poll_metrics(api: &DashboardApiClient, metrics_tx: &watch::Sender<Option<Metrics>>) {
    match api.fetch_metrics().await {
        Ok(metrics) => {
            debug!(event = "metrics_polled");
            metrics_tx.send_replace(Some(metrics));
        }
        Err(err) => warn!(event = "metrics_poll_failed", error = %err),
    }
}
