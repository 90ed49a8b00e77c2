use std::error::Error;
use std::time::Duration;

use resight_sdk::api::DashboardApiClient;
use resight_sdk::config::ApiContext;
use resight_sdk::feed::monitor::{MetricsMonitor, DEFAULT_POLL_INTERVAL};
use resight_sdk::feed::proto::ClientMessage;
use resight_sdk::feed::FeedClient;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let context = ApiContext::from_env()?;
    let watch_for = Duration::from_secs(120);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let api = DashboardApiClient::new(context.clone())?;
        let feed = FeedClient::spawn(&context, |message| {
            if let Some(kind) = message.get("type").and_then(|kind| kind.as_str()) {
                println!("feed type={kind}");
            }
        });
        let monitor = MetricsMonitor::spawn(api, &feed, DEFAULT_POLL_INTERVAL);

        let mut connected = feed.watch_connected();
        if connected.wait_for(|up| *up).await.is_ok() {
            feed.send(&ClientMessage::Ping {
                client_time_ms: None,
            });
        }

        let mut metrics = monitor.watch();
        let deadline = tokio::time::sleep(watch_for);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                changed = metrics.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(snapshot) = metrics.borrow_and_update().clone() {
                        println!(
                            "revenue={:.2} views={} clicks={} ctr={:.2}% connected={}",
                            snapshot.revenue,
                            snapshot.views,
                            snapshot.clicks,
                            snapshot.click_through_rate(),
                            feed.is_connected(),
                        );
                    }
                }
            }
        }

        drop(monitor);
        feed.close().await;
        Ok::<(), Box<dyn Error>>(())
    })
}
