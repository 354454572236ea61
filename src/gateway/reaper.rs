use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatcher::Dispatcher;

fn sweep_period(ttl: Duration) -> Duration {
    (ttl / 2).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Periodically drop queues that are empty, unattended and idle for `ttl`.
/// Queues holding a backlog are never touched. Stops on dispatcher shutdown.
pub fn spawn(dispatcher: Arc<Dispatcher>, ttl: Duration) -> JoinHandle<()> {
    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_period(ttl));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = dispatcher.registry().evict_idle(ttl, Instant::now());
                    if !evicted.is_empty() {
                        tracing::info!("evicted {} idle queue(s)", evicted.len());
                    }
                }
            }
        }
    })
}
