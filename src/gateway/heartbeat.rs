use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long a frame may wait for the transport to take it before the write
/// counts as failed.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Heartbeat timer. The first tick fires one full period after `start`;
/// a stream opens with `connected`, not a heartbeat.
pub fn heartbeat_timer(start: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Fallback queue poll. Producers also wake sessions directly, so this only
/// bounds latency when a wake-up is missed.
pub fn poll_timer(start: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
