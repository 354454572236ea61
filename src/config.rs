use std::time::Duration;

use crate::gateway::heartbeat::{HEARTBEAT_INTERVAL, POLL_INTERVAL};

/// How concurrent sessions for the same recipient share its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Every open session pops from the shared queue.
    Shared,
    /// A newly opened session closes the older ones for that recipient.
    Exclusive,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub policy: SessionPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            poll_interval: POLL_INTERVAL,
            policy: SessionPolicy::Shared,
        }
    }
}

pub struct Config {
    pub port: u16,
    pub stream: StreamSettings,
    /// Enqueue logs a warning once a backlog grows past this.
    pub backlog_warn_threshold: usize,
    /// Empty CORS allow-list means permissive.
    pub allowed_origins: Vec<String>,
    /// Idle TTL for empty queues; `None` keeps every queue forever.
    pub queue_idle_ttl: Option<Duration>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let policy = match std::env::var("RELAY_SESSION_POLICY")
            .unwrap_or_else(|_| "shared".to_string())
            .to_lowercase()
            .as_str()
        {
            "exclusive" => SessionPolicy::Exclusive,
            _ => SessionPolicy::Shared,
        };

        let heartbeat_interval = env_parse::<u64>("RELAY_HEARTBEAT_INTERVAL_SECS")
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(HEARTBEAT_INTERVAL);
        let poll_interval = env_parse::<u64>("RELAY_POLL_INTERVAL_MS")
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(POLL_INTERVAL);

        let allowed_origins = std::env::var("RELAY_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let queue_idle_ttl = env_parse::<u64>("RELAY_QUEUE_IDLE_TTL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            port: env_parse("PORT").unwrap_or(8080),
            stream: StreamSettings {
                heartbeat_interval,
                poll_interval,
                policy,
            },
            backlog_warn_threshold: env_parse("RELAY_BACKLOG_WARN_THRESHOLD").unwrap_or(10),
            allowed_origins,
            queue_idle_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("PORT");
        std::env::remove_var("RELAY_HEARTBEAT_INTERVAL_SECS");
        std::env::remove_var("RELAY_POLL_INTERVAL_MS");
        std::env::remove_var("RELAY_BACKLOG_WARN_THRESHOLD");
        std::env::remove_var("RELAY_ALLOWED_ORIGINS");
        std::env::remove_var("RELAY_SESSION_POLICY");
        std::env::remove_var("RELAY_QUEUE_IDLE_TTL_SECS");
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.stream.poll_interval, Duration::from_millis(50));
        assert_eq!(config.stream.policy, SessionPolicy::Shared);
        assert_eq!(config.backlog_warn_threshold, 10);
        assert!(config.allowed_origins.is_empty());
        assert!(config.queue_idle_ttl.is_none());
    }

    #[test]
    #[serial]
    fn test_port_from_env() {
        clear_env();
        std::env::set_var("PORT", "9090");
        assert_eq!(Config::from_env().port, 9090);
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back_to_defaults() {
        clear_env();
        std::env::set_var("PORT", "not_a_number");
        std::env::set_var("RELAY_POLL_INTERVAL_MS", "fast");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stream.poll_interval, POLL_INTERVAL);
    }

    #[test]
    #[serial]
    fn test_intervals_from_env() {
        clear_env();
        std::env::set_var("RELAY_HEARTBEAT_INTERVAL_SECS", "5");
        std::env::set_var("RELAY_POLL_INTERVAL_MS", "20");
        let config = Config::from_env();
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.stream.poll_interval, Duration::from_millis(20));
    }

    #[test]
    #[serial]
    fn test_zero_intervals_are_clamped() {
        clear_env();
        std::env::set_var("RELAY_HEARTBEAT_INTERVAL_SECS", "0");
        std::env::set_var("RELAY_POLL_INTERVAL_MS", "0");
        let config = Config::from_env();
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.stream.poll_interval, Duration::from_millis(1));
    }

    #[test]
    #[serial]
    fn test_allowed_origins_list() {
        clear_env();
        std::env::set_var(
            "RELAY_ALLOWED_ORIGINS",
            "https://roomix.pw, http://localhost:3000,,",
        );
        let config = Config::from_env();
        assert_eq!(
            config.allowed_origins,
            vec!["https://roomix.pw", "http://localhost:3000"]
        );
    }

    #[test]
    #[serial]
    fn test_exclusive_policy() {
        clear_env();
        std::env::set_var("RELAY_SESSION_POLICY", "Exclusive");
        assert_eq!(Config::from_env().stream.policy, SessionPolicy::Exclusive);
    }

    #[test]
    #[serial]
    fn test_queue_ttl() {
        clear_env();
        std::env::set_var("RELAY_QUEUE_IDLE_TTL_SECS", "0");
        assert!(Config::from_env().queue_idle_ttl.is_none());
        std::env::set_var("RELAY_QUEUE_IDLE_TTL_SECS", "600");
        assert_eq!(
            Config::from_env().queue_idle_ttl,
            Some(Duration::from_secs(600))
        );
    }
}
