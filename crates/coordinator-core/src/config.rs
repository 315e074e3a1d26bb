//! Coordinator tuning knobs, loaded from the environment with sane defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a Worker's poll loop blocks on an empty input queue before
    /// calling `Worker::idle` and checking for a stop request again.
    pub poll_interval: Duration,
    /// Bounded capacity of every per-type worker input channel.
    pub channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(1.0),
            channel_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let poll_interval = std::env::var("COORDINATOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.poll_interval);
        let channel_capacity = std::env::var("COORDINATOR_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.channel_capacity);
        Self {
            poll_interval,
            channel_capacity,
        }
    }
}
