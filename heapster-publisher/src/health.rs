use crate::state::EntityStore;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Counters updated after every batch, for debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    pub metrics_rx_total: u64,
    pub metrics_rx_recently: u64,
    pub containers_rx_recently: u64,
    pub containers_rx_max: u64,
    pub stats_rx_recently: u64,
    pub stats_rx_max: u64,
    pub stats_rx_total: u64,
}

impl CoreStats {
    pub fn record_batch(&mut self, metrics: usize, containers_touched: usize, samples_produced: usize) {
        let (metrics, containers, samples) = (metrics as u64, containers_touched as u64, samples_produced as u64);
        self.metrics_rx_recently = metrics;
        self.metrics_rx_total += metrics;
        self.containers_rx_recently = containers;
        self.containers_rx_max = self.containers_rx_max.max(containers);
        self.stats_rx_recently = samples;
        self.stats_rx_max = self.stats_rx_max.max(samples);
        self.stats_rx_total += samples;
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublisherHealth {
    pub uptime_seconds: u64,
    pub instance_id: String,
    pub containers_tracked: u32,
    pub memory_usage_mb: f32,
    pub core_stats: CoreStats,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    start_time: Instant,
    instance_id: Uuid,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn get_health(&self, store: &EntityStore) -> PublisherHealth {
        PublisherHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            instance_id: self.instance_id.to_string(),
            containers_tracked: store.container_count() as u32,
            memory_usage_mb: get_memory_usage_mb(),
            core_stats: store.stats(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return (kb as f32) / 1024.0;
            }
        }
    }

    // unknown platform
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_batch_tracks_recent_max_and_total() {
        let mut stats = CoreStats::default();
        stats.record_batch(10, 3, 2);
        stats.record_batch(4, 1, 1);
        assert_eq!(stats.metrics_rx_total, 14);
        assert_eq!(stats.metrics_rx_recently, 4);
        assert_eq!(stats.containers_rx_recently, 1);
        assert_eq!(stats.containers_rx_max, 3);
        assert_eq!(stats.stats_rx_max, 2);
        assert_eq!(stats.stats_rx_total, 3);
    }

    #[test]
    fn test_health_of_empty_store() {
        let tracker = HealthTracker::new();
        let health = tracker.get_health(&EntityStore::new());
        assert_eq!(health.containers_tracked, 0);
        assert_eq!(health.instance_id, tracker.instance_id().to_string());
        assert_eq!(health.core_stats, CoreStats::default());
    }
}
