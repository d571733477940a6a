//! Lock-free run statistics using atomic operations
//!
//! Shared across all workers without mutex contention; every counter is
//! monotonic for the lifetime of one run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters aggregated across all workers of one run
#[derive(Debug, Default)]
pub struct RunStats {
    pub total_attempts: AtomicU64,
    pub successes: AtomicU64,
    pub blocked: AtomicU64,
    pub failures: AtomicU64,
    pub active_workers: AtomicU64,
    pub start_time: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            total_attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            start_time: AtomicU64::new(now),
        }
    }

    /// Record a started attempt
    pub fn record_attempt(&self) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an attempt that extracted results
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an attempt stopped by block detection
    pub fn record_block(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an attempt that failed without being blocked
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment active workers
    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active workers
    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get attempt count
    pub fn attempt_count(&self) -> u64 {
        self.total_attempts.load(Ordering::Relaxed)
    }

    /// Get success count
    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Get active worker count
    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Get success rate over all attempts (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.total_attempts.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Get snapshot for serialization
    pub fn snapshot(&self) -> RunStatsSnapshot {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let start = self.start_time.load(Ordering::Relaxed);

        RunStatsSnapshot {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            elapsed_secs: now.saturating_sub(start),
        }
    }
}

/// Serializable snapshot of run stats
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatsSnapshot {
    pub total_attempts: u64,
    pub successes: u64,
    pub blocked: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub active_workers: u64,
    pub elapsed_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RunStats::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_success();
        stats.record_block();

        assert_eq!(stats.attempt_count(), 2);
        assert_eq!(stats.success_count(), 1);
        assert_eq!(stats.blocked.load(Ordering::Relaxed), 1);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_with_no_attempts() {
        let stats = RunStats::new();
        assert!((stats.success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_worker_gauge_balances() {
        let stats = RunStats::new();
        stats.worker_started();
        stats.worker_started();
        stats.worker_finished();
        assert_eq!(stats.active_workers(), 1);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let stats = RunStats::new();
        stats.record_attempt();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"totalAttempts\":1"));
        assert!(json.contains("\"activeWorkers\":0"));
    }
}
