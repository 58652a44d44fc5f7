//! Server statistics
//!
//! Lock-free counters updated by connection tasks and read by whoever wants
//! a snapshot (shutdown logging, tests).

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the running server
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total connections accepted
    accepted: AtomicU64,
    /// Connections that completed a bridge
    completed: AtomicU64,
    /// Connections that failed before or during bridging
    failed: AtomicU64,
    /// Connections served a decoy response only (no bridge)
    decoy_only: AtomicU64,
    /// Currently active connections
    active: AtomicU64,
    /// Bytes forwarded client -> upstream
    bytes_up: AtomicU64,
    /// Bytes forwarded upstream -> client
    bytes_down: AtomicU64,
}

/// Point-in-time view of [`ServerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub completed: u64,
    pub failed: u64,
    pub decoy_only: u64,
    pub active: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

impl ServerStats {
    /// Create zeroed stats
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed bridge with its byte counts
    pub fn record_completed(&self, bytes_up: u64, bytes_down: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_up.fetch_add(bytes_up, Ordering::Relaxed);
        self.bytes_down.fetch_add(bytes_down, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a connection that failed anywhere in its pipeline
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a connection that ended after the decoy response
    pub fn record_decoy_only(&self) {
        self.decoy_only.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current active connection count
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            decoy_only: self.decoy_only.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_lifecycle() {
        let stats = ServerStats::new();
        assert_eq!(stats.active(), 0);

        stats.record_accepted();
        stats.record_accepted();
        assert_eq!(stats.active(), 2);

        stats.record_completed(100, 200);
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.active, 0);
        assert_eq!(snap.bytes_up, 100);
        assert_eq!(snap.bytes_down, 200);
    }

    #[test]
    fn test_stats_decoy_only() {
        let stats = ServerStats::new();
        stats.record_accepted();
        stats.record_decoy_only();

        let snap = stats.snapshot();
        assert_eq!(snap.decoy_only, 1);
        assert_eq!(snap.active, 0);
        assert_eq!(snap.completed, 0);
    }

    #[test]
    fn test_stats_byte_accumulation() {
        let stats = ServerStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_completed(10, 20);
        stats.record_completed(30, 40);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_up, 40);
        assert_eq!(snap.bytes_down, 60);
    }
}
