//! Endpoint statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of an endpoint's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Frames delivered by the kernel
    pub frames_received: u64,
    /// Bytes delivered by the kernel
    pub bytes_received: u64,
    /// Frames discarded as too short or not PPPoE
    pub frames_dropped: u64,
    /// Frames handed to the tunnel
    pub frames_forwarded: u64,
    /// Frames written back onto the wire
    pub frames_injected: u64,
    /// Bytes written back onto the wire
    pub bytes_injected: u64,
    /// Injection attempts that failed
    pub inject_errors: u64,
}

/// Thread-safe counters updated by the receive loop and injectors
#[derive(Debug, Default)]
pub struct StatsCounters {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_injected: AtomicU64,
    bytes_injected: AtomicU64,
    inject_errors: AtomicU64,
}

impl StatsCounters {
    pub fn record_received(&self, bytes: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_injected(&self, bytes: u64) {
        self.frames_injected.fetch_add(1, Ordering::Relaxed);
        self.bytes_injected.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_inject_error(&self) {
        self.inject_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> EndpointStats {
        EndpointStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_injected: self.frames_injected.load(Ordering::Relaxed),
            bytes_injected: self.bytes_injected.load(Ordering::Relaxed),
            inject_errors: self.inject_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = StatsCounters::default();
        counters.record_received(100);
        counters.record_received(60);
        counters.record_dropped();
        counters.record_forwarded();
        counters.record_injected(42);

        let stats = counters.snapshot();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.bytes_received, 160);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_forwarded, 1);
        assert_eq!(stats.frames_injected, 1);
        assert_eq!(stats.bytes_injected, 42);
        assert_eq!(stats.inject_errors, 0);
    }

    #[test]
    fn test_empty_snapshot() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot(), EndpointStats::default());
    }
}
