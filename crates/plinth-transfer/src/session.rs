//! Per-acquisition bookkeeping: bytes, attempts, throughput, ETA.

use std::time::Duration;

use tokio::time::Instant;

use plinth_types::progress::ProgressEvent;

/// One in-flight or completed acquisition attempt.
#[derive(Debug)]
pub struct TransferSession {
    started: Instant,
    total_bytes: u64,
    bytes_received: u64,
    /// Total request attempts made, including retries.
    attempts: u32,
    /// Per-request timeout budget currently in force.
    timeout_budget: Duration,
}

/// Summary of a finished session, fed back into the profiler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub bytes_received: u64,
    pub elapsed: Duration,
    pub mean_throughput_bps: f64,
    pub attempts: u32,
}

impl TransferSession {
    #[must_use]
    pub fn start(total_bytes: u64, timeout_budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            total_bytes,
            bytes_received: 0,
            attempts: 0,
            timeout_budget,
        }
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    #[must_use]
    pub fn timeout_budget(&self) -> Duration {
        self.timeout_budget
    }

    pub fn set_timeout_budget(&mut self, budget: Duration) {
        self.timeout_budget = budget;
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Mean throughput over the whole session so far.
    #[must_use]
    pub fn throughput_bps(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// Record `received` newly arrived bytes and produce the progress
    /// snapshot to emit, tagged with the attempt that delivered them.
    pub fn record_progress(&mut self, received: u64, attempt: u32) -> ProgressEvent {
        self.bytes_received += received;
        let elapsed = self.started.elapsed();
        let throughput = self.throughput_bps();
        let remaining = self.total_bytes.saturating_sub(self.bytes_received);
        let eta_ms = if throughput > 0.0 && remaining > 0 {
            Some((remaining as f64 / throughput * 1000.0) as u64)
        } else if remaining == 0 {
            Some(0)
        } else {
            None
        };
        ProgressEvent {
            bytes_received: self.bytes_received,
            total_bytes: self.total_bytes,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput_bytes_per_sec: throughput,
            eta_ms,
            attempt,
        }
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            bytes_received: self.bytes_received,
            elapsed: self.started.elapsed(),
            mean_throughput_bps: self.throughput_bps(),
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_accumulates_and_reports_totals() {
        let mut session = TransferSession::start(12_288, Duration::from_secs(10));
        let first = session.record_progress(4_096, 1);
        assert_eq!(first.bytes_received, 4_096);
        assert_eq!(first.total_bytes, 12_288);

        session.record_progress(4_096, 1);
        let last = session.record_progress(4_096, 1);
        assert_eq!(last.bytes_received, last.total_bytes);
        assert_eq!(last.eta_ms, Some(0));
    }

    #[tokio::test]
    async fn attempts_count_into_summary() {
        let mut session = TransferSession::start(100, Duration::from_secs(1));
        session.record_attempt();
        session.record_attempt();
        session.record_progress(100, 2);
        let summary = session.summary();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.bytes_received, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn throughput_reflects_elapsed_time() {
        let mut session = TransferSession::start(1_000_000, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(2)).await;
        let event = session.record_progress(100_000, 1);
        // 100 kB over 2 s = 50 kB/s.
        assert!((event.throughput_bytes_per_sec - 50_000.0).abs() < 1_000.0);
        assert!(event.eta_ms.unwrap() >= 17_000);
    }
}
