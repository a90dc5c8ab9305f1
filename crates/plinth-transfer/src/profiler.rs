//! Connection profiling: estimate current network throughput.
//!
//! A small timed probe runs once per session; afterwards the most recent
//! observed transfer throughput wins. The probe never blocks past a short
//! ceiling — on timeout it degrades to a conservative slow estimate
//! instead of failing.

use std::time::Duration;

use tokio::time::Instant;

use crate::source::ByteSource;

/// Throughput classification driving timeout tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    Slow,
    Medium,
    Fast,
}

impl ConnectionClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Medium => "medium",
            Self::Fast => "fast",
        }
    }
}

/// Minimum bytes/sec for the fast class (1 MiB/s).
const FAST_MIN_BPS: f64 = 1024.0 * 1024.0;
/// Minimum bytes/sec for the medium class (200 KiB/s).
const MEDIUM_MIN_BPS: f64 = 200.0 * 1024.0;
/// Assumed rate when a probe fails or times out (32 KiB/s).
const CONSERVATIVE_BPS: f64 = 32.0 * 1024.0;

/// Probe size: large enough to observe throughput, small enough to be
/// negligible against the full image.
const PROBE_BYTES: u64 = 16 * 1024;
/// Upper bound on probe duration.
const PROBE_CEILING: Duration = Duration::from_secs(3);

/// Classification plus the numeric throughput it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionEstimate {
    pub class: ConnectionClass,
    pub bytes_per_sec: f64,
}

impl ConnectionEstimate {
    /// Classify a raw throughput figure.
    #[must_use]
    pub fn classify(bytes_per_sec: f64) -> Self {
        let class = if bytes_per_sec >= FAST_MIN_BPS {
            ConnectionClass::Fast
        } else if bytes_per_sec >= MEDIUM_MIN_BPS {
            ConnectionClass::Medium
        } else {
            ConnectionClass::Slow
        };
        Self {
            class,
            bytes_per_sec,
        }
    }

    /// Estimate assumed when nothing can be measured.
    #[must_use]
    pub fn conservative() -> Self {
        Self::classify(CONSERVATIVE_BPS)
    }
}

/// Estimates throughput from a probe or from prior observed transfers.
#[derive(Debug, Default)]
pub struct ConnectionProfiler {
    last: Option<ConnectionEstimate>,
}

impl ConnectionProfiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an observed transfer rate back in; later estimates reuse it
    /// instead of probing again.
    pub fn record_observation(&mut self, bytes_per_sec: f64) {
        if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
            self.last = Some(ConnectionEstimate::classify(bytes_per_sec));
        }
    }

    #[must_use]
    pub fn last_estimate(&self) -> Option<ConnectionEstimate> {
        self.last
    }

    /// Current throughput estimate.
    ///
    /// Reuses the most recent observation when one exists; otherwise runs
    /// a timed range probe against `source`, bounded by a 3 s ceiling.
    /// Never fails: probe errors and timeouts yield a conservative slow
    /// estimate.
    pub async fn estimate<S: ByteSource>(&mut self, source: &S) -> ConnectionEstimate {
        if let Some(estimate) = self.last {
            return estimate;
        }

        let started = Instant::now();
        let probe = tokio::time::timeout(PROBE_CEILING, source.fetch_range(0, PROBE_BYTES)).await;
        match probe {
            Ok(Ok(bytes)) => {
                let elapsed = started.elapsed().as_secs_f64().max(1e-6);
                let estimate = ConnectionEstimate::classify(bytes.len() as f64 / elapsed);
                tracing::debug!(
                    class = estimate.class.as_str(),
                    bytes_per_sec = estimate.bytes_per_sec,
                    "Connection probe completed"
                );
                self.last = Some(estimate);
                estimate
            }
            Ok(Err(err)) => {
                tracing::warn!("Connection probe failed, assuming slow link: {}", err);
                ConnectionEstimate::conservative()
            }
            Err(_) => {
                tracing::warn!(
                    ceiling_ms = PROBE_CEILING.as_millis() as u64,
                    "Connection probe timed out, assuming slow link"
                );
                ConnectionEstimate::conservative()
            }
        }
    }
}
