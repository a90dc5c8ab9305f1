//! Chunked transfer manager: acquire the database image described by a
//! manifest, with adaptive timeouts, retries, and progress events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::Instant;

use plinth_types::progress::{TimeoutTier, TransferEvent};
use plinth_types::{ChunkInfo, DatabaseImage, DbError, TransferManifest};

use crate::profiler::{ConnectionClass, ConnectionEstimate, ConnectionProfiler};
use crate::retry::{RetryPolicy, RetrySchedule, RetryState};
use crate::session::{SessionSummary, TransferSession};
use crate::source::{ByteSource, SourceError};

/// Nested timeout budgets: per-request by connection class, an overall
/// acquisition budget, and the outer emergency ceiling.
///
/// Ordering invariant: every per-request budget < `acquisition` <
/// `emergency`. Exceeding the acquisition budget escalates a warning
/// event; only the emergency ceiling is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTiers {
    pub fast: Duration,
    pub medium: Duration,
    pub slow: Duration,
    /// Expected upper bound for the whole acquisition.
    pub acquisition: Duration,
    /// Absolute ceiling on the whole acquisition.
    pub emergency: Duration,
}

impl Default for TimeoutTiers {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(10),
            medium: Duration::from_secs(30),
            slow: Duration::from_secs(90),
            acquisition: Duration::from_secs(180),
            emergency: Duration::from_secs(300),
        }
    }
}

impl TimeoutTiers {
    /// Per-request budget for an estimated connection class.
    #[must_use]
    pub fn request_budget(&self, class: ConnectionClass) -> Duration {
        match class {
            ConnectionClass::Fast => self.fast,
            ConnectionClass::Medium => self.medium,
            ConnectionClass::Slow => self.slow,
        }
    }

    #[must_use]
    pub fn tier_for(class: ConnectionClass) -> TimeoutTier {
        match class {
            ConnectionClass::Fast => TimeoutTier::Fast,
            ConnectionClass::Medium => TimeoutTier::Medium,
            ConnectionClass::Slow => TimeoutTier::Slow,
        }
    }
}

/// Tunables for one transfer manager.
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    pub retry: RetryPolicy,
    pub tiers: TimeoutTiers,
}

/// Cooperative cancellation handle; acquisition checks it between chunks,
/// never mid-chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Acquires the database image from a [`ByteSource`].
///
/// Owns the connection profiler so completed sessions seed the next
/// estimate. Progress is emitted as [`TransferEvent`] values on the
/// channel passed to [`acquire`](Self::acquire); a slow or absent
/// consumer drops events but never stalls the transfer.
pub struct TransferManager<S> {
    source: S,
    config: TransferConfig,
    profiler: ConnectionProfiler,
    cancel: CancelFlag,
}

impl<S: ByteSource> TransferManager<S> {
    #[must_use]
    pub fn new(source: S, config: TransferConfig) -> Self {
        Self {
            source,
            config,
            profiler: ConnectionProfiler::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for cancelling the acquisition between chunks.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Summary of the most recent completed session, if any.
    #[must_use]
    pub fn last_estimate(&self) -> Option<ConnectionEstimate> {
        self.profiler.last_estimate()
    }

    /// Fetch the manifest, retrying transient failures under the same
    /// backoff policy as chunk requests.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TransferFailed`] once the retry budget is spent.
    pub async fn fetch_manifest(&self) -> Result<TransferManifest, DbError> {
        let mut schedule = RetrySchedule::new(self.config.retry);
        loop {
            match self.source.fetch_manifest().await {
                Ok(manifest) => return Ok(manifest),
                Err(err) => match schedule.record_failure() {
                    RetryState::Waiting { next_attempt, delay } => {
                        tracing::warn!(
                            next_attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Manifest fetch failed, will retry: {}",
                            err
                        );
                        tokio::time::sleep(delay).await;
                        schedule.begin_next();
                    }
                    _ => {
                        return Err(DbError::transfer(format!(
                            "manifest fetch exhausted retries: {err}"
                        )));
                    }
                },
            }
        }
    }

    /// Acquire the full image described by `manifest`.
    ///
    /// Chunks are fetched sequentially; each failed or timed-out request
    /// retries with exponential backoff up to the policy's attempt budget,
    /// and a chunk checksum mismatch counts as a retryable failure of that
    /// chunk only. The per-request timeout comes from the connection
    /// estimate and is refined as throughput is observed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TransferFailed`] on retry exhaustion, emergency
    /// ceiling breach, cancellation, or a received-size mismatch against
    /// the manifest.
    pub async fn acquire(
        &mut self,
        manifest: &TransferManifest,
        events: &mpsc::Sender<TransferEvent>,
    ) -> Result<DatabaseImage, DbError> {
        manifest.validate()?;

        let estimate = self.profiler.estimate(&self.source).await;
        let mut class = estimate.class;
        let started = Instant::now();
        let acquisition_deadline = started + self.config.tiers.acquisition;
        let deadline = started + self.config.tiers.emergency;
        let mut budget_warned = false;
        let mut session = TransferSession::start(
            manifest.total_bytes,
            self.config.tiers.request_budget(class),
        );

        tracing::info!(
            total_bytes = manifest.total_bytes,
            chunked = manifest.is_chunked(),
            class = class.as_str(),
            request_budget_ms = session.timeout_budget().as_millis() as u64,
            "Starting acquisition"
        );

        let chunks: Vec<ChunkInfo> = if manifest.is_chunked() {
            manifest.chunks.clone()
        } else {
            vec![ChunkInfo {
                offset: 0,
                length: manifest.total_bytes,
                checksum: None,
            }]
        };

        let mut image = Vec::with_capacity(manifest.total_bytes as usize);
        for chunk in &chunks {
            if self.cancel.is_cancelled() {
                return self
                    .fail(events, "acquisition cancelled by caller".to_string())
                    .await;
            }
            if !budget_warned && Instant::now() >= acquisition_deadline {
                budget_warned = true;
                self.warn_budget_exceeded(started, events).await;
            }
            let (bytes, attempt) = self
                .acquire_chunk(chunk, &mut session, class, deadline, events)
                .await?;
            let progress = session.record_progress(bytes.len() as u64, attempt);
            self.emit(events, TransferEvent::Progress(progress.clone()))
                .await;
            tracing::debug!(
                offset = chunk.offset,
                bytes_received = progress.bytes_received,
                total_bytes = progress.total_bytes,
                throughput_bps = progress.throughput_bytes_per_sec,
                "Chunk received"
            );
            image.extend_from_slice(&bytes);

            // Refine the estimate mid-transfer from observed throughput.
            let observed = ConnectionEstimate::classify(session.throughput_bps());
            if observed.class != class && observed.bytes_per_sec > 0.0 {
                tracing::debug!(
                    from = class.as_str(),
                    to = observed.class.as_str(),
                    "Connection estimate refined mid-transfer"
                );
                class = observed.class;
                session.set_timeout_budget(self.config.tiers.request_budget(class));
            }
        }

        if image.len() as u64 != manifest.total_bytes {
            return self
                .fail(
                    events,
                    format!(
                        "received {} bytes but manifest declares {}",
                        image.len(),
                        manifest.total_bytes
                    ),
                )
                .await;
        }

        let summary = session.summary();
        self.profiler.record_observation(summary.mean_throughput_bps);
        self.emit(
            events,
            TransferEvent::Completed {
                bytes_received: summary.bytes_received,
                elapsed_ms: summary.elapsed.as_millis() as u64,
            },
        )
        .await;
        log_summary(&summary);

        Ok(DatabaseImage::new(image))
    }

    /// Fetch one chunk, retrying under the backoff schedule.
    async fn acquire_chunk(
        &self,
        chunk: &ChunkInfo,
        session: &mut TransferSession,
        class: ConnectionClass,
        deadline: Instant,
        events: &mpsc::Sender<TransferEvent>,
    ) -> Result<(Vec<u8>, u32), DbError> {
        let mut schedule = RetrySchedule::new(self.config.retry);
        loop {
            let attempt = match schedule.attempt() {
                Some(n) => n,
                None => {
                    return self
                        .fail(events, format!("chunk at offset {} exhausted retries", chunk.offset))
                        .await;
                }
            };
            if Instant::now() >= deadline {
                return self
                    .fail(
                        events,
                        format!(
                            "emergency ceiling of {}s exceeded at offset {}",
                            self.config.tiers.emergency.as_secs(),
                            chunk.offset
                        ),
                    )
                    .await;
            }
            session.record_attempt();

            let budget = session.timeout_budget();
            let request = self.source.fetch_range(chunk.offset, chunk.length);
            let failure = match tokio::time::timeout(budget, request).await {
                Ok(Ok(bytes)) => match verify_chunk(chunk, &bytes) {
                    Ok(()) => return Ok((bytes, attempt)),
                    Err(detail) => detail,
                },
                Ok(Err(err)) => err.to_string(),
                Err(_) => {
                    let tier = TimeoutTiers::tier_for(class);
                    self.emit(events, TransferEvent::StallWarning { tier, attempt })
                        .await;
                    format!("request exceeded {}ms {tier} budget", budget.as_millis())
                }
            };

            match schedule.record_failure() {
                RetryState::Waiting { next_attempt, delay } => {
                    tracing::warn!(
                        offset = chunk.offset,
                        attempt,
                        next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Chunk request failed, will retry: {}",
                        failure
                    );
                    self.emit(
                        events,
                        TransferEvent::RetryScheduled {
                            attempt: next_attempt,
                            delay_ms: delay.as_millis() as u64,
                        },
                    )
                    .await;
                    tokio::time::sleep(delay).await;
                    schedule.begin_next();
                }
                _ => {
                    return self
                        .fail(
                            events,
                            format!(
                                "chunk at offset {} failed after {} attempts: {failure}",
                                chunk.offset, self.config.retry.max_attempts
                            ),
                        )
                        .await;
                }
            }
        }
    }

    /// Escalate once when the overall acquisition budget elapses; the
    /// transfer keeps going until the emergency ceiling.
    async fn warn_budget_exceeded(
        &self,
        started: Instant,
        events: &mpsc::Sender<TransferEvent>,
    ) {
        let budget_ms = self.config.tiers.acquisition.as_millis() as u64;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::warn!(
            budget_ms,
            elapsed_ms,
            emergency_ms = self.config.tiers.emergency.as_millis() as u64,
            "Acquisition budget exceeded, continuing under the emergency ceiling"
        );
        self.emit(
            events,
            TransferEvent::BudgetExceeded {
                budget_ms,
                elapsed_ms,
            },
        )
        .await;
    }

    /// Emit a terminal failure event and build the error.
    async fn fail<T>(
        &self,
        events: &mpsc::Sender<TransferEvent>,
        detail: String,
    ) -> Result<T, DbError> {
        tracing::error!("Acquisition failed: {}", detail);
        self.emit(
            events,
            TransferEvent::Failed {
                detail: detail.clone(),
            },
        )
        .await;
        Err(DbError::transfer(detail))
    }

    async fn emit(&self, events: &mpsc::Sender<TransferEvent>, event: TransferEvent) {
        // Events are side effects; a closed or full channel must not
        // change transfer control flow.
        let _ = events.try_send(event);
    }
}

fn log_summary(summary: &SessionSummary) {
    tracing::info!(
        bytes_received = summary.bytes_received,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        mean_throughput_bps = summary.mean_throughput_bps,
        attempts = summary.attempts,
        "Acquisition completed"
    );
}

/// Check received length and, when declared, the chunk's sha256 digest.
fn verify_chunk(chunk: &ChunkInfo, bytes: &[u8]) -> Result<(), String> {
    if bytes.len() as u64 != chunk.length {
        return Err(format!(
            "chunk at offset {} returned {} bytes, expected {}",
            chunk.offset,
            bytes.len(),
            chunk.length
        ));
    }
    if let Some(expected) = &chunk.checksum {
        let digest = format!("{:x}", Sha256::digest(bytes));
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(format!("chunk at offset {} checksum mismatch", chunk.offset));
        }
    }
    Ok(())
}

/// Progress events paired with a default-capacity channel.
#[must_use]
pub fn event_channel() -> (mpsc::Sender<TransferEvent>, mpsc::Receiver<TransferEvent>) {
    mpsc::channel(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use plinth_types::progress::ProgressEvent;
    use std::sync::atomic::AtomicU32;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn config() -> TransferConfig {
        TransferConfig {
            retry: fast_retry(),
            tiers: TimeoutTiers::default(),
        }
    }

    fn chunked_manifest(data: &[u8], chunk_len: u64, with_checksums: bool) -> TransferManifest {
        let mut chunks = Vec::new();
        let mut offset = 0u64;
        while offset < data.len() as u64 {
            let length = chunk_len.min(data.len() as u64 - offset);
            let checksum = with_checksums.then(|| {
                let slice = &data[offset as usize..(offset + length) as usize];
                format!("{:x}", Sha256::digest(slice))
            });
            chunks.push(ChunkInfo {
                offset,
                length,
                checksum,
            });
            offset += length;
        }
        TransferManifest {
            total_bytes: data.len() as u64,
            chunks,
        }
    }

    fn collect_events(rx: &mut mpsc::Receiver<TransferEvent>) -> Vec<TransferEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Source that fails the first `failures` requests for a given offset.
    #[derive(Debug)]
    struct FlakySource {
        inner: MemorySource,
        failures: u32,
        seen: AtomicU32,
        fail_offset: u64,
    }

    #[async_trait]
    impl ByteSource for FlakySource {
        async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
            self.inner.fetch_manifest().await
        }

        async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError> {
            if offset == self.fail_offset
                && self.seen.fetch_add(1, Ordering::SeqCst) < self.failures
            {
                return Err(SourceError::Http("connection reset".into()));
            }
            self.inner.fetch_range(offset, length).await
        }
    }

    #[tokio::test]
    async fn three_chunk_manifest_yields_full_image_and_three_progress_events() {
        let data: Vec<u8> = (0..12_288u32).map(|i| (i % 251) as u8).collect();
        let manifest = chunked_manifest(&data, 4_096, true);
        let source = MemorySource::new(data.clone(), manifest.clone());

        let mut manager = TransferManager::new(source, config());
        let (tx, mut rx) = event_channel();
        let image = manager.acquire(&manifest, &tx).await.unwrap();

        assert_eq!(image.len(), 12_288);
        assert_eq!(image.as_slice(), &data[..]);

        let events = collect_events(&mut rx);
        let progress: Vec<&ProgressEvent> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        let last = progress.last().unwrap();
        assert_eq!(last.bytes_received, last.total_bytes);
        assert!(matches!(
            events.last().unwrap(),
            TransferEvent::Completed { bytes_received: 12_288, .. }
        ));
    }

    #[tokio::test]
    async fn single_blob_manifest_transfers_in_one_request() {
        let data = vec![7u8; 9_000];
        let source = MemorySource::single(data.clone());
        let manifest = TransferManifest::single(9_000);

        let mut manager = TransferManager::new(source, config());
        let (tx, mut rx) = event_channel();
        let image = manager.acquire(&manifest, &tx).await.unwrap();
        assert_eq!(image.len(), 9_000);

        let events = collect_events(&mut rx);
        let progress_count = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Progress(_)))
            .count();
        assert_eq!(progress_count, 1);
    }

    #[tokio::test]
    async fn transient_chunk_failures_retry_then_succeed() {
        let data: Vec<u8> = (0..8_192u32).map(|i| (i % 199) as u8).collect();
        let manifest = chunked_manifest(&data, 4_096, false);
        let source = FlakySource {
            inner: MemorySource::new(data.clone(), manifest.clone()),
            failures: 2,
            seen: AtomicU32::new(0),
            fail_offset: 4_096,
        };

        let mut manager = TransferManager::new(source, config());
        let (tx, mut rx) = event_channel();
        let image = manager.acquire(&manifest, &tx).await.unwrap();
        assert_eq!(image.as_slice(), &data[..]);

        let events = collect_events(&mut rx);
        let retries = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::RetryScheduled { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn corrupted_checksum_exhausts_retries_with_transfer_failed() {
        let data = vec![1u8; 4_096];
        let mut manifest = chunked_manifest(&data, 4_096, true);
        // Deliberately corrupt the declared digest.
        manifest.chunks[0].checksum = Some("0".repeat(64));
        let source = MemorySource::new(data, manifest.clone());

        let mut manager = TransferManager::new(source, config());
        let (tx, mut rx) = event_channel();
        let err = manager.acquire(&manifest, &tx).await.unwrap_err();
        assert!(matches!(err, DbError::TransferFailed { .. }));
        assert!(err.detail().contains("checksum mismatch"), "got: {err}");

        let events = collect_events(&mut rx);
        let retries = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::RetryScheduled { .. }))
            .count();
        // max_attempts 3 => two scheduled retries before exhaustion.
        assert_eq!(retries, 2);
        assert!(matches!(events.last().unwrap(), TransferEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn size_mismatch_against_manifest_is_terminal() {
        // Manifest overstates the image; the final chunk read comes up short.
        let data = vec![2u8; 4_000];
        let manifest = TransferManifest::single(4_096);
        let source = MemorySource::new(data, manifest.clone());

        let mut manager = TransferManager::new(source, config());
        let (tx, _rx) = event_channel();
        let err = manager.acquire(&manifest, &tx).await.unwrap_err();
        assert!(matches!(err, DbError::TransferFailed { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_chunk() {
        let data = vec![3u8; 8_192];
        let manifest = chunked_manifest(&data, 4_096, false);
        let source = MemorySource::new(data, manifest.clone());

        let mut manager = TransferManager::new(source, config());
        manager.cancel_flag().cancel();
        let (tx, _rx) = event_channel();
        let err = manager.acquire(&manifest, &tx).await.unwrap_err();
        assert!(err.detail().contains("cancelled"), "got: {err}");
    }

    #[test]
    fn default_tiers_nest_strictly() {
        let tiers = TimeoutTiers::default();
        assert!(tiers.fast < tiers.acquisition);
        assert!(tiers.medium < tiers.acquisition);
        assert!(tiers.slow < tiers.acquisition);
        assert!(tiers.acquisition < tiers.emergency);
    }

    #[tokio::test]
    async fn exceeded_acquisition_budget_escalates_once_without_failing() {
        let data: Vec<u8> = (0..12_288u32).map(|i| (i % 251) as u8).collect();
        let manifest = chunked_manifest(&data, 4_096, false);
        let source = MemorySource::new(data, manifest.clone());

        let mut cfg = config();
        // Budget already spent; the emergency ceiling still has room.
        cfg.tiers.acquisition = Duration::ZERO;
        let mut manager = TransferManager::new(source, cfg);

        let (tx, mut rx) = event_channel();
        let image = manager.acquire(&manifest, &tx).await.unwrap();
        assert_eq!(image.len(), 12_288);

        let events = collect_events(&mut rx);
        let escalations = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::BudgetExceeded { .. }))
            .count();
        assert_eq!(escalations, 1);
        assert!(matches!(events.last().unwrap(), TransferEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn slow_estimate_selects_slow_request_budget() {
        let data = vec![4u8; 1_024 * 1_024];
        let manifest = chunked_manifest(&data, 256 * 1_024, false);
        let source = MemorySource::new(data.clone(), manifest.clone());

        let mut manager = TransferManager::new(source, config());
        // Seed the profiler with a 50 kB/s observation; no probe runs.
        manager.profiler.record_observation(50_000.0);
        assert_eq!(
            manager.config.tiers.request_budget(ConnectionClass::Slow),
            Duration::from_secs(90)
        );
        assert!(
            manager.config.tiers.emergency
                > manager.config.tiers.request_budget(ConnectionClass::Slow)
        );

        // The 1 MB image still completes well inside the emergency ceiling.
        let (tx, _rx) = event_channel();
        let image = manager.acquire(&manifest, &tx).await.unwrap();
        assert_eq!(image.len(), 1_024 * 1_024);
    }

    #[tokio::test]
    async fn completed_session_seeds_next_estimate() {
        let data = vec![5u8; 4_096];
        let manifest = TransferManifest::single(4_096);
        let source = MemorySource::new(data, manifest.clone());

        let mut manager = TransferManager::new(source, config());
        assert!(manager.last_estimate().is_none());
        let (tx, _rx) = event_channel();
        manager.acquire(&manifest, &tx).await.unwrap();
        assert!(manager.last_estimate().is_some());
    }

    #[tokio::test]
    async fn manifest_fetch_retries_then_fails() {
        #[derive(Debug)]
        struct NoManifest;

        #[async_trait]
        impl ByteSource for NoManifest {
            async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
                Err(SourceError::Http("503".into()))
            }
            async fn fetch_range(&self, _: u64, _: u64) -> Result<Vec<u8>, SourceError> {
                unreachable!("manifest never resolves")
            }
        }

        let manager = TransferManager::new(NoManifest, config());
        let err = manager.fetch_manifest().await.unwrap_err();
        assert!(matches!(err, DbError::TransferFailed { .. }));
        assert!(err.detail().contains("exhausted"), "got: {err}");
    }
}
