//! Database service facade: acquisition lifecycle, readiness, caching,
//! and a serialized query worker behind one async API.
//!
//! The lifecycle runs as a background task driving the phase machine
//! `Uninitialized -> Acquiring -> Loading -> Ready | Failed`, published
//! on a watch channel so any number of callers can await readiness.
//! Queries are queued to a single blocking worker that owns the engine
//! connection; callers cancel by dropping their reply future, and the
//! worker skips jobs whose reply channel is already closed.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch, Mutex};

use plinth_query::cache::{CacheConfig, ResultCache};
use plinth_query::{build, QuerySpec};
use plinth_transfer::{event_channel, ByteSource, CancelFlag, TransferConfig, TransferManager};
use plinth_types::progress::TransferEvent;
use plinth_types::query::{FilterParams, ResultSet};
use plinth_types::{DatabaseImage, DbError};

use crate::executor;
use crate::host::EngineHandle;

/// Depth of the FIFO query queue feeding the blocking worker.
const QUERY_QUEUE_DEPTH: usize = 32;

/// Lifecycle phase of the database service.
#[derive(Debug, Clone)]
pub enum Phase {
    Uninitialized,
    Acquiring,
    Loading,
    Ready,
    Failed(DbError),
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Acquiring => "acquiring",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for the whole service.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub transfer: TransferConfig,
    pub cache: CacheConfig,
}

struct QueryJob {
    spec: QuerySpec,
    reply: oneshot::Sender<Result<ResultSet, DbError>>,
}

/// Async facade over acquisition, loading, caching, and query execution.
///
/// Constructed with [`start`](Self::start); usable immediately, though
/// queries return [`DbError::NotReady`] until the lifecycle reaches
/// [`Phase::Ready`].
pub struct Database<S> {
    source: Arc<S>,
    config: DatabaseConfig,
    phase_tx: Arc<watch::Sender<Phase>>,
    phase_rx: watch::Receiver<Phase>,
    events_tx: mpsc::Sender<TransferEvent>,
    cache: Mutex<ResultCache>,
    jobs: Arc<Mutex<Option<mpsc::Sender<QueryJob>>>>,
    cancel: Arc<Mutex<Option<CancelFlag>>>,
}

impl<S: ByteSource + 'static> Database<S> {
    /// Start the service and kick off acquisition in the background.
    ///
    /// Returns the service plus the receiver for transfer progress
    /// events; dropping the receiver discards events without affecting
    /// the transfer.
    #[must_use]
    pub fn start(source: S, config: DatabaseConfig) -> (Self, mpsc::Receiver<TransferEvent>) {
        let (phase_tx, phase_rx) = watch::channel(Phase::Uninitialized);
        let (events_tx, events_rx) = event_channel();
        let db = Self {
            source: Arc::new(source),
            cache: Mutex::new(ResultCache::new(config.cache)),
            config,
            phase_tx: Arc::new(phase_tx),
            phase_rx,
            events_tx,
            jobs: Arc::new(Mutex::new(None)),
            cancel: Arc::new(Mutex::new(None)),
        };
        db.spawn_lifecycle();
        (db, events_rx)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase_rx.borrow().clone()
    }

    /// Wait until the service is ready, up to `budget`.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle's own error if it reached
    /// [`Phase::Failed`], or [`DbError::NotReady`] if `budget` elapses
    /// first.
    pub async fn await_ready(&self, budget: Duration) -> Result<(), DbError> {
        let mut rx = self.phase_rx.clone();
        let wait = async move {
            loop {
                let phase = rx.borrow_and_update().clone();
                match phase {
                    Phase::Ready => return Ok(()),
                    Phase::Failed(err) => return Err(err),
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(DbError::not_ready("lifecycle task stopped"));
                }
            }
        };
        tokio::time::timeout(budget, wait)
            .await
            .map_err(|_| DbError::not_ready(format!("not ready within {}ms", budget.as_millis())))?
    }

    /// Run a search, serving from cache when possible.
    ///
    /// Misses are queued FIFO to the query worker; dropping the returned
    /// future cancels a still-queued query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotReady`] before the lifecycle reaches ready,
    /// the lifecycle's stored error after a failure, or
    /// [`DbError::QueryFailed`] from the engine.
    pub async fn search(&self, params: &FilterParams) -> Result<ResultSet, DbError> {
        let spec = build(params);

        if let Some(hit) = self.cache.lock().await.get(&spec.cache_key) {
            tracing::debug!(page = spec.page, filtered = spec.filtered, "Cache hit");
            return Ok(hit);
        }

        match self.phase() {
            Phase::Ready => {}
            Phase::Failed(err) => return Err(err),
            phase => {
                return Err(DbError::not_ready(format!(
                    "database is {phase}, not ready"
                )));
            }
        }

        let sender = self
            .jobs
            .lock()
            .await
            .clone()
            .ok_or_else(|| DbError::not_ready("query worker not running"))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        // Timestamp the computation at dispatch; a reply that raced a
        // fresher concurrent store must not replace it.
        let computed_at = Instant::now();
        sender
            .send(QueryJob {
                spec: spec.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| DbError::not_ready("query worker stopped"))?;
        let result = reply_rx
            .await
            .map_err(|_| DbError::query("query worker dropped the reply"))??;

        self.cache
            .lock()
            .await
            .put_at(spec.cache_key, result.clone(), spec.filtered, computed_at);
        Ok(result)
    }

    /// Cancel an in-flight acquisition; takes effect between chunks.
    pub async fn cancel(&self) {
        if let Some(flag) = self.cancel.lock().await.as_ref() {
            flag.cancel();
        }
    }

    /// Restart acquisition from scratch after a failure.
    ///
    /// There is no partial resume; the whole image is fetched again and
    /// the result cache is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotReady`] when the service is in any phase
    /// other than [`Phase::Failed`].
    pub async fn restart(&self) -> Result<(), DbError> {
        // Flip Failed -> Acquiring atomically so exactly one of any
        // number of concurrent restarts spawns a lifecycle.
        let won = self.phase_tx.send_if_modified(|phase| {
            if matches!(phase, Phase::Failed(_)) {
                *phase = Phase::Acquiring;
                true
            } else {
                false
            }
        });
        if !won {
            return Err(DbError::not_ready(format!(
                "restart is only valid from the failed phase, currently {}",
                self.phase()
            )));
        }
        tracing::info!("Restarting acquisition after failure");
        self.cache.lock().await.clear();
        self.spawn_lifecycle();
        Ok(())
    }

    fn spawn_lifecycle(&self) {
        tokio::spawn(run_lifecycle(
            Arc::clone(&self.source),
            self.config.transfer.clone(),
            Arc::clone(&self.phase_tx),
            self.events_tx.clone(),
            Arc::clone(&self.jobs),
            Arc::clone(&self.cancel),
        ));
    }
}

/// Drive one acquisition attempt from start to ready or failed.
async fn run_lifecycle<S: ByteSource + 'static>(
    source: Arc<S>,
    transfer: TransferConfig,
    phase: Arc<watch::Sender<Phase>>,
    events: mpsc::Sender<TransferEvent>,
    jobs: Arc<Mutex<Option<mpsc::Sender<QueryJob>>>>,
    cancel: Arc<Mutex<Option<CancelFlag>>>,
) {
    *jobs.lock().await = None;
    let _ = phase.send(Phase::Acquiring);

    let mut manager = TransferManager::new(source, transfer);
    *cancel.lock().await = Some(manager.cancel_flag());

    let image = match acquire_image(&mut manager, &events).await {
        Ok(image) => image,
        Err(err) => {
            let _ = phase.send(Phase::Failed(err));
            return;
        }
    };

    let _ = phase.send(Phase::Loading);
    let handle = match load_image(image).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!("Load failed: {}", err);
            let _ = phase.send(Phase::Failed(err));
            return;
        }
    };

    let (jobs_tx, jobs_rx) = mpsc::channel(QUERY_QUEUE_DEPTH);
    tokio::task::spawn_blocking(move || run_query_worker(&handle, jobs_rx));
    *jobs.lock().await = Some(jobs_tx);
    let _ = phase.send(Phase::Ready);
    tracing::info!("Database ready");
}

async fn acquire_image<S: ByteSource>(
    manager: &mut TransferManager<S>,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<DatabaseImage, DbError> {
    let manifest = manager.fetch_manifest().await?;
    manager.acquire(&manifest, events).await
}

async fn load_image(image: DatabaseImage) -> Result<EngineHandle, DbError> {
    match tokio::task::spawn_blocking(move || EngineHandle::load(&image)).await {
        Ok(result) => result,
        Err(join) => Err(DbError::load(format!("engine load task failed: {join}"))),
    }
}

/// Blocking worker loop owning the engine connection.
///
/// Jobs execute strictly in arrival order. A job whose reply channel is
/// already closed was cancelled while queued and is skipped without
/// touching the engine; a reply that cannot be delivered is discarded.
fn run_query_worker(handle: &EngineHandle, mut jobs: mpsc::Receiver<QueryJob>) {
    while let Some(job) = jobs.blocking_recv() {
        if job.reply.is_closed() {
            tracing::debug!(page = job.spec.page, "Skipping cancelled query");
            continue;
        }
        let result = executor::execute(handle, &job.spec);
        let _ = job.reply.send(result);
    }
    tracing::debug!("Query worker stopped");
}
