//! Memory service facade
//!
//! Ties the store, embedder, scorer, ranker, lifecycle, and degradation
//! controller together behind one handle. All SQLite work runs on
//! blocking tasks; retrieval carries a wall-clock budget and transient
//! failures are retried with backoff before they count against the
//! degradation level.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::backup::{BackupConfig, BackupManager};
use crate::degradation::{DegradationConfig, DegradationController, DegradationLevel};
use crate::embedding::{
    create_embedder, Embedder, EmbeddingConfig, EmbeddingQueue, EmbeddingWorker,
};
use crate::error::{MemoryError, Result};
use crate::lifecycle::{LifecycleConfig, LifecycleManager, MaintenanceWorker};
use crate::retrieval::{RankerConfig, RetrievalRanker};
use crate::scoring::{ImportanceScorer, ScorerConfig};
use crate::store::{queries, Store, StoreConfig};
use crate::types::{
    CreateMemoryInput, MaintenanceOutcome, MemoryFilter, MemoryRecord, RecordId, RetrievalBasis,
    RetrievedMemory,
};

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub scorer: ScorerConfig,
    pub ranker: RankerConfig,
    pub lifecycle: LifecycleConfig,
    pub backup: BackupConfig,
    pub degradation: DegradationConfig,
    /// Wall-clock budget for one retrieval call
    pub retrieval_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            scorer: ScorerConfig::default(),
            ranker: RankerConfig::default(),
            lifecycle: LifecycleConfig::default(),
            backup: BackupConfig::default(),
            degradation: DegradationConfig::default(),
            retrieval_timeout_ms: 250,
        }
    }
}

impl ServiceConfig {
    pub fn retrieval_budget(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

/// Long-term memory service
#[derive(Clone)]
pub struct MemoryService {
    config: Arc<ServiceConfig>,
    store: Store,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<ImportanceScorer>,
    ranker: Arc<RetrievalRanker>,
    controller: Arc<DegradationController>,
    queue: EmbeddingQueue,
    lifecycle: LifecycleManager,
    backup: Arc<BackupManager>,
}

/// Subsystem health, as seen by one probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub store_ok: bool,
    pub embedding_ok: bool,
    pub level: DegradationLevel,
    pub record_count: usize,
}

impl MemoryService {
    /// Open the service. A corrupt database file is quarantined and the
    /// newest valid snapshot (or an empty store) takes its place.
    pub fn open(config: ServiceConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    /// Open with a caller-supplied embedder (a remote model, or a failing
    /// stub in tests). The embedder's dimensionality must agree with the
    /// store's.
    pub fn with_embedder(config: ServiceConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if embedder.dimensions() != config.store.dimensions {
            return Err(MemoryError::validation(
                "dimensions",
                format!(
                    "embedder produces {} dimensions but the store expects {}",
                    embedder.dimensions(),
                    config.store.dimensions
                ),
            ));
        }

        let backup = Arc::new(BackupManager::new(config.backup.clone()));
        let (store, recovered) = backup.open_with_recovery(config.store.clone())?;
        if recovered {
            tracing::warn!("store opened via corruption recovery");
        }

        let ranker = RetrievalRanker::new(config.ranker.clone())?;
        let lifecycle = LifecycleManager::new(store.clone(), config.lifecycle.clone());

        Ok(Self {
            store,
            embedder,
            scorer: Arc::new(ImportanceScorer::new(config.scorer.clone())),
            ranker: Arc::new(ranker),
            controller: Arc::new(DegradationController::new(config.degradation.clone())),
            queue: EmbeddingQueue::new(),
            lifecycle,
            backup,
            config: Arc::new(config),
        })
    }

    /// Spawn the embedding and maintenance workers. Records stuck in the
    /// embedding queue from a previous run are requeued first.
    pub fn spawn_workers(&self) -> Result<MaintenanceWorker> {
        let worker = EmbeddingWorker::new(
            self.embedder.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.config.embedding.batch_size,
        );
        let requeued = worker.requeue_pending(3)?;
        if requeued > 0 {
            tracing::info!(requeued, "requeued embeddings left from a previous run");
        }
        tokio::spawn(async move { worker.run().await });

        Ok(MaintenanceWorker::start(self.lifecycle.clone()))
    }

    pub fn level(&self) -> DegradationLevel {
        self.controller.level()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Store a new memory. The record is queryable by metadata as soon
    /// as this returns; its embedding lands asynchronously. Returns
    /// `None` when the current degradation level declined the write.
    pub async fn create_memory(&self, input: CreateMemoryInput) -> Result<Option<RecordId>> {
        let mut record = input.into_record()?;
        record.importance = self.scorer.score(record.kind, &record.attributes);

        if !self.controller.allows_creation(record.importance) {
            tracing::debug!(
                kind = record.kind.as_str(),
                importance = record.importance,
                level = %self.controller.level(),
                "memory creation declined while degraded"
            );
            return Ok(None);
        }

        let id = record.id.clone();
        let content = record.content.clone();
        let store = self.store.clone();
        let dims = store.dimensions();
        let model = self.config.embedding.model.clone();
        self.retry_transient("create", move || {
            let record = record.clone();
            let model = model.clone();
            store.with_transaction(move |conn| {
                queries::put_record(conn, &record, None, &model, dims)?;
                queries::enqueue_embedding(conn, &record.id)
            })
        })
        .await?;

        // A full or closed channel is fine: the queue table still holds
        // the row and the worker requeues it on the next start
        if let Err(e) = self.queue.queue(id.clone(), content).await {
            tracing::warn!(error = %e, record_id = %id, "embedding queue refused request");
        }

        Ok(Some(id))
    }

    /// Retrieve the memories most relevant to `query`.
    ///
    /// Full level ranks a semantic candidate superset by the composite
    /// score. Limited level serves a recency scan instead. Minimal level
    /// returns empty. A health failure at any level steps the level up
    /// and the call is retried once at the new level, so subsystem
    /// trouble shows up as thinner results, not errors. Structural
    /// errors surface unchanged.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        if query.trim().is_empty() {
            return Err(MemoryError::validation("query", "must not be empty"));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        match self.controller.level() {
            DegradationLevel::Minimal => Ok(Vec::new()),
            DegradationLevel::Limited => self.degraded_fallback(filter, limit).await,
            DegradationLevel::Full => {
                match self.semantic_retrieve(query, filter, limit).await {
                    Ok(results) => {
                        self.controller.record_success();
                        Ok(results)
                    }
                    Err(e) if !Self::health_related(&e) => Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "semantic retrieval failed, degrading");
                        let level = self.controller.record_failure("retrieve");
                        match level {
                            DegradationLevel::Minimal => Ok(Vec::new()),
                            _ => self.degraded_fallback(filter, limit).await,
                        }
                    }
                }
            }
        }
    }

    /// Failures that mean subsystem trouble rather than a broken request.
    /// These step the degradation level; structural errors (validation,
    /// dimension mismatch, corruption) surface to the caller unchanged.
    fn health_related(e: &MemoryError) -> bool {
        e.is_retryable() || matches!(e, MemoryError::Timeout { .. } | MemoryError::Io(_))
    }

    /// Recency-only retrieval for degraded levels. The fallback itself
    /// still touches the store; if that fails too, the level steps again
    /// and the caller gets an empty result rather than an error.
    async fn degraded_fallback(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        match self.recency_fallback(filter, limit).await {
            Ok(results) => Ok(results),
            Err(e) if Self::health_related(&e) => {
                tracing::warn!(error = %e, "recency fallback failed, degrading further");
                self.controller.record_failure("retrieve");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn semantic_retrieve(
        &self,
        query: &str,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        let budget = self.config.retrieval_budget();
        let candidate_limit = self.ranker.config().candidate_limit(limit);
        let max_attempts = self.controller.config().max_transient_retries + 1;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let query = query.to_string();
            let filter = filter.clone();
            let store = self.store.clone();
            let embedder = self.embedder.clone();
            let ranker = self.ranker.clone();
            let task = spawn_blocking(move || -> Result<Vec<RetrievedMemory>> {
                let vector = embedder.embed(&query)?;
                let candidates = store.with_connection(|conn| {
                    queries::query_similar(
                        conn,
                        &vector,
                        &filter,
                        candidate_limit,
                        store.dimensions(),
                    )
                })?;
                Ok(ranker.rank(candidates, limit))
            });

            let outcome = match timeout(budget, task).await {
                Err(_) => Err(MemoryError::Timeout {
                    operation: "retrieve".to_string(),
                    budget_ms: budget.as_millis() as u64,
                }),
                Ok(Err(join)) => Err(MemoryError::Io(std::io::Error::other(join))),
                Ok(Ok(result)) => result,
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::debug!(error = %e, attempt, "transient retrieval failure, backing off");
                    self.backoff(attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn recency_fallback(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        let records = self.recent(filter, None, limit).await?;
        Ok(records
            .into_iter()
            .map(|record| RetrievedMemory {
                record,
                score: 0.0,
                basis: RetrievalBasis::Recency,
            })
            .collect())
    }

    pub async fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let id = id.to_string();
        let store = self.store.clone();
        Self::blocking(move || store.with_connection(|conn| queries::get_record(conn, &id))).await
    }

    /// Delete one memory. Deleting an absent id is a no-op returning false.
    pub async fn delete_memory(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let store = self.store.clone();
        Self::blocking(move || store.with_transaction(|conn| queries::delete_record(conn, &id)))
            .await
    }

    /// Delete every memory matching the filter, returning the count.
    pub async fn delete_memories(&self, filter: &MemoryFilter) -> Result<usize> {
        let filter = filter.clone();
        let store = self.store.clone();
        Self::blocking(move || store.with_transaction(|conn| queries::delete_many(conn, &filter)))
            .await
    }

    /// Most recent memories matching the filter, newest first.
    pub async fn recent(
        &self,
        filter: &MemoryFilter,
        since: Option<chrono::Duration>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let filter = filter.clone();
        let store = self.store.clone();
        Self::blocking(move || {
            store.with_connection(|conn| queries::get_recent(conn, &filter, since, limit))
        })
        .await
    }

    pub async fn count(&self) -> Result<usize> {
        let store = self.store.clone();
        Self::blocking(move || store.with_connection(queries::count_records)).await
    }

    /// Prune low-importance records; `threshold` overrides the configured
    /// value.
    pub async fn prune(&self, threshold: Option<f32>) -> MaintenanceOutcome {
        let lifecycle = self.lifecycle.clone();
        Self::maintenance("prune", move || match threshold {
            Some(t) => lifecycle.prune_below(t),
            None => lifecycle.prune(),
        })
        .await
    }

    /// Enforce the record cap; `max_records` overrides the configured value.
    pub async fn compact(&self, max_records: Option<usize>) -> MaintenanceOutcome {
        let lifecycle = self.lifecycle.clone();
        Self::maintenance("compact", move || match max_records {
            Some(cap) => lifecycle.compact_to(cap),
            None => lifecycle.compact(),
        })
        .await
    }

    pub async fn decay(&self) -> MaintenanceOutcome {
        let lifecycle = self.lifecycle.clone();
        Self::maintenance("decay", move || lifecycle.decay()).await
    }

    /// Snapshot the store. `affected` is the record count captured.
    pub async fn backup(&self) -> MaintenanceOutcome {
        let store = self.store.clone();
        let backup = self.backup.clone();
        Self::maintenance("backup", move || {
            let started = Instant::now();
            let count = store.with_connection(queries::count_records)?;
            backup.backup(&store)?;
            Ok(MaintenanceOutcome::new(
                count,
                started.elapsed().as_secs_f64() * 1000.0,
            ))
        })
        .await
    }

    /// Rebuild the store from the newest valid snapshot. `affected` is
    /// the record count after the restore. Restored records that never
    /// got a vector go straight back to the embedding queue.
    pub async fn restore(&self) -> MaintenanceOutcome {
        let store = self.store.clone();
        let backup = self.backup.clone();
        let queue = self.queue.clone();
        let max_retries = self.controller.config().max_transient_retries as i32;
        Self::maintenance("restore", move || {
            let started = Instant::now();
            let count = backup.restore(&store)?;

            let pending =
                store.with_connection(|conn| queries::pending_embeddings(conn, max_retries))?;
            for (id, content) in pending {
                queue.queue_blocking(id, content)?;
            }

            Ok(MaintenanceOutcome::new(
                count,
                started.elapsed().as_secs_f64() * 1000.0,
            ))
        })
        .await
    }

    /// Probe store and embedder health. A fully healthy probe resets the
    /// degradation level to Full.
    pub async fn health_check(&self) -> HealthReport {
        let store = self.store.clone();
        let embedder = self.embedder.clone();

        let probe = Self::blocking(move || {
            let store_ok = store.ping().is_ok();
            let record_count = if store_ok {
                store.with_connection(queries::count_records).unwrap_or(0)
            } else {
                0
            };
            let embedding_ok = embedder.embed("health probe").is_ok();
            Ok((store_ok, embedding_ok, record_count))
        })
        .await;

        let (store_ok, embedding_ok, record_count) = probe.unwrap_or((false, false, 0));
        if store_ok && embedding_ok && self.controller.level() != DegradationLevel::Full {
            self.controller.reset();
        }

        HealthReport {
            store_ok,
            embedding_ok,
            level: self.controller.level(),
            record_count,
        }
    }

    async fn maintenance<F>(operation: &str, f: F) -> MaintenanceOutcome
    where
        F: FnOnce() -> Result<MaintenanceOutcome> + Send + 'static,
    {
        let started = Instant::now();
        match Self::blocking(f).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, operation, "maintenance operation failed");
                MaintenanceOutcome::failed(started.elapsed().as_secs_f64() * 1000.0)
            }
        }
    }

    async fn blocking<F, T>(f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        spawn_blocking(f)
            .await
            .map_err(|join| MemoryError::Io(std::io::Error::other(join)))?
    }

    /// Run a blocking store operation, retrying transient failures with
    /// exponential backoff and jitter.
    async fn retry_transient<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.controller.config().max_transient_retries + 1;
        let f = Arc::new(f);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let f = f.clone();
            match Self::blocking(move || f()).await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::debug!(error = %e, operation, attempt, "transient failure, backing off");
                    self.backoff(attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let base = self.controller.config().backoff_base_ms;
        let delay = base.saturating_mul(1u64 << attempt.min(6));
        let jitter = rand::thread_rng().gen_range(0..=base.max(1));
        tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
    }
}
