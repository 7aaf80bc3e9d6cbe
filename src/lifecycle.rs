//! Memory lifecycle: pruning, compaction, and importance decay
//!
//! Each batch of deletions runs in its own transaction, so a partially
//! completed pass leaves the store consistent and a retry picks up the
//! remainder.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::error::Result;
use crate::store::{queries, Store};
use crate::types::MaintenanceOutcome;

/// Optional importance decay applied on each maintenance pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayPolicy {
    pub enabled: bool,
    /// Days for importance to halve
    pub half_life_days: f32,
    /// Importance never decays below this
    pub floor: f32,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            half_life_days: 30.0,
            floor: 0.05,
        }
    }
}

/// Lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Records below this importance are pruned
    pub prune_threshold: f32,
    /// Compaction keeps at most this many records
    pub max_records: usize,
    /// Deletions per transaction
    pub batch_size: usize,
    /// Seconds between automatic maintenance passes
    pub maintenance_interval_secs: u64,
    pub decay: DecayPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 0.2,
            max_records: 10_000,
            batch_size: 200,
            maintenance_interval_secs: 3600,
            decay: DecayPolicy::default(),
        }
    }
}

/// Runs pruning, compaction, and decay against one store
#[derive(Clone)]
pub struct LifecycleManager {
    store: Store,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(store: Store, config: LifecycleConfig) -> Self {
        Self { store, config }
    }

    /// Delete records whose importance fell below the configured threshold
    /// or below.
    pub fn prune(&self) -> Result<MaintenanceOutcome> {
        self.prune_below(self.config.prune_threshold)
    }

    /// Prune with an explicit threshold, overriding the configured one.
    pub fn prune_below(&self, threshold: f32) -> Result<MaintenanceOutcome> {
        let started = Instant::now();
        let ids = self
            .store
            .with_connection(|conn| queries::ids_below_importance(conn, threshold))?;

        let deleted = self.delete_batched(&ids)?;
        let outcome = MaintenanceOutcome::new(deleted, elapsed_ms(started));
        tracing::info!(deleted, threshold, "prune pass complete");
        Ok(outcome)
    }

    /// Enforce the configured record cap, dropping the least important
    /// records first.
    pub fn compact(&self) -> Result<MaintenanceOutcome> {
        self.compact_to(self.config.max_records)
    }

    /// Compact to an explicit cap, overriding the configured one.
    pub fn compact_to(&self, max_records: usize) -> Result<MaintenanceOutcome> {
        let started = Instant::now();
        let ids = self
            .store
            .with_connection(|conn| queries::overflow_ids(conn, max_records))?;

        let deleted = self.delete_batched(&ids)?;
        let outcome = MaintenanceOutcome::new(deleted, elapsed_ms(started));
        tracing::info!(deleted, cap = max_records, "compact pass complete");
        Ok(outcome)
    }

    /// Decay importance toward the floor. A no-op unless the policy is enabled.
    pub fn decay(&self) -> Result<MaintenanceOutcome> {
        let started = Instant::now();
        if !self.config.decay.enabled {
            return Ok(MaintenanceOutcome::new(0, elapsed_ms(started)));
        }

        let interval_days =
            self.config.maintenance_interval_secs as f32 / 86_400.0;
        let factor = 0.5_f32.powf(interval_days / self.config.decay.half_life_days);
        let changed = self
            .store
            .with_connection(|conn| queries::decay_importance(conn, factor, self.config.decay.floor))?;

        let outcome = MaintenanceOutcome::new(changed, elapsed_ms(started));
        tracing::info!(changed, factor, "decay pass complete");
        Ok(outcome)
    }

    /// One full maintenance pass: decay first so freshly decayed records
    /// are eligible for this pass's prune, then enforce the cap.
    pub fn run_maintenance(&self) -> Result<MaintenanceOutcome> {
        let started = Instant::now();
        let decayed = self.decay()?;
        let pruned = self.prune()?;
        let compacted = self.compact()?;

        Ok(MaintenanceOutcome::new(
            decayed.affected + pruned.affected + compacted.affected,
            elapsed_ms(started),
        ))
    }

    fn delete_batched(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for batch in ids.chunks(self.config.batch_size.max(1)) {
            deleted += self
                .store
                .with_transaction(|conn| queries::delete_ids(conn, batch))?;
        }
        Ok(deleted)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Commands for the maintenance worker
#[derive(Debug)]
pub enum MaintenanceCommand {
    /// Run a maintenance pass now
    Trigger,
    /// Stop the worker
    Stop,
}

/// Background worker running maintenance on an interval
pub struct MaintenanceWorker {
    sender: mpsc::Sender<MaintenanceCommand>,
}

impl MaintenanceWorker {
    /// Start the worker
    pub fn start(manager: LifecycleManager) -> Self {
        let (sender, mut receiver) = mpsc::channel::<MaintenanceCommand>(16);
        let period = Duration::from_secs(manager.config.maintenance_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // First tick fires immediately; skip it
            ticker.tick().await;

            loop {
                tokio::select! {
                    Some(cmd) = receiver.recv() => {
                        match cmd {
                            MaintenanceCommand::Trigger => Self::run_pass(&manager).await,
                            MaintenanceCommand::Stop => break,
                        }
                    }
                    _ = ticker.tick() => {
                        Self::run_pass(&manager).await;
                    }
                }
            }

            tracing::info!("maintenance worker stopped");
        });

        Self { sender }
    }

    async fn run_pass(manager: &LifecycleManager) {
        let manager = manager.clone();
        let result =
            tokio::task::spawn_blocking(move || manager.run_maintenance()).await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    affected = outcome.affected,
                    duration_ms = outcome.duration_ms,
                    "maintenance pass finished"
                );
            }
            Ok(Err(e)) => tracing::error!(error = %e, "maintenance pass failed"),
            Err(e) => tracing::error!(error = %e, "maintenance task panicked"),
        }
    }

    /// Ask the worker to run a pass now
    pub async fn trigger(&self) -> bool {
        self.sender.send(MaintenanceCommand::Trigger).await.is_ok()
    }

    /// Ask the worker to stop
    pub async fn stop(&self) -> bool {
        self.sender.send(MaintenanceCommand::Stop).await.is_ok()
    }
}
