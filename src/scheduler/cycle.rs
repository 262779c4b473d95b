//! One time-budgeted ingestion cycle
//!
//! A cycle loads the global phase, applies operator options, discovers the
//! universe when due, then claims and processes batches of eligible entities
//! until the budget or the queue runs out. Every state change is written back
//! before the next batch so an interrupted process resumes where it stopped.

use super::budget::{BatchLimits, BudgetTracker};
use super::phase::{behind_phase, discovery_due, next_phase, refresh_due};
use super::universe::{discover, normalize_ticker};
use crate::db::ProgressStore;
use crate::error::{ErrorResponse, Result};
use crate::executor::{ConcurrencyManager, RetryExecutor, RetryPolicy, TimeoutExecutor};
use crate::progress::{
    EntityRecord, EntityStatus, GlobalPhaseRecord, Phase, PriorityClass, ProgressFilter,
};
use crate::providers::types::Facet;
use crate::services::IngestService;
use crate::state::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Operator controls for a single cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleOptions {
    /// Entities to register (if new) and process ahead of everything else
    pub target_entities: Vec<String>,
    /// Re-fetch historical statements for every entity
    pub force_full_refresh: bool,
    /// Reset every entity and start over from discovery
    pub reset_all: bool,
}

/// What a cycle did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub run_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// (entity id, error) per failed entity
    pub failures: Vec<(String, ErrorResponse)>,
    pub elapsed_ms: u64,
    /// Phase at the end of the cycle
    pub phase: Phase,
    pub batches: usize,
}

/// Drives ingestion cycles against shared state
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run one cycle with the configured budget
    pub async fn run(&self, options: &CycleOptions) -> Result<CycleSummary> {
        self.run_cycle(self.state.config.scheduling.budget(), options).await
    }

    /// Run one cycle that returns before `budget` elapses
    pub async fn run_cycle(&self, budget: Duration, options: &CycleOptions) -> Result<CycleSummary> {
        let run_id = Uuid::new_v4().to_string();
        let scheduling = &self.state.config.scheduling;
        let mut tracker = BudgetTracker::start(budget, scheduling.safety_margin());

        info!("Cycle {} started with {}ms budget", run_id, budget.as_millis());

        let mut global = match self.state.store.load_global_phase() {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                error!("Cycle {} aborted, phase record unreadable: {}", run_id, e);
                return Err(e);
            }
        };

        self.apply_options(&mut global, options)?;
        self.discover_if_due(&mut global, &tracker).await?;

        let now = Utc::now();
        if refresh_due(&global, now) {
            info!("New day since last completed run, starting TTM refresh");
            global.phase = Phase::ProcessingTtm;
            self.requeue_completed()?;
        }

        self.reclaim_stale()?;
        self.requeue_behind_phase(global.phase)?;
        self.state.store.save_global_phase(&global)?;

        let mut summary = CycleSummary {
            run_id,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            elapsed_ms: 0,
            phase: global.phase,
            batches: 0,
        };

        self.process_batches(&mut tracker, &mut global, &mut summary).await?;

        let now = Utc::now();
        let progress = self.state.store.progress_summary(now)?;
        let previous = global.phase;
        global.phase = next_phase(previous, &progress);
        if global.phase != previous {
            info!("Phase {} -> {}", previous, global.phase);
            if global.phase == Phase::ProcessingTtm {
                self.requeue_completed()?;
            }
        }

        global.total_entities = progress.total;
        global.entities_with_history = progress.with_history;
        global.entities_updated_today = progress.updated_today;
        global.last_run_at = Some(now);
        self.state.store.save_global_phase(&global)?;

        summary.phase = global.phase;
        summary.elapsed_ms = tracker.elapsed().as_millis() as u64;

        info!(
            "Cycle {} finished: {} attempted, {} succeeded, {} failed in {} batches, {}ms, phase {}",
            summary.run_id,
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.batches,
            summary.elapsed_ms,
            summary.phase
        );

        Ok(summary)
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn apply_options(&self, global: &mut GlobalPhaseRecord, options: &CycleOptions) -> Result<()> {
        let store = &self.state.store;

        if options.reset_all {
            let reset = store.reset_entity_progress(None)?;
            *global = GlobalPhaseRecord::default();
            info!("Reset {} entities, restarting from discovery", reset);
        }

        let targets: Vec<String> = options
            .target_entities
            .iter()
            .filter_map(|t| normalize_ticker(t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !targets.is_empty() {
            store.register_entities(&targets, PriorityClass::Requested)?;
            let mut records = store.load_entity_progress(&ProgressFilter {
                entity_ids: Some(targets.clone()),
                ..Default::default()
            })?;
            for record in &mut records {
                record.request();
            }
            store.save_entities_progress(&records)?;
            info!("Requested {} target entities", records.len());
        }

        if options.force_full_refresh {
            let requeued = self.requeue_completed()?;
            if global.phase != Phase::Discovering {
                global.phase = Phase::ProcessingHistorical;
            }
            info!("Full refresh forced, {} entities requeued", requeued);
        }

        Ok(())
    }

    async fn discover_if_due(&self, global: &mut GlobalPhaseRecord, tracker: &BudgetTracker) -> Result<()> {
        let scheduling = &self.state.config.scheduling;
        let now = Utc::now();
        if !discovery_due(global, now, scheduling.discovery_interval()) {
            return Ok(());
        }

        let remaining = tracker.remaining();
        if remaining.is_zero() {
            warn!("No budget left for discovery, deferring to the next cycle");
            return Ok(());
        }

        // Listings share the batch deadline and never outlive the budget
        let deadline = remaining.min(scheduling.per_item_timeout());
        let tickers = discover(self.state.universe.as_ref(), &self.state.providers, deadline).await;
        let added = self
            .state
            .store
            .register_entities(&tickers, PriorityClass::Normal)?;
        info!("Discovered {} tickers, {} new", tickers.len(), added);

        global.discovered_at = Some(now);
        if global.phase == Phase::Discovering {
            global.phase = Phase::ProcessingHistorical;
        }
        Ok(())
    }

    fn requeue_completed(&self) -> Result<usize> {
        let mut completed = self
            .state
            .store
            .load_entity_progress(&ProgressFilter::with_status(EntityStatus::Completed))?;
        for record in &mut completed {
            record.requeue();
        }
        self.state.store.save_entities_progress(&completed)?;
        Ok(completed.len())
    }

    /// Requeue COMPLETED entities still missing what `phase` needs, such as a
    /// TTM update from before midnight or one that never arrived.
    fn requeue_behind_phase(&self, phase: Phase) -> Result<()> {
        let now = Utc::now();
        let mut behind = self
            .state
            .store
            .load_entity_progress(&ProgressFilter::with_status(EntityStatus::Completed))?;
        behind.retain_mut(|record| behind_phase(record, phase, now) && record.requeue());

        if !behind.is_empty() {
            info!("Requeued {} completed entities behind phase {}", behind.len(), phase);
            self.state.store.save_entities_progress(&behind)?;
        }
        Ok(())
    }

    fn reclaim_stale(&self) -> Result<()> {
        let now = Utc::now();
        let staleness = self.state.config.scheduling.staleness();
        let mut stale: Vec<EntityRecord> = self
            .state
            .store
            .load_entity_progress(&ProgressFilter::with_status(EntityStatus::Processing))?;
        stale.retain_mut(|record| record.reclaim_if_stale(now, staleness));

        if !stale.is_empty() {
            warn!("Reclaimed {} entities stuck in processing", stale.len());
            self.state.store.save_entities_progress(&stale)?;
        }
        Ok(())
    }

    async fn process_batches(
        &self,
        tracker: &mut BudgetTracker,
        global: &mut GlobalPhaseRecord,
        summary: &mut CycleSummary,
    ) -> Result<()> {
        let config = &self.state.config;
        let store = &self.state.store;
        let limits = BatchLimits::from(&config.scheduling);
        let concurrency = ConcurrencyManager::new(config.scheduling.max_concurrency);
        let timeout = TimeoutExecutor::new(config.scheduling.per_item_timeout());
        let retry = RetryExecutor::new(RetryPolicy::from(&config.retry));
        let state: &AppState = &self.state;

        // Each entity gets at most one attempt per cycle
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let size = tracker.next_batch_size(&limits);
            if size == 0 {
                debug!("Budget exhausted with {}ms remaining", tracker.remaining().as_millis());
                break;
            }

            let filter = ProgressFilter::eligible(
                !config.errors.exclude_errors,
                config.errors.error_ceiling,
                size + seen.len(),
            );
            let mut batch: Vec<EntityRecord> = store
                .load_entity_progress(&filter)?
                .into_iter()
                .filter(|e| !seen.contains(&e.entity_id))
                .take(size)
                .collect();
            if batch.is_empty() {
                debug!("No eligible entities left");
                break;
            }

            let now = Utc::now();
            for entity in &mut batch {
                entity.claim(now);
                seen.insert(entity.entity_id.clone());
            }
            store.save_entities_progress(&batch)?;

            summary.batches += 1;
            info!(
                "Batch {}: {} entities, {}ms remaining",
                summary.batches,
                batch.len(),
                tracker.remaining().as_millis()
            );

            let jobs: Vec<(String, Vec<Facet>)> = batch
                .iter()
                .map(|e| (e.entity_id.clone(), IngestService::plan_facets(e, global.phase)))
                .collect();

            let results = concurrency
                .execute_batch(jobs, |(entity_id, plan)| {
                    let (timeout, retry) = (&timeout, &retry);
                    async move {
                        timeout
                            .run(|cancel| async move {
                                retry
                                    .run(&entity_id, |_| {
                                        IngestService::fetch_and_reconcile(state, &entity_id, &plan, &cancel)
                                    })
                                    .await
                            })
                            .await
                    }
                })
                .await;

            let now = Utc::now();
            for (entity, result) in batch.iter_mut().zip(results) {
                summary.attempted += 1;
                match result {
                    Ok(outcome) => {
                        debug!(
                            "{} completed: {:?}, {} years",
                            entity.entity_id, outcome.facets, outcome.years_written
                        );
                        entity.complete(&outcome.facets, outcome.years_written, now);
                        summary.succeeded += 1;
                        global.cursor = Some(entity.entity_id.clone());
                    }
                    Err(e) => {
                        warn!("{} failed: {}", entity.entity_id, e);
                        entity.fail(&e.to_string(), config.errors.max_errors);
                        summary.failed += 1;
                        summary
                            .failures
                            .push((entity.entity_id.clone(), ErrorResponse::from(&e)));
                    }
                }
            }
            store.save_entities_progress(&batch)?;

            tracker.charge(batch.len(), limits.per_item_estimate);
        }

        Ok(())
    }
}
