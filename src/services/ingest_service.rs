//! Ingest Service
//!
//! The per-entity fetch-and-reconcile task. Fetches each planned facet from
//! every provider that serves it, reconciles the results per fiscal year,
//! computes growth across years, merges with what is stored and upserts.
//!
//! The task is idempotent: running it twice for the same entity converges on
//! the same stored records, so the scheduler can retry it freely.

use crate::db::FinancialsStore;
use crate::error::{AppError, ProviderError, Result};
use crate::progress::{EntityRecord, Phase};
use crate::providers::types::{Facet, PartialRecord, ProviderId};
use crate::reconcile::derived::{five_year_growth, year_over_year, GROWTH_WINDOW_YEARS};
use crate::reconcile::fields::GROWTH_SERIES;
use crate::reconcile::{reconcile_with_existing, ConsolidatedRecord};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What one successful entity task achieved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    /// Facets at least one provider answered
    pub facets: Vec<Facet>,
    /// Fiscal years written
    pub years_written: u32,
    /// Providers that returned data
    pub providers: Vec<ProviderId>,
}

/// Ingest service for business logic
pub struct IngestService;

impl IngestService {
    /// Decide which facets to fetch for an entity.
    ///
    /// Entities without history, and every entity while the pipeline is in
    /// its historical phase, get the profile and historical statements. The
    /// TTM facet is fetched once the pipeline is past the historical phase,
    /// or when there is nothing historical to do. The secondary provider is
    /// queried alongside TTM and whenever it has never contributed.
    pub fn plan_facets(entity: &EntityRecord, phase: Phase) -> Vec<Facet> {
        let mut facets = Vec::new();

        let historical = matches!(phase, Phase::Discovering | Phase::ProcessingHistorical)
            || !entity.facets.historical_statements;
        if historical {
            facets.push(Facet::BasicProfile);
            facets.push(Facet::HistoricalStatements);
        }

        let ttm = matches!(phase, Phase::ProcessingTtm | Phase::Completed) || !historical;
        if ttm {
            facets.push(Facet::TtmUpdate);
        }

        if ttm || !entity.facets.secondary_provider {
            facets.push(Facet::SecondaryProvider);
        }

        facets
    }

    /// Fetch, reconcile and persist one entity.
    ///
    /// Succeeds as soon as any primary facet (anything but the secondary
    /// provider) is satisfied, so an entity can complete while still lacking
    /// the facet its phase is after, e.g. history without a TTM update. The
    /// scheduler requeues such entities at the start of every cycle until the
    /// facet arrives or their error count runs out.
    ///
    /// Fails only when no primary facet could be satisfied by any provider,
    /// returning the first transient error seen (so the caller retries) or
    /// else the first permanent one. Malformed provider output is logged and
    /// ignored.
    pub async fn fetch_and_reconcile(
        state: &AppState,
        entity_id: &str,
        plan: &[Facet],
        cancel: &CancellationToken,
    ) -> Result<EntityOutcome> {
        debug!("IngestService::fetch_and_reconcile {} {:?}", entity_id, plan);

        let mut records: Vec<PartialRecord> = Vec::new();
        let mut satisfied: BTreeSet<Facet> = BTreeSet::new();
        let mut contributors: BTreeSet<ProviderId> = BTreeSet::new();
        let mut first_retryable: Option<AppError> = None;
        let mut first_permanent: Option<AppError> = None;

        for &facet in plan {
            for handle in state.providers.for_facet(facet) {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }

                match handle.fetch(entity_id, facet, cancel).await {
                    Ok(fetched) => {
                        satisfied.insert(facet);
                        if !fetched.is_empty() {
                            contributors.insert(handle.id());
                        }
                        records.extend(fetched);
                    }
                    Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                    Err(AppError::Provider(e @ ProviderError::Malformed { .. })) => {
                        warn!("{} {} for {} ignored: {}", handle.id(), facet, entity_id, e);
                    }
                    Err(e) => {
                        warn!("{} {} for {} failed: {}", handle.id(), facet, entity_id, e);
                        let slot = if e.is_retryable() {
                            &mut first_retryable
                        } else {
                            &mut first_permanent
                        };
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }
            }
        }

        let primary: Vec<Facet> = plan
            .iter()
            .copied()
            .filter(|f| *f != Facet::SecondaryProvider)
            .collect();
        if !primary.is_empty() && !primary.iter().any(|f| satisfied.contains(f)) {
            return Err(first_retryable.or(first_permanent).unwrap_or_else(|| {
                AppError::NotFound(format!("no provider serves {:?} for {}", primary, entity_id))
            }));
        }

        let consolidated = Self::consolidate(state, entity_id, &records)?;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        for record in &consolidated {
            state.store.upsert_consolidated(record)?;
        }

        debug!(
            "{}: {} years written from {:?}",
            entity_id,
            consolidated.len(),
            contributors
        );

        Ok(EntityOutcome {
            facets: satisfied.into_iter().collect(),
            years_written: consolidated.len() as u32,
            providers: contributors.into_iter().collect(),
        })
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    /// Reconcile every fiscal year present in `records` against storage
    fn consolidate(
        state: &AppState,
        entity_id: &str,
        records: &[PartialRecord],
    ) -> Result<Vec<ConsolidatedRecord>> {
        let years: BTreeSet<i32> = records.iter().map(|r| r.year).collect();
        if years.is_empty() {
            return Ok(Vec::new());
        }

        let options = state.reconcile_options();
        let mut history: BTreeMap<i32, ConsolidatedRecord> = state
            .store
            .load_entity_financials(entity_id)?
            .into_iter()
            .map(|r| (r.year, r))
            .collect();

        for &year in &years {
            let merged = reconcile_with_existing(entity_id, year, records, history.get(&year), &options);
            history.insert(year, merged);
        }

        let mut out = Vec::with_capacity(years.len());
        for &year in &years {
            let mut record = match history.get(&year) {
                Some(r) => r.clone(),
                None => continue,
            };
            Self::apply_growth(&mut record, &history);
            out.push(record);
        }
        Ok(out)
    }

    /// Year-over-year and five-year growth from neighbouring years
    fn apply_growth(record: &mut ConsolidatedRecord, history: &BTreeMap<i32, ConsolidatedRecord>) {
        let previous = history.get(&(record.year - 1));
        let window_start = history.get(&(record.year - GROWTH_WINDOW_YEARS));

        for &(base, yoy, five) in GROWTH_SERIES {
            let current = record.fields.get(base);

            let yoy_value = year_over_year(previous.and_then(|r| r.fields.get(base)), current);
            record.set_derived(yoy, yoy_value);

            let five_value = five_year_growth(window_start.and_then(|r| r.fields.get(base)), current);
            record.set_derived(five, five_value);
        }
    }
}
