//! Multi-provider reconciliation
//!
//! Folds priority-ordered partial records into one consolidated record per
//! (entity, year). For each field the first provider whose value passes the
//! validity predicate wins. Every provider-supplied value remembers its source,
//! which lets a repeat run merge into the stored record without letting a
//! lower-priority provider displace a higher-priority value, and without a
//! null ever erasing stored data.

pub mod derived;
pub mod fields;

use crate::providers::types::{PartialRecord, ProviderId};
use chrono::{DateTime, Utc};
use fields::{Field, FinancialFields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunables for the validity predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOptions {
    /// Large-magnitude fields at or below this are treated as placeholders
    pub min_large_magnitude: f64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            min_large_magnitude: 1_000_000.0,
        }
    }
}

impl From<&crate::config::ReconcileConfig> for ReconcileOptions {
    fn from(config: &crate::config::ReconcileConfig) -> Self {
        Self {
            min_large_magnitude: config.min_large_magnitude,
        }
    }
}

/// Whether a raw provider value counts as real data for `field`
pub fn is_valid(field: Field, value: f64, options: &ReconcileOptions) -> bool {
    if !value.is_finite() {
        return false;
    }
    if field.is_large_magnitude() {
        return value > options.min_large_magnitude;
    }
    true
}

/// One consolidated row per (entity, fiscal year)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecord {
    pub entity_id: String,
    pub year: i32,
    pub fields: FinancialFields,
    /// Provider behind each provider-supplied field; derived fields are absent
    pub sources: BTreeMap<Field, ProviderId>,
    /// Set by the store on write
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConsolidatedRecord {
    pub fn new(entity_id: &str, year: i32) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            year,
            fields: FinancialFields::default(),
            sources: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Contributing providers in priority order
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers: Vec<ProviderId> = self.sources.values().copied().collect();
        providers.sort();
        providers.dedup();
        providers
    }

    /// Provenance tag, e.g. `fundamentals+free_quote`
    pub fn provenance(&self) -> String {
        self.providers()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Fill every field missing here from `existing`.
    ///
    /// Used by stores as a last line of defence so a write that lands late
    /// never nulls out data written in the meantime.
    pub fn fill_missing_from(&mut self, existing: &ConsolidatedRecord) {
        for &field in Field::ALL {
            if self.fields.get(field).is_none() {
                if let Some(value) = existing.fields.get(field) {
                    self.fields.set(field, Some(value));
                    match existing.sources.get(&field) {
                        Some(&provider) => {
                            self.sources.insert(field, provider);
                        }
                        None => {
                            self.sources.remove(&field);
                        }
                    }
                }
            }
        }
    }

    /// Set a derived value unless a provider supplied the field directly.
    ///
    /// `None` keeps whatever is already there.
    pub fn set_derived(&mut self, field: Field, value: Option<f64>) {
        if self.sources.contains_key(&field) {
            return;
        }
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.fields.set(field, Some(v));
        }
    }
}

/// Reconcile provider records for one (entity, year) with no stored record
pub fn reconcile(
    entity_id: &str,
    year: i32,
    records: &[PartialRecord],
    options: &ReconcileOptions,
) -> ConsolidatedRecord {
    reconcile_with_existing(entity_id, year, records, None, options)
}

/// Reconcile provider records and merge them into the stored record.
///
/// Per field: the highest-priority valid provider value wins; the stored value
/// survives when no provider offers a valid value, or when it came from a
/// strictly higher-priority provider than the best new one. Derived metrics
/// are recomputed from the merged fields when no provider supplied them.
pub fn reconcile_with_existing(
    entity_id: &str,
    year: i32,
    records: &[PartialRecord],
    existing: Option<&ConsolidatedRecord>,
    options: &ReconcileOptions,
) -> ConsolidatedRecord {
    let mut ordered: Vec<&PartialRecord> = records.iter().filter(|r| r.year == year).collect();
    ordered.sort_by_key(|r| r.provider.priority());

    let mut result = ConsolidatedRecord::new(entity_id, year);

    for &field in Field::ALL {
        let candidate = ordered.iter().find_map(|r| {
            r.fields
                .get(field)
                .filter(|&v| is_valid(field, v, options))
                .map(|v| (v, r.provider))
        });

        let stored = existing.and_then(|e| {
            e.fields
                .get(field)
                .filter(|&v| is_valid(field, v, options))
                .map(|v| (v, e.sources.get(&field).copied()))
        });

        match (candidate, stored) {
            (Some((_, new_provider)), Some((old_value, Some(old_provider))))
                if old_provider.priority() < new_provider.priority() =>
            {
                result.fields.set(field, Some(old_value));
                result.sources.insert(field, old_provider);
            }
            (Some((value, provider)), _) => {
                result.fields.set(field, Some(value));
                result.sources.insert(field, provider);
            }
            (None, Some((old_value, old_provider))) => {
                result.fields.set(field, Some(old_value));
                if let Some(p) = old_provider {
                    result.sources.insert(field, p);
                }
            }
            (None, None) => {}
        }
    }

    apply_derived(&mut result);
    result
}

/// Compute single-year derived metrics in place
pub fn apply_derived(record: &mut ConsolidatedRecord) {
    let payout = derived::payout_ratio(&record.fields);
    record.set_derived(Field::PayoutRatio, payout);

    let roic = derived::return_on_invested_capital(&record.fields);
    record.set_derived(Field::ReturnOnInvestedCapital, roic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::Facet;
    use proptest::prelude::*;

    fn partial(provider: ProviderId, fields: FinancialFields) -> PartialRecord {
        PartialRecord::new(provider, Facet::HistoricalStatements, 2023, fields)
    }

    fn opts() -> ReconcileOptions {
        ReconcileOptions::default()
    }

    #[test]
    fn test_higher_priority_wins() {
        let records = vec![
            partial(ProviderId::FreeQuote, FinancialFields::default().with(Field::PeRatio, 30.0)),
            partial(ProviderId::Fundamentals, FinancialFields::default().with(Field::PeRatio, 25.0)),
        ];
        let r = reconcile("AAPL", 2023, &records, &opts());
        assert_eq!(r.fields.pe_ratio, Some(25.0));
        assert_eq!(r.sources[&Field::PeRatio], ProviderId::Fundamentals);
        assert_eq!(r.provenance(), "fundamentals");
    }

    #[test]
    fn test_invalid_value_falls_through() {
        let records = vec![
            partial(
                ProviderId::Fundamentals,
                FinancialFields::default()
                    .with(Field::MarketCap, 1.0)
                    .with(Field::Beta, f64::NAN),
            ),
            partial(
                ProviderId::ProMarket,
                FinancialFields::default()
                    .with(Field::MarketCap, 3.0e12)
                    .with(Field::Beta, 1.2),
            ),
        ];
        let r = reconcile("AAPL", 2023, &records, &opts());
        assert_eq!(r.fields.market_cap, Some(3.0e12));
        assert_eq!(r.fields.beta, Some(1.2));
        assert_eq!(r.provenance(), "pro_market");
    }

    #[test]
    fn test_provenance_accumulates_contributors() {
        let records = vec![
            partial(ProviderId::Fundamentals, FinancialFields::default().with(Field::Revenue, 10.0)),
            partial(ProviderId::Scraped, FinancialFields::default().with(Field::Price, 180.0)),
            partial(ProviderId::FreeQuote, FinancialFields::default().with(Field::Revenue, 11.0)),
        ];
        let r = reconcile("AAPL", 2023, &records, &opts());
        assert_eq!(r.provenance(), "fundamentals+scraped");
    }

    #[test]
    fn test_other_years_ignored() {
        let mut other = partial(ProviderId::Fundamentals, FinancialFields::default().with(Field::Eps, 1.0));
        other.year = 2022;
        let r = reconcile("AAPL", 2023, &[other], &opts());
        assert!(r.fields.is_empty());
        assert_eq!(r.provenance(), "");
    }

    #[test]
    fn test_existing_value_survives_null() {
        let first = reconcile(
            "AAPL",
            2023,
            &[partial(ProviderId::ProMarket, FinancialFields::default().with(Field::Revenue, 100.0))],
            &opts(),
        );
        let second = reconcile_with_existing(
            "AAPL",
            2023,
            &[partial(ProviderId::ProMarket, FinancialFields::default().with(Field::Eps, 2.0))],
            Some(&first),
            &opts(),
        );
        assert_eq!(second.fields.revenue, Some(100.0));
        assert_eq!(second.fields.eps, Some(2.0));
    }

    #[test]
    fn test_lower_priority_cannot_displace_stored_higher_priority() {
        let first = reconcile(
            "AAPL",
            2023,
            &[partial(ProviderId::Fundamentals, FinancialFields::default().with(Field::Revenue, 100.0))],
            &opts(),
        );
        let second = reconcile_with_existing(
            "AAPL",
            2023,
            &[partial(ProviderId::FreeQuote, FinancialFields::default().with(Field::Revenue, 90.0))],
            Some(&first),
            &opts(),
        );
        assert_eq!(second.fields.revenue, Some(100.0));
        assert_eq!(second.sources[&Field::Revenue], ProviderId::Fundamentals);
    }

    #[test]
    fn test_same_priority_refreshes_stored_value() {
        let first = reconcile(
            "AAPL",
            2023,
            &[partial(ProviderId::FreeQuote, FinancialFields::default().with(Field::Price, 100.0))],
            &opts(),
        );
        let second = reconcile_with_existing(
            "AAPL",
            2023,
            &[partial(ProviderId::FreeQuote, FinancialFields::default().with(Field::Price, 105.0))],
            Some(&first),
            &opts(),
        );
        assert_eq!(second.fields.price, Some(105.0));
    }

    #[test]
    fn test_derived_only_when_not_supplied() {
        let fields = FinancialFields {
            dividend_yield: Some(0.02),
            market_cap: Some(1.0e9),
            net_income: Some(5.0e7),
            ..Default::default()
        };
        let derived = reconcile("KO", 2023, &[partial(ProviderId::Fundamentals, fields.clone())], &opts());
        assert_eq!(derived.fields.payout_ratio, Some(0.4));
        assert!(!derived.sources.contains_key(&Field::PayoutRatio));

        let supplied = reconcile(
            "KO",
            2023,
            &[partial(ProviderId::Fundamentals, fields.with(Field::PayoutRatio, 0.7))],
            &opts(),
        );
        assert_eq!(supplied.fields.payout_ratio, Some(0.7));
    }

    #[test]
    fn test_fill_missing_from_keeps_stored_values() {
        let mut stored = ConsolidatedRecord::new("AAPL", 2023);
        stored.fields.revenue = Some(1.0);
        stored.sources.insert(Field::Revenue, ProviderId::Fundamentals);

        let mut incoming = ConsolidatedRecord::new("AAPL", 2023);
        incoming.fields.eps = Some(2.0);
        incoming.fill_missing_from(&stored);

        assert_eq!(incoming.fields.revenue, Some(1.0));
        assert_eq!(incoming.fields.eps, Some(2.0));
        assert_eq!(incoming.sources[&Field::Revenue], ProviderId::Fundamentals);
    }

    fn provider_strategy() -> impl Strategy<Value = ProviderId> {
        prop::sample::select(ProviderId::ALL.to_vec())
    }

    fn value_strategy() -> impl Strategy<Value = Option<f64>> {
        prop_oneof![
            Just(None),
            Just(Some(f64::NAN)),
            Just(Some(f64::INFINITY)),
            (-1.0e6..1.0e6f64).prop_map(Some),
            (1.0e7..1.0e13f64).prop_map(Some),
        ]
    }

    fn records_strategy() -> impl Strategy<Value = Vec<PartialRecord>> {
        prop::collection::vec(
            (provider_strategy(), value_strategy(), value_strategy(), value_strategy()),
            0..5,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(provider, cap, revenue, eps)| {
                    let mut fields = FinancialFields::default();
                    fields.market_cap = cap;
                    fields.revenue = revenue;
                    fields.eps = eps;
                    partial(provider, fields)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_priority_monotonicity(records in records_strategy()) {
            let options = opts();
            let result = reconcile("X", 2023, &records, &options);

            for field in [Field::MarketCap, Field::Revenue, Field::Eps] {
                let mut ordered: Vec<&PartialRecord> = records.iter().collect();
                ordered.sort_by_key(|r| r.provider.priority());
                let expected = ordered
                    .iter()
                    .find_map(|r| r.fields.get(field).filter(|&v| is_valid(field, v, &options)));
                prop_assert_eq!(result.fields.get(field), expected);
            }
        }

        #[test]
        fn prop_reconcile_is_idempotent(records in records_strategy()) {
            let options = opts();
            let once = reconcile("X", 2023, &records, &options);
            let twice = reconcile_with_existing("X", 2023, &records, Some(&once), &options);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_merge_never_nulls_existing(
            first in records_strategy(),
            second in records_strategy()
        ) {
            let options = opts();
            let stored = reconcile("X", 2023, &first, &options);
            let merged = reconcile_with_existing("X", 2023, &second, Some(&stored), &options);
            for (field, _) in stored.fields.populated() {
                prop_assert!(merged.fields.get(field).is_some(), "{} was erased", field);
            }
        }
    }
}
