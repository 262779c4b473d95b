//! Common provider types

use crate::reconcile::fields::FinancialFields;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External data source, declared in descending reconciliation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Specialized historical fundamentals provider
    Fundamentals,
    /// Professional market data provider
    ProMarket,
    /// Free quote provider
    FreeQuote,
    /// Scraped real-time fundamentals; the secondary provider
    Scraped,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Fundamentals,
        ProviderId::ProMarket,
        ProviderId::FreeQuote,
        ProviderId::Scraped,
    ];

    /// Lower rank wins during reconciliation
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Fundamentals => "fundamentals",
            ProviderId::ProMarket => "pro_market",
            ProviderId::FreeQuote => "free_quote",
            ProviderId::Scraped => "scraped",
        }
    }

    /// Whether this provider's data satisfies the secondary-provider facet
    pub fn is_secondary(self) -> bool {
        self == ProviderId::Scraped
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Category of data fetched for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    BasicProfile,
    HistoricalStatements,
    TtmUpdate,
    SecondaryProvider,
}

impl Facet {
    pub fn as_str(self) -> &'static str {
        match self {
            Facet::BasicProfile => "basic_profile",
            Facet::HistoricalStatements => "historical_statements",
            Facet::TtmUpdate => "ttm_update",
            Facet::SecondaryProvider => "secondary_provider",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's sparse output for one (entity, fiscal year)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub provider: ProviderId,
    pub facet: Facet,
    pub year: i32,
    pub fields: FinancialFields,
}

impl PartialRecord {
    pub fn new(provider: ProviderId, facet: Facet, year: i32, fields: FinancialFields) -> Self {
        Self {
            provider,
            facet,
            year,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_follows_declaration_order() {
        assert!(ProviderId::Fundamentals.priority() < ProviderId::ProMarket.priority());
        assert!(ProviderId::ProMarket.priority() < ProviderId::FreeQuote.priority());
        assert!(ProviderId::FreeQuote < ProviderId::Scraped);
    }

    #[test]
    fn test_provider_names() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
            assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", id));
        }
    }

    #[test]
    fn test_facet_serde_name() {
        assert_eq!(
            serde_json::to_string(&Facet::TtmUpdate).unwrap(),
            "\"ttm_update\""
        );
    }
}
