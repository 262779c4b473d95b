//! Financial field catalogue
//!
//! Every consolidated metric is an independently nullable `f64`. The field
//! list is declared once; the macro derives the `Field` key enum and the sparse
//! `FinancialFields` record so reconciliation can fold over `Field::ALL`
//! instead of probing properties by name.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! financial_fields {
    ($( $(#[$doc:meta])* $field:ident => $variant:ident ),+ $(,)?) => {
        /// Key of one consolidated metric
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Field {
            $($variant),+
        }

        impl Field {
            pub const ALL: &'static [Field] = &[$(Field::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => stringify!($field)),+
                }
            }
        }

        /// Sparse set of financial metrics for one (entity, year)
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct FinancialFields {
            $(
                $(#[$doc])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<f64>,
            )+
        }

        impl FinancialFields {
            pub fn get(&self, field: Field) -> Option<f64> {
                match field {
                    $(Field::$variant => self.$field),+
                }
            }

            pub fn set(&mut self, field: Field, value: Option<f64>) {
                match field {
                    $(Field::$variant => self.$field = value),+
                }
            }
        }
    };
}

financial_fields! {
    // Valuation
    market_cap => MarketCap,
    enterprise_value => EnterpriseValue,
    pe_ratio => PeRatio,
    forward_pe => ForwardPe,
    peg_ratio => PegRatio,
    price_to_book => PriceToBook,
    price_to_sales => PriceToSales,
    ev_to_ebitda => EvToEbitda,
    ev_to_revenue => EvToRevenue,
    price_to_free_cash_flow => PriceToFreeCashFlow,

    // Profitability (fractions, 0.25 == 25%)
    gross_margin => GrossMargin,
    operating_margin => OperatingMargin,
    net_margin => NetMargin,
    ebitda_margin => EbitdaMargin,
    return_on_equity => ReturnOnEquity,
    return_on_assets => ReturnOnAssets,
    /// Derived when not supplied: EBIT / invested capital
    return_on_invested_capital => ReturnOnInvestedCapital,

    // Income statement
    revenue => Revenue,
    gross_profit => GrossProfit,
    operating_income => OperatingIncome,
    ebit => Ebit,
    ebitda => Ebitda,
    net_income => NetIncome,
    eps => Eps,
    diluted_eps => DilutedEps,
    interest_expense => InterestExpense,

    // Balance sheet
    total_assets => TotalAssets,
    total_liabilities => TotalLiabilities,
    current_assets => CurrentAssets,
    current_liabilities => CurrentLiabilities,
    total_equity => TotalEquity,
    total_debt => TotalDebt,
    cash_and_equivalents => CashAndEquivalents,
    book_value_per_share => BookValuePerShare,
    shares_outstanding => SharesOutstanding,
    current_ratio => CurrentRatio,
    debt_to_equity => DebtToEquity,

    // Cash flow
    operating_cash_flow => OperatingCashFlow,
    capital_expenditure => CapitalExpenditure,
    free_cash_flow => FreeCashFlow,

    // Dividends
    dividend_yield => DividendYield,
    dividend_per_share => DividendPerShare,
    /// Derived when not supplied: dividends paid / earnings
    payout_ratio => PayoutRatio,

    // Growth, year over year
    revenue_growth_yoy => RevenueGrowthYoy,
    net_income_growth_yoy => NetIncomeGrowthYoy,
    eps_growth_yoy => EpsGrowthYoy,
    free_cash_flow_growth_yoy => FreeCashFlowGrowthYoy,
    dividend_growth_yoy => DividendGrowthYoy,
    book_value_growth_yoy => BookValueGrowthYoy,

    // Growth, 5-year compound
    revenue_growth_5y => RevenueGrowth5y,
    net_income_growth_5y => NetIncomeGrowth5y,
    eps_growth_5y => EpsGrowth5y,
    free_cash_flow_growth_5y => FreeCashFlowGrowth5y,
    dividend_growth_5y => DividendGrowth5y,
    book_value_growth_5y => BookValueGrowth5y,

    // Market data
    price => Price,
    beta => Beta,
    fifty_two_week_high => FiftyTwoWeekHigh,
    fifty_two_week_low => FiftyTwoWeekLow,
    average_volume => AverageVolume,
}

/// Base metric and the growth fields computed from it
pub const GROWTH_SERIES: &[(Field, Field, Field)] = &[
    (Field::Revenue, Field::RevenueGrowthYoy, Field::RevenueGrowth5y),
    (Field::NetIncome, Field::NetIncomeGrowthYoy, Field::NetIncomeGrowth5y),
    (Field::Eps, Field::EpsGrowthYoy, Field::EpsGrowth5y),
    (Field::FreeCashFlow, Field::FreeCashFlowGrowthYoy, Field::FreeCashFlowGrowth5y),
    (Field::DividendPerShare, Field::DividendGrowthYoy, Field::DividendGrowth5y),
    (Field::BookValuePerShare, Field::BookValueGrowthYoy, Field::BookValueGrowth5y),
];

impl Field {
    /// Fields where tiny values are provider placeholders rather than data
    pub fn is_large_magnitude(self) -> bool {
        matches!(self, Field::MarketCap | Field::EnterpriseValue)
    }

    /// Fields the reconciler computes when no provider supplies them
    pub fn is_derived(self) -> bool {
        matches!(self, Field::PayoutRatio | Field::ReturnOnInvestedCapital) || self.is_growth()
    }

    pub fn is_growth(self) -> bool {
        GROWTH_SERIES
            .iter()
            .any(|&(_, yoy, five)| self == yoy || self == five)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| format!("unknown field: {}", s))
    }
}

// Serialized by `name()` so keys match the struct's JSON field names
impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl FinancialFields {
    /// Iterate populated fields
    pub fn populated(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        Field::ALL
            .iter()
            .filter_map(move |&f| self.get(f).map(|v| (f, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.populated().next().is_none()
    }

    /// Build from a loosely-typed JSON object.
    ///
    /// Unknown keys and non-numeric values are dropped; numeric validity is
    /// decided later by the reconciler.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut fields = Self::default();
        for (key, value) in map {
            if let (Ok(field), Some(number)) = (key.parse::<Field>(), value.as_f64()) {
                fields.set(field, Some(number));
            }
        }
        fields
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }
}
