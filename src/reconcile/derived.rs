//! Derived metrics: payout ratio, return on invested capital, growth rates

use super::fields::FinancialFields;

/// Length of the compound-growth window
pub const GROWTH_WINDOW_YEARS: i32 = 5;

/// Dividends paid relative to earnings.
///
/// `(dividend_yield * market_cap) / net_income`, falling back to
/// `eps * shares_outstanding` as the earnings figure when net income is not
/// available. A non-positive denominator yields `None`.
pub fn payout_ratio(f: &FinancialFields) -> Option<f64> {
    let dividends = f.dividend_yield? * f.market_cap?;

    let earnings = match f.net_income {
        Some(net_income) => net_income,
        None => f.eps? * f.shares_outstanding?,
    };

    ratio(dividends, earnings)
}

/// EBIT over invested capital.
///
/// EBIT falls back to `revenue * operating_margin`. Invested capital is
/// `total_assets - current_liabilities`, then `total_equity + total_debt`,
/// then `total_assets` alone.
pub fn return_on_invested_capital(f: &FinancialFields) -> Option<f64> {
    let ebit = f
        .ebit
        .or_else(|| Some(f.revenue? * f.operating_margin?))?;

    let invested = [
        f.total_assets
            .zip(f.current_liabilities)
            .map(|(assets, liabilities)| assets - liabilities),
        f.total_equity
            .zip(f.total_debt)
            .map(|(equity, debt)| equity + debt),
        f.total_assets,
    ]
    .into_iter()
    .flatten()
    .find(|v| v.is_finite() && *v > 0.0)?;

    ratio(ebit, invested)
}

/// Compound annual growth over `years`, aware of the sign of each endpoint.
///
/// - both positive: `(end/start)^(1/n) - 1`
/// - both negative: `-((|end|/|start|)^(1/n) - 1)`, shrinking losses grow
/// - negative to positive: `((end + |start|)/|start|)^(1/n) - 1`
/// - positive to negative: `-(((start + |end|)/start)^(1/n) - 1)`
///
/// A missing or zero endpoint yields `None`.
pub fn compound_growth(start: Option<f64>, end: Option<f64>, years: i32) -> Option<f64> {
    let (start, end) = (start?, end?);
    if years <= 0 || start == 0.0 || end == 0.0 || !start.is_finite() || !end.is_finite() {
        return None;
    }

    let exp = 1.0 / years as f64;
    let growth = match (start > 0.0, end > 0.0) {
        (true, true) => (end / start).powf(exp) - 1.0,
        (false, false) => -((end.abs() / start.abs()).powf(exp) - 1.0),
        (false, true) => ((end + start.abs()) / start.abs()).powf(exp) - 1.0,
        (true, false) => -(((start + end.abs()) / start).powf(exp) - 1.0),
    };

    growth.is_finite().then_some(growth)
}

/// Five-year compound growth
pub fn five_year_growth(start: Option<f64>, end: Option<f64>) -> Option<f64> {
    compound_growth(start, end, GROWTH_WINDOW_YEARS)
}

/// Single-period change relative to the prior period's magnitude
pub fn year_over_year(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    let (previous, current) = (previous?, current?);
    if previous == 0.0 {
        return None;
    }
    let growth = (current - previous) / previous.abs();
    growth.is_finite().then_some(growth)
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if !denominator.is_finite() || denominator <= 0.0 {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("expected a value");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_growth_both_positive() {
        // 100 -> 400 over five years
        close(five_year_growth(Some(100.0), Some(400.0)), 4f64.powf(0.2) - 1.0);
    }

    #[test]
    fn test_growth_shrinking_loss_is_positive() {
        let g = five_year_growth(Some(-100.0), Some(-25.0)).unwrap();
        close(Some(g), -(0.25f64.powf(0.2) - 1.0));
        assert!(g > 0.0);
    }

    #[test]
    fn test_growth_turnaround() {
        let g = five_year_growth(Some(-50.0), Some(200.0)).unwrap();
        close(Some(g), 5f64.powf(0.2) - 1.0);
        assert!(g > 0.0);
    }

    #[test]
    fn test_growth_deterioration() {
        let g = five_year_growth(Some(300.0), Some(-100.0)).unwrap();
        close(Some(g), -((400.0f64 / 300.0).powf(0.2) - 1.0));
        assert!(g < 0.0);
    }

    #[test]
    fn test_growth_requires_both_nonzero_endpoints() {
        assert_eq!(five_year_growth(Some(0.0), Some(100.0)), None);
        assert_eq!(five_year_growth(Some(100.0), Some(0.0)), None);
        assert_eq!(five_year_growth(None, Some(100.0)), None);
        assert_eq!(five_year_growth(Some(100.0), None), None);
    }

    #[test]
    fn test_year_over_year() {
        close(year_over_year(Some(200.0), Some(250.0)), 0.25);
        // Loss narrowing from -200 to -100 is an improvement
        close(year_over_year(Some(-200.0), Some(-100.0)), 0.5);
        assert_eq!(year_over_year(Some(0.0), Some(10.0)), None);
        assert_eq!(year_over_year(None, Some(10.0)), None);
    }

    #[test]
    fn test_payout_ratio_prefers_net_income() {
        let f = FinancialFields {
            dividend_yield: Some(0.02),
            market_cap: Some(1_000_000_000.0),
            net_income: Some(50_000_000.0),
            eps: Some(1.0),
            shares_outstanding: Some(1.0),
            ..Default::default()
        };
        close(payout_ratio(&f), 0.4);
    }

    #[test]
    fn test_payout_ratio_falls_back_to_eps() {
        let f = FinancialFields {
            dividend_yield: Some(0.02),
            market_cap: Some(1_000_000_000.0),
            eps: Some(2.0),
            shares_outstanding: Some(20_000_000.0),
            ..Default::default()
        };
        close(payout_ratio(&f), 0.5);
    }

    #[test]
    fn test_payout_ratio_non_positive_earnings() {
        let f = FinancialFields {
            dividend_yield: Some(0.02),
            market_cap: Some(1_000_000_000.0),
            net_income: Some(-5.0),
            ..Default::default()
        };
        assert_eq!(payout_ratio(&f), None);
    }

    #[test]
    fn test_roic_preferred_denominator() {
        let f = FinancialFields {
            ebit: Some(120.0),
            total_assets: Some(1_000.0),
            current_liabilities: Some(400.0),
            total_equity: Some(1.0),
            total_debt: Some(1.0),
            ..Default::default()
        };
        close(return_on_invested_capital(&f), 0.2);
    }

    #[test]
    fn test_roic_estimates_ebit_and_uses_equity_plus_debt() {
        let f = FinancialFields {
            revenue: Some(1_000.0),
            operating_margin: Some(0.15),
            total_equity: Some(500.0),
            total_debt: Some(250.0),
            ..Default::default()
        };
        close(return_on_invested_capital(&f), 0.2);
    }

    #[test]
    fn test_roic_total_assets_only() {
        let f = FinancialFields {
            ebit: Some(50.0),
            total_assets: Some(500.0),
            ..Default::default()
        };
        close(return_on_invested_capital(&f), 0.1);
    }

    #[test]
    fn test_roic_without_ebit() {
        let f = FinancialFields {
            total_assets: Some(500.0),
            ..Default::default()
        };
        assert_eq!(return_on_invested_capital(&f), None);
    }
}
