//! Risk and performance statistics derived from cached history.
//!
//! Pure calculation functions: no I/O, no provider calls. Callers batch the
//! cached rows per fund and derive everything in one pass.

use crate::core::model::{HoldingRecord, NavObservation};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashMap;

/// Observations per trading year; also the lookback window for risk stats.
const TRADING_DAYS: usize = 252;

/// How many top holdings contribute to the concentration figure.
const CONCENTRATION_TOP_N: usize = 10;

/// Risk statistics for one fund. Every field is `None` when the underlying
/// data is absent; an unknown value is never reported as zero.
#[derive(Debug, Clone, Default)]
pub struct RiskMetrics {
    /// Largest peak-to-trough decline, as a negative percentage.
    pub max_drawdown_pct: Option<f64>,
    /// Annualized standard deviation of daily growth, in percent.
    pub volatility_pct: Option<f64>,
    /// Combined weight of the ten largest holdings, in percent.
    pub top10_concentration_pct: Option<f64>,
}

/// Trailing returns over standard horizons, in percent. Horizons without
/// enough history are `None`.
#[derive(Debug, Clone, Default)]
pub struct TrailingReturns {
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
    pub return_1y: Option<f64>,
    pub return_3y: Option<f64>,
    pub return_ytd: Option<f64>,
}

/// Derives risk metrics for one fund from its cached history and holdings.
/// `history` may arrive in any order; the most recent 252 observations are
/// used for drawdown and volatility.
pub fn risk_metrics(history: &[NavObservation], holdings: &[HoldingRecord]) -> RiskMetrics {
    let mut sorted: Vec<&NavObservation> = history.iter().collect();
    sorted.sort_by_key(|o| o.nav_date);
    let window_start = sorted.len().saturating_sub(TRADING_DAYS);
    let window = &sorted[window_start..];

    RiskMetrics {
        max_drawdown_pct: max_drawdown(window),
        volatility_pct: annualized_volatility(window),
        top10_concentration_pct: concentration(holdings),
    }
}

/// Batched derivation: one metrics value per fund, computed from pre-fetched
/// rows so the caller never falls into per-fund lookups.
pub fn risk_metrics_batch(
    histories: &HashMap<String, Vec<NavObservation>>,
    holdings: &HashMap<String, Vec<HoldingRecord>>,
) -> HashMap<String, RiskMetrics> {
    static EMPTY: &[HoldingRecord] = &[];
    histories
        .iter()
        .map(|(code, history)| {
            let held = holdings.get(code).map(Vec::as_slice).unwrap_or(EMPTY);
            (code.clone(), risk_metrics(history, held))
        })
        .collect()
}

/// Running-peak drawdown over accumulated NAV, reported as a negative
/// percentage. Falls back to unit NAV where a row has no accumulated value
/// (some providers omit it for open funds).
fn max_drawdown(window: &[&NavObservation]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }

    let mut peak = f64::MIN;
    let mut max_dd = 0.0f64;
    for obs in window {
        let nav = effective_nav(obs);
        if nav <= 0.0 {
            continue;
        }
        if nav > peak {
            peak = nav;
        }
        let dd = (peak - nav) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
    }
    Some(-max_dd * 100.0)
}

/// Standard deviation of daily growth percentages, annualized by sqrt(252).
fn annualized_volatility(window: &[&NavObservation]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }

    let growths: Vec<f64> = window.iter().map(|o| o.daily_growth_pct).collect();
    let mean = growths.iter().sum::<f64>() / growths.len() as f64;
    let variance =
        growths.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / growths.len() as f64;
    Some(variance.sqrt() * (TRADING_DAYS as f64).sqrt())
}

/// Top-10 holding weight of the most recent reporting period. `None` when no
/// holdings are cached.
fn concentration(holdings: &[HoldingRecord]) -> Option<f64> {
    let latest_period = holdings.iter().map(|h| h.report_date).max()?;
    let mut weights: Vec<f64> = holdings
        .iter()
        .filter(|h| h.report_date == latest_period)
        .map(|h| h.weight_pct)
        .collect();
    weights.sort_by(|a, b| b.total_cmp(a));
    Some(weights.iter().take(CONCENTRATION_TOP_N).sum())
}

fn effective_nav(obs: &NavObservation) -> f64 {
    if obs.accumulated_nav > 0.0 {
        obs.accumulated_nav
    } else {
        obs.unit_nav
    }
}

/// Computes trailing returns from cached history, anchored at the most recent
/// observation. Used when ranking data is unavailable and returns must come
/// from local history instead.
pub fn trailing_returns(history: &[NavObservation]) -> TrailingReturns {
    let mut sorted: Vec<&NavObservation> = history
        .iter()
        .filter(|o| o.unit_nav > 0.0)
        .collect();
    sorted.sort_by_key(|o| o.nav_date);

    let Some(latest) = sorted.last() else {
        return TrailingReturns::default();
    };
    let latest_nav = latest.unit_nav;
    let latest_date = latest.nav_date;

    let year_start =
        NaiveDate::from_ymd_opt(latest_date.year(), 1, 1).unwrap_or(latest_date);

    TrailingReturns {
        return_1m: window_return(&sorted, latest_nav, latest_date - Duration::days(30)),
        return_3m: window_return(&sorted, latest_nav, latest_date - Duration::days(90)),
        return_6m: window_return(&sorted, latest_nav, latest_date - Duration::days(180)),
        return_1y: window_return(&sorted, latest_nav, latest_date - Duration::days(365)),
        return_3y: window_return(&sorted, latest_nav, latest_date - Duration::days(1095)),
        return_ytd: window_return(&sorted, latest_nav, year_start),
    }
}

/// Return since the first observation within a week after `start`; `None`
/// when no observation lands in that window.
fn window_return(sorted: &[&NavObservation], latest_nav: f64, start: NaiveDate) -> Option<f64> {
    let end = start + Duration::days(7);
    let base = sorted
        .iter()
        .find(|o| o.nav_date >= start && o.nav_date <= end)?;
    if base.unit_nav <= 0.0 {
        return None;
    }
    Some((latest_nav - base.unit_nav) / base.unit_nav * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(code: &str, date: &str, unit: f64, acc: f64, growth: f64) -> NavObservation {
        NavObservation {
            fund_code: code.to_string(),
            nav_date: date.parse().unwrap(),
            unit_nav: unit,
            accumulated_nav: acc,
            daily_growth_pct: growth,
            created_at: Utc::now(),
        }
    }

    fn series(navs: &[f64]) -> Vec<NavObservation> {
        let start: NaiveDate = "2025-01-01".parse().unwrap();
        navs.iter()
            .enumerate()
            .map(|(i, nav)| NavObservation {
                fund_code: "000001".to_string(),
                nav_date: start + Duration::days(i as i64),
                unit_nav: *nav,
                accumulated_nav: *nav,
                daily_growth_pct: 0.0,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_max_drawdown_peak_to_trough() {
        // Peak 100, trough 80: drawdown is -20%
        let history = series(&[100.0, 90.0, 95.0, 80.0, 85.0]);
        let metrics = risk_metrics(&history, &[]);
        let dd = metrics.max_drawdown_pct.unwrap();
        assert!((dd - (-20.0)).abs() < 1e-9, "expected -20, got {dd}");
    }

    #[test]
    fn test_max_drawdown_monotonic_series_is_zero() {
        let history = series(&[100.0, 101.0, 102.0, 105.0]);
        let dd = risk_metrics(&history, &[]).max_drawdown_pct.unwrap();
        assert_eq!(dd, 0.0);
    }

    #[test]
    fn test_drawdown_uses_unit_nav_when_accumulated_absent() {
        let mut history = series(&[100.0, 80.0]);
        for o in &mut history {
            o.accumulated_nav = 0.0;
        }
        let dd = risk_metrics(&history, &[]).max_drawdown_pct.unwrap();
        assert!((dd - (-20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_absent_on_short_history() {
        let history = series(&[100.0]);
        let metrics = risk_metrics(&history, &[]);
        assert!(metrics.max_drawdown_pct.is_none());
        assert!(metrics.volatility_pct.is_none());
    }

    #[test]
    fn test_volatility_annualization() {
        // Constant growth has zero deviation
        let mut history = series(&[100.0, 101.0, 102.0]);
        for o in &mut history {
            o.daily_growth_pct = 1.0;
        }
        let vol = risk_metrics(&history, &[]).volatility_pct.unwrap();
        assert!(vol.abs() < 1e-9);
    }

    fn holding(date: &str, code: &str, weight: f64) -> HoldingRecord {
        HoldingRecord {
            fund_code: "000001".to_string(),
            report_date: date.parse().unwrap(),
            security_code: code.to_string(),
            security_name: code.to_string(),
            weight_pct: weight,
            shares: 0.0,
            market_value: 0.0,
            security_category: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_concentration_uses_latest_period_top_ten() {
        let mut holdings = Vec::new();
        // Old period should be ignored entirely
        holdings.push(holding("2025-03-31", "OLD", 99.0));
        // Twelve positions in the latest period, weights 12..1
        for i in 0..12 {
            holdings.push(holding("2025-06-30", &format!("S{i}"), 12.0 - i as f64));
        }
        let conc = risk_metrics(&[], &holdings).top10_concentration_pct.unwrap();
        // Top ten of 12..1 is 12+11+...+3 = 75
        assert!((conc - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_concentration_absent_without_holdings() {
        assert!(risk_metrics(&[], &[]).top10_concentration_pct.is_none());
    }

    #[test]
    fn test_trailing_returns_one_year() {
        let start: NaiveDate = "2024-06-01".parse().unwrap();
        let mut history = Vec::new();
        for i in 0..400 {
            let nav = 1.0 + i as f64 * 0.001;
            let date = start + Duration::days(i);
            history.push(obs("000001", &date.to_string(), nav, nav, 0.1));
        }
        let returns = trailing_returns(&history);
        assert!(returns.return_1y.unwrap() > 0.0);
        assert!(returns.return_1m.unwrap() > 0.0);
        // 3y horizon has no data
        assert!(returns.return_3y.is_none());
    }

    #[test]
    fn test_batch_metrics_cover_all_funds() {
        let mut histories = HashMap::new();
        histories.insert("000001".to_string(), series(&[100.0, 90.0]));
        histories.insert("000002".to_string(), series(&[50.0, 55.0]));
        let result = risk_metrics_batch(&histories, &HashMap::new());
        assert_eq!(result.len(), 2);
        assert!(result["000001"].max_drawdown_pct.unwrap() < 0.0);
        assert_eq!(result["000002"].max_drawdown_pct.unwrap(), 0.0);
    }
}
