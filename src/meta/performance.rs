use ndarray::Array1;
use ndarray_stats::QuantileExt;
use tracing::debug;

use super::meta_constants::{
    DRAWDOWN_METRIC, PLACEHOLDER_WIN_RATE, RETURN_METRIC, SHARPE_METRIC, VOLATILITY_METRIC,
    WIN_RATE_METRIC,
};
use super::types::{BacktestRunRecord, PerformanceStats};

/// Aggregate a group of backtest runs.
///
/// Sharpe, return and volatility are arithmetic means, `max_drawdown` is the
/// worst (most negative) drawdown. A run missing a metric is left out of
/// that metric only. Win rate falls back to a neutral placeholder unless at
/// least one run reports it. An empty group aggregates to all zeros.
pub fn aggregate<'a, I>(runs: I) -> PerformanceStats
where
    I: IntoIterator<Item = &'a BacktestRunRecord>,
{
    let runs: Vec<&BacktestRunRecord> = runs.into_iter().collect();
    if runs.is_empty() {
        return PerformanceStats::default();
    }

    let sharpes = metric_column(&runs, SHARPE_METRIC);
    let returns = metric_column(&runs, RETURN_METRIC);
    let vols = metric_column(&runs, VOLATILITY_METRIC);
    let drawdowns = metric_column(&runs, DRAWDOWN_METRIC);
    let win_rates = metric_column(&runs, WIN_RATE_METRIC);
    let win_rate_measured = !win_rates.is_empty();

    PerformanceStats {
        sharpe: mean(&sharpes),
        cumulative_return: mean(&returns),
        volatility: mean(&vols),
        max_drawdown: worst(&drawdowns),
        win_rate: if win_rate_measured { mean(&win_rates) } else { PLACEHOLDER_WIN_RATE },
        win_rate_measured,
        sample_size: runs.len(),
        run_ids: runs.iter().map(|run| run.run_id.clone()).collect(),
    }
}

fn metric_column(runs: &[&BacktestRunRecord], metric: &str) -> Array1<f64> {
    runs.iter()
        .filter_map(|run| {
            let value = run.metric(metric);
            if value.is_none() && metric != WIN_RATE_METRIC {
                debug!(run_id = %run.run_id, metric, "Metric missing, run skipped for this metric");
            }
            value
        })
        .collect()
}

fn mean(values: &Array1<f64>) -> f64 {
    values.mean().unwrap_or(0.0)
}

fn worst(values: &Array1<f64>) -> f64 {
    values.min().ok().copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn run(id: &str, metrics: &[(&str, f64)]) -> BacktestRunRecord {
        BacktestRunRecord {
            run_id: id.to_string(),
            strategy_id: "S1".to_string(),
            universe_id: None,
            config: BTreeMap::new(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    fn full(id: &str, sharpe: f64, ret: f64, vol: f64, dd: f64) -> BacktestRunRecord {
        run(
            id,
            &[
                (SHARPE_METRIC, sharpe),
                (RETURN_METRIC, ret),
                (VOLATILITY_METRIC, vol),
                (DRAWDOWN_METRIC, dd),
            ],
        )
    }

    #[test]
    fn empty_group_is_all_zeros() {
        let stats = aggregate(&Vec::<BacktestRunRecord>::new());
        assert_eq!(stats, PerformanceStats::default());
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.run_ids.is_empty());
    }

    #[test]
    fn means_and_worst_drawdown() {
        let runs = vec![
            full("a", 1.0, 0.10, 0.20, -0.05),
            full("b", 2.0, 0.30, 0.10, -0.25),
            full("c", 0.0, -0.10, 0.30, -0.10),
        ];
        let stats = aggregate(&runs);

        assert!((stats.sharpe - 1.0).abs() < 1e-12);
        assert!((stats.cumulative_return - 0.10).abs() < 1e-12);
        assert!((stats.volatility - 0.20).abs() < 1e-12);
        assert_eq!(stats.max_drawdown, -0.25);
        assert_eq!(stats.sample_size, 3);
        assert_eq!(stats.run_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn win_rate_is_placeholder_unless_supplied() {
        let runs = vec![full("a", 1.0, 0.1, 0.2, -0.1), full("b", 1.0, 0.1, 0.2, -0.1)];
        let stats = aggregate(&runs);
        assert_eq!(stats.win_rate, PLACEHOLDER_WIN_RATE);
        assert!(!stats.win_rate_measured);

        let measured = vec![run("a", &[(WIN_RATE_METRIC, 0.6)]), run("b", &[(WIN_RATE_METRIC, 0.4)])];
        let stats = aggregate(&measured);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
        assert!(stats.win_rate_measured);
    }

    #[test]
    fn missing_metrics_are_skipped_per_metric() {
        let runs = vec![
            full("a", 1.0, 0.2, 0.2, -0.1),
            run("b", &[(SHARPE_METRIC, 3.0)]),
            run("c", &[(SHARPE_METRIC, f64::NAN), (RETURN_METRIC, 0.4)]),
        ];
        let stats = aggregate(&runs);

        assert!((stats.sharpe - 2.0).abs() < 1e-12);
        assert!((stats.cumulative_return - 0.3).abs() < 1e-12);
        assert_eq!(stats.volatility, 0.2);
        assert_eq!(stats.max_drawdown, -0.1);
        assert_eq!(stats.sample_size, 3);
    }

    #[test]
    fn sample_size_and_drawdown_hold_for_any_group() {
        for n in 1..12usize {
            let runs: Vec<_> = (0..n)
                .map(|i| {
                    let x = i as f64;
                    full(&format!("r{}", i), x * 0.1, x * 0.01, 0.1 + x * 0.01, -0.01 * ((i * 7) % 5) as f64)
                })
                .collect();
            let stats = aggregate(&runs);
            let expected_dd = runs
                .iter()
                .map(|r| r.max_drawdown().unwrap())
                .fold(f64::INFINITY, f64::min);
            assert_eq!(stats.sample_size, n);
            assert_eq!(stats.max_drawdown, expected_dd);
        }
    }
}
