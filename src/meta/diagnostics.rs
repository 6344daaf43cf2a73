use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use super::config_value::ConfigValue;
use super::meta_constants::{
    ALL_REGIME_ID, CONFIDENCE_CONSISTENCY_WEIGHT, CONFIDENCE_EFFECT_WEIGHT,
    CONFIDENCE_FULL_SAMPLE_SIZE, CONFIDENCE_FULL_SHARPE_DELTA, CONFIDENCE_SAMPLE_WEIGHT,
    DEFAULT_MAX_DRAWDOWN_THRESHOLD, DEFAULT_MAX_VOLATILITY_THRESHOLD, DEFAULT_MIN_SHARPE_THRESHOLD,
    MIN_RUNS_PER_COMPARED_VALUE,
};
use super::performance::aggregate;
use super::store::MetaStore;
use super::types::{
    BacktestRunRecord, ConfigComparison, DiagnosticReport, HighRiskRun, PerformanceStats,
    RegimePerformance, UnderperformingRun,
};
use crate::error::{DomainError, MetaError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticThresholds {
    pub min_sharpe: f64,
    pub max_volatility: f64,
    pub max_drawdown: f64, // negative; runs below it are high-risk
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        Self {
            min_sharpe: DEFAULT_MIN_SHARPE_THRESHOLD,
            max_volatility: DEFAULT_MAX_VOLATILITY_THRESHOLD,
            max_drawdown: DEFAULT_MAX_DRAWDOWN_THRESHOLD,
        }
    }
}

/// Builds diagnostic reports from the backtest runs of a strategy
pub struct DiagnosticsEngine<S> {
    store: Arc<S>,
    thresholds: DiagnosticThresholds,
}

impl<S: MetaStore> DiagnosticsEngine<S> {
    pub fn new(store: Arc<S>, thresholds: DiagnosticThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Analyze every run of `strategy_id` that carries metrics.
    ///
    /// Fails with [`DomainError::InsufficientData`] when fewer than
    /// `min_sample_size` runs exist.
    #[instrument(name = "analyze_strategy", skip(self), fields(on_close = true))]
    pub async fn analyze_strategy(
        &self,
        strategy_id: &str,
        min_sample_size: usize,
    ) -> Result<DiagnosticReport, MetaError> {
        let runs = self.store.load_backtest_runs(strategy_id).await?;
        info!(strategy_id, run_count = runs.len(), "Loaded backtest runs");

        if runs.len() < min_sample_size {
            return Err(DomainError::InsufficientData {
                strategy_id: strategy_id.to_string(),
                available: runs.len(),
                required: min_sample_size,
            }
            .into());
        }

        Ok(build_report(strategy_id, &runs, &self.thresholds, Utc::now().date_naive()))
    }
}

/// Pure report construction over already-loaded runs
pub fn build_report(
    strategy_id: &str,
    runs: &[BacktestRunRecord],
    thresholds: &DiagnosticThresholds,
    analysis_date: NaiveDate,
) -> DiagnosticReport {
    let overall_performance = aggregate(runs);
    let regime_breakdown = analyze_by_regime(runs, &overall_performance);
    let config_comparisons = compare_configurations(runs);
    let underperforming_configs = identify_underperforming(runs, thresholds.min_sharpe);
    let high_risk_configs = identify_high_risk(runs, thresholds);

    info!(
        strategy_id,
        sharpe = overall_performance.sharpe,
        comparisons = config_comparisons.len(),
        underperforming = underperforming_configs.len(),
        high_risk = high_risk_configs.len(),
        "Diagnostic report built"
    );

    DiagnosticReport {
        strategy_id: strategy_id.to_string(),
        overall_performance,
        regime_breakdown,
        config_comparisons,
        underperforming_configs,
        high_risk_configs,
        total_runs: runs.len(),
        analysis_date,
    }
}

/// Run records carry no regime label, so every run falls in the single `ALL` regime.
fn analyze_by_regime(runs: &[BacktestRunRecord], overall: &PerformanceStats) -> Vec<RegimePerformance> {
    let stats = aggregate(runs);
    let relative_sharpe = stats.sharpe - overall.sharpe;
    vec![RegimePerformance {
        regime_id: ALL_REGIME_ID.to_string(),
        stats,
        relative_sharpe,
    }]
}

/// Compare the first two distinct values seen for every config key.
///
/// Keys are visited in sorted order. For each key the runs are grouped by
/// value in encounter order; the first value is the baseline and the second
/// the alternative, and both need at least two runs. Output is sorted by
/// `sharpe_delta`, best first.
pub fn compare_configurations(runs: &[BacktestRunRecord]) -> Vec<ConfigComparison> {
    let keys: BTreeSet<&str> = runs
        .iter()
        .flat_map(|run| run.config.keys().map(String::as_str))
        .collect();
    let keys: Vec<&str> = keys.into_iter().collect();

    // Keys are independent; collect keeps the sorted key order
    let mut comparisons: Vec<ConfigComparison> = keys
        .par_iter()
        .filter_map(|key| compare_key(key, runs))
        .collect();

    comparisons.sort_by(|a, b| b.sharpe_delta.total_cmp(&a.sharpe_delta));
    debug!(count = comparisons.len(), "Configuration comparisons computed");
    comparisons
}

fn compare_key(key: &str, runs: &[BacktestRunRecord]) -> Option<ConfigComparison> {
    let mut groups: Vec<(&ConfigValue, Vec<&BacktestRunRecord>)> = Vec::new();
    let mut index: HashMap<&ConfigValue, usize> = HashMap::new();

    for run in runs {
        let Some(value) = run.config.get(key) else {
            continue;
        };
        match index.get(value) {
            Some(&i) => groups[i].1.push(run),
            None => {
                index.insert(value, groups.len());
                groups.push((value, vec![run]));
            }
        }
    }

    if groups.len() < 2 {
        return None;
    }

    let (baseline_value, baseline_runs) = &groups[0];
    let (alternative_value, alternative_runs) = &groups[1];
    if baseline_runs.len() < MIN_RUNS_PER_COMPARED_VALUE
        || alternative_runs.len() < MIN_RUNS_PER_COMPARED_VALUE
    {
        return None;
    }

    let baseline = aggregate(baseline_runs.iter().copied());
    let alternative = aggregate(alternative_runs.iter().copied());

    Some(ConfigComparison {
        config_key: key.to_string(),
        baseline_value: (*baseline_value).clone(),
        alternative_value: (*alternative_value).clone(),
        sharpe_delta: alternative.sharpe - baseline.sharpe,
        return_delta: alternative.cumulative_return - baseline.cumulative_return,
        risk_delta: alternative.volatility - baseline.volatility,
        sample_count: baseline_runs.len() + alternative_runs.len(),
    })
}

/// Runs whose Sharpe is below `min_sharpe`. Runs without a Sharpe are skipped.
pub fn identify_underperforming(runs: &[BacktestRunRecord], min_sharpe: f64) -> Vec<UnderperformingRun> {
    runs.iter()
        .filter_map(|run| {
            let sharpe = run.sharpe()?;
            (sharpe < min_sharpe).then(|| UnderperformingRun {
                run_id: run.run_id.clone(),
                sharpe,
                config: run.config.clone(),
                reason: format!("Sharpe {:.2} below threshold {:.2}", sharpe, min_sharpe),
            })
        })
        .collect()
}

/// Runs with excessive volatility or drawdown; one entry per run, listing every breach
pub fn identify_high_risk(runs: &[BacktestRunRecord], thresholds: &DiagnosticThresholds) -> Vec<HighRiskRun> {
    runs.iter()
        .filter_map(|run| {
            let vol = run.volatility();
            let drawdown = run.max_drawdown();

            let mut reasons = Vec::new();
            if let Some(vol) = vol.filter(|v| *v > thresholds.max_volatility) {
                reasons.push(format!(
                    "Volatility {:.2}% exceeds threshold {:.2}%",
                    vol * 100.0,
                    thresholds.max_volatility * 100.0
                ));
            }
            if let Some(drawdown) = drawdown.filter(|d| *d < thresholds.max_drawdown) {
                reasons.push(format!(
                    "Drawdown {:.2}% exceeds threshold {:.2}%",
                    drawdown * 100.0,
                    thresholds.max_drawdown * 100.0
                ));
            }

            (!reasons.is_empty()).then(|| HighRiskRun {
                run_id: run.run_id.clone(),
                volatility: vol.unwrap_or(0.0),
                max_drawdown: drawdown.unwrap_or(0.0),
                config: run.config.clone(),
                reasons,
            })
        })
        .collect()
}

/// Bounded [0, 1] heuristic blending sample size, effect size and consistency.
/// Not a statistical significance measure.
pub fn compute_confidence_score(sample_size: usize, sharpe_delta: f64, consistency: f64) -> f64 {
    let size_score = (sample_size as f64 / CONFIDENCE_FULL_SAMPLE_SIZE).min(1.0);
    // max/min rather than clamp so NaN inputs score zero
    let sharpe_score = (sharpe_delta / CONFIDENCE_FULL_SHARPE_DELTA).max(0.0).min(1.0);
    let consistency_score = consistency.max(0.0).min(1.0);

    CONFIDENCE_SAMPLE_WEIGHT * size_score
        + CONFIDENCE_EFFECT_WEIGHT * sharpe_score
        + CONFIDENCE_CONSISTENCY_WEIGHT * consistency_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::meta_constants::{DRAWDOWN_METRIC, SHARPE_METRIC, VOLATILITY_METRIC};
    use std::collections::BTreeMap;

    fn run(id: &str, config: &[(&str, ConfigValue)], sharpe: f64, vol: f64, dd: f64) -> BacktestRunRecord {
        BacktestRunRecord {
            run_id: id.to_string(),
            strategy_id: "S1".to_string(),
            universe_id: None,
            config: config.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            metrics: BTreeMap::from([
                (SHARPE_METRIC.to_string(), sharpe),
                (VOLATILITY_METRIC.to_string(), vol),
                (DRAWDOWN_METRIC.to_string(), dd),
            ]),
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn confidence_is_bounded_and_monotone() {
        let mut previous = -1.0;
        for n in 0..50 {
            let score = compute_confidence_score(n, 0.3, 0.5);
            assert!((0.0..=1.0).contains(&score));
            assert!(score >= previous);
            previous = score;
        }

        let mut previous = -1.0;
        for step in 0..100 {
            let delta = step as f64 * 0.02;
            let score = compute_confidence_score(10, delta, 0.5);
            assert!((0.0..=1.0).contains(&score));
            assert!(score >= previous);
            previous = score;
        }

        assert_eq!(compute_confidence_score(1000, 10.0, 5.0), 1.0);
        assert_eq!(compute_confidence_score(0, f64::NAN, f64::NAN), 0.0);
    }

    #[test]
    fn confidence_matches_weighted_blend() {
        let score = compute_confidence_score(10, 0.5, 0.7);
        assert!((score - (0.4 * 0.5 + 0.4 * 1.0 + 0.2 * 0.7)).abs() < 1e-12);
    }

    #[test]
    fn comparison_uses_first_two_values_seen() {
        let runs = vec![
            run("a", &[("window", ConfigValue::Int(20))], 0.8, 0.1, -0.1),
            run("b", &[("window", ConfigValue::Int(10))], 1.3, 0.1, -0.1),
            run("c", &[("window", ConfigValue::Int(20))], 0.8, 0.1, -0.1),
            run("d", &[("window", ConfigValue::Int(10))], 1.3, 0.1, -0.1),
            run("e", &[("window", ConfigValue::Int(5))], 9.0, 0.1, -0.1),
            run("f", &[("window", ConfigValue::Int(5))], 9.0, 0.1, -0.1),
        ];
        let comparisons = compare_configurations(&runs);
        assert_eq!(comparisons.len(), 1);
        let c = &comparisons[0];
        assert_eq!(c.baseline_value, ConfigValue::Int(20));
        assert_eq!(c.alternative_value, ConfigValue::Int(10));
        assert!((c.sharpe_delta - 0.5).abs() < 1e-9);
        assert_eq!(c.sample_count, 4);
    }

    #[test]
    fn integral_floats_group_with_ints() {
        let runs = vec![
            run("a", &[("window", ConfigValue::Int(10))], 0.8, 0.1, -0.1),
            run("b", &[("window", ConfigValue::Int(10))], 0.8, 0.1, -0.1),
            run("c", &[("window", ConfigValue::Int(10))], 0.8, 0.1, -0.1),
            run("d", &[("window", ConfigValue::Float(10.0))], 1.3, 0.1, -0.1),
            run("e", &[("window", ConfigValue::Float(10.0))], 1.3, 0.1, -0.1),
            run("f", &[("window", ConfigValue::Float(10.0))], 1.3, 0.1, -0.1),
        ];
        assert!(compare_configurations(&runs).is_empty());

        let mut runs = runs;
        runs.push(run("g", &[("window", ConfigValue::Float(12.5))], 2.0, 0.1, -0.1));
        runs.push(run("h", &[("window", ConfigValue::Float(12.5))], 2.0, 0.1, -0.1));
        let comparisons = compare_configurations(&runs);
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].baseline_value, ConfigValue::Int(10));
        assert_eq!(comparisons[0].alternative_value, ConfigValue::Float(12.5));
        assert_eq!(comparisons[0].sample_count, 8);
    }

    #[test]
    fn comparison_needs_two_runs_per_value() {
        let runs = vec![
            run("a", &[("window", ConfigValue::Int(20))], 0.8, 0.1, -0.1),
            run("b", &[("window", ConfigValue::Int(10))], 1.3, 0.1, -0.1),
            run("c", &[("window", ConfigValue::Int(20))], 0.8, 0.1, -0.1),
            run("d", &[("window", ConfigValue::Int(10))], 1.3, 0.1, -0.1),
            run("e", &[("fast", true.into())], 1.0, 0.1, -0.1),
            run("f", &[("fast", false.into())], 1.0, 0.1, -0.1),
            run("g", &[("fast", false.into())], 1.0, 0.1, -0.1),
        ];
        let comparisons = compare_configurations(&runs);
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].config_key, "window");
    }

    #[test]
    fn comparisons_are_sorted_best_first() {
        let mut runs = Vec::new();
        for i in 0..2 {
            runs.push(run(&format!("a{}", i), &[("alpha", ConfigValue::Int(1)), ("beta", ConfigValue::Int(1))], 1.0, 0.1, -0.1));
        }
        for i in 0..2 {
            runs.push(run(&format!("b{}", i), &[("alpha", ConfigValue::Int(2)), ("beta", ConfigValue::Int(2))], 1.2, 0.1, -0.1));
        }
        // beta differs more in the later runs
        for i in 0..2 {
            runs.push(run(&format!("c{}", i), &[("beta", ConfigValue::Int(2))], 3.0, 0.1, -0.1));
        }
        let comparisons = compare_configurations(&runs);
        assert_eq!(comparisons.len(), 2);
        assert_eq!(comparisons[0].config_key, "beta");
        assert!(comparisons[0].sharpe_delta >= comparisons[1].sharpe_delta);
    }

    #[test]
    fn high_risk_lists_every_breach_once_per_run() {
        let thresholds = DiagnosticThresholds::default();
        let runs = vec![
            run("calm", &[], 1.0, 0.10, -0.05),
            run("volatile", &[], 1.0, 0.35, -0.05),
            run("both", &[], 1.0, 0.40, -0.30),
        ];
        let high_risk = identify_high_risk(&runs, &thresholds);
        assert_eq!(high_risk.len(), 2);
        assert_eq!(high_risk[0].run_id, "volatile");
        assert_eq!(high_risk[0].reasons.len(), 1);
        assert_eq!(high_risk[1].reasons.len(), 2);
        assert_eq!(high_risk[0].reasons[0], "Volatility 35.00% exceeds threshold 30.00%");
    }

    #[test]
    fn underperformers_fall_below_min_sharpe() {
        let runs = vec![
            run("good", &[], 0.9, 0.1, -0.1),
            run("bad", &[], 0.2, 0.1, -0.1),
            run("edge", &[], 0.5, 0.1, -0.1),
        ];
        let under = identify_underperforming(&runs, 0.5);
        assert_eq!(under.len(), 1);
        assert_eq!(under[0].run_id, "bad");
        assert_eq!(under[0].reason, "Sharpe 0.20 below threshold 0.50");
    }

    #[test]
    fn single_catch_all_regime() {
        let runs = vec![run("a", &[], 1.0, 0.1, -0.1), run("b", &[], 2.0, 0.1, -0.1)];
        let report = build_report("S1", &runs, &DiagnosticThresholds::default(), Utc::now().date_naive());
        assert_eq!(report.regime_breakdown.len(), 1);
        assert_eq!(report.regime_breakdown[0].regime_id, ALL_REGIME_ID);
        assert_eq!(report.regime_breakdown[0].relative_sharpe, 0.0);
        assert_eq!(report.total_runs, 2);
    }
}
