use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::config_value::{ConfigMap, ConfigValue};
use super::meta_constants::{
    DRAWDOWN_METRIC, RETURN_METRIC, SHARPE_METRIC, VOLATILITY_METRIC, WIN_RATE_METRIC,
};

/// One row of `backtest_runs`, produced by the external backtest engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRunRecord {
    pub run_id: String,
    pub strategy_id: String,
    pub universe_id: Option<String>,
    pub config: ConfigMap,
    pub metrics: BTreeMap<String, f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl BacktestRunRecord {
    /// Finite metric value, if the run reported one
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn sharpe(&self) -> Option<f64> {
        self.metric(SHARPE_METRIC)
    }

    pub fn cumulative_return(&self) -> Option<f64> {
        self.metric(RETURN_METRIC)
    }

    pub fn volatility(&self) -> Option<f64> {
        self.metric(VOLATILITY_METRIC)
    }

    pub fn max_drawdown(&self) -> Option<f64> {
        self.metric(DRAWDOWN_METRIC)
    }

    pub fn win_rate(&self) -> Option<f64> {
        self.metric(WIN_RATE_METRIC)
    }
}

/// Aggregate performance of a group of runs.
/// `win_rate_measured` is false when `win_rate` is the neutral placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub sharpe: f64,
    #[serde(rename = "return")]
    pub cumulative_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub win_rate_measured: bool,
    pub sample_size: usize,
    pub run_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimePerformance {
    pub regime_id: String,
    pub stats: PerformanceStats,
    pub relative_sharpe: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigComparison {
    pub config_key: String,
    pub baseline_value: ConfigValue,
    pub alternative_value: ConfigValue,
    pub sharpe_delta: f64, // alternative - baseline
    pub return_delta: f64,
    pub risk_delta: f64, // volatility change
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderperformingRun {
    pub run_id: String,
    pub sharpe: f64,
    pub config: ConfigMap,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskRun {
    pub run_id: String,
    pub volatility: f64,
    pub max_drawdown: f64,
    pub config: ConfigMap,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub strategy_id: String,
    pub overall_performance: PerformanceStats,
    pub regime_breakdown: Vec<RegimePerformance>,
    pub config_comparisons: Vec<ConfigComparison>,
    pub underperforming_configs: Vec<UnderperformingRun>,
    pub high_risk_configs: Vec<HighRiskRun>,
    pub total_runs: usize,
    pub analysis_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    ConfigParameterChange,
    RiskReduction,
    RiskConstraint,
}

impl ProposalType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "config_parameter_change" => Some(Self::ConfigParameterChange),
            "risk_reduction" => Some(Self::RiskReduction),
            "risk_constraint" => Some(Self::RiskConstraint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigParameterChange => "config_parameter_change",
            Self::RiskReduction => "risk_reduction",
            Self::RiskConstraint => "risk_constraint",
        }
    }
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposal lifecycle:
/// `PENDING -> APPROVED -> APPLIED -> REVERTED`, `PENDING -> REJECTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Reverted,
}

impl ProposalStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "APPLIED" => Some(Self::Applied),
            "REVERTED" => Some(Self::Reverted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Applied => "APPLIED",
            Self::Reverted => "REVERTED",
        }
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Applied)
                | (Self::Applied, Self::Reverted)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested change to one configuration component of one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProposal {
    pub proposal_id: String,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub proposal_type: ProposalType,
    pub target_component: String,
    pub current_value: Option<ConfigValue>, // value seen at generation time, may be stale
    pub proposed_value: Option<ConfigValue>,
    pub confidence_score: f64,
    pub expected_sharpe_improvement: f64,
    pub expected_return_improvement: f64,
    pub expected_risk_reduction: f64,
    pub rationale: String,
    pub supporting_metrics: BTreeMap<String, f64>,
    pub status: ProposalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Audit-trail entry for an applied proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub change_id: String,
    pub proposal_id: Option<String>,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub change_type: ProposalType,
    pub target_component: String,
    pub previous_value: Option<ConfigValue>, // live value at application time; None = key was absent
    pub new_value: ConfigValue,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
    pub is_reverted: bool,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<String>,
    pub reversion_reason: Option<String>,
    pub sharpe_before: Option<f64>,
    pub sharpe_after: Option<f64>,
    pub return_before: Option<f64>,
    pub return_after: Option<f64>,
    pub risk_before: Option<f64>,
    pub risk_after: Option<f64>,
    pub evaluation_start_date: Option<NaiveDate>,
    pub evaluation_end_date: Option<NaiveDate>,
}

impl ConfigChange {
    pub fn sharpe_improvement(&self) -> Option<f64> {
        Some(self.sharpe_after? - self.sharpe_before?)
    }
}

/// Mean Sharpe / return / volatility over an evaluation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub sharpe: f64,
    #[serde(rename = "return")]
    pub cumulative_return: f64,
    pub volatility: f64,
}

impl PeriodMetrics {
    pub fn delta(&self, earlier: &PeriodMetrics) -> PeriodMetrics {
        PeriodMetrics {
            sharpe: self.sharpe - earlier.sharpe,
            cumulative_return: self.cumulative_return - earlier.cumulative_return,
            volatility: self.volatility - earlier.volatility,
        }
    }
}

impl From<&PerformanceStats> for PeriodMetrics {
    fn from(stats: &PerformanceStats) -> Self {
        Self {
            sharpe: stats.sharpe,
            cumulative_return: stats.cumulative_return,
            volatility: stats.volatility,
        }
    }
}

/// Inclusive calendar-date window over run start/end dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains_run(&self, run: &BacktestRunRecord) -> bool {
        match (run.start_date, run.end_date) {
            (Some(start), Some(end)) => start >= self.start && end <= self.end,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lifecycle_edges_are_valid_transitions() {
        use ProposalStatus::*;
        let all = [Pending, Approved, Rejected, Applied, Reverted];
        let valid = [
            (Pending, Approved),
            (Pending, Rejected),
            (Approved, Applied),
            (Applied, Reverted),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    valid.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [
            ProposalStatus::Pending,
            ProposalStatus::Approved,
            ProposalStatus::Rejected,
            ProposalStatus::Applied,
            ProposalStatus::Reverted,
        ] {
            assert_eq!(ProposalStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ProposalStatus::from_str("approved"), Some(ProposalStatus::Approved));
        assert_eq!(ProposalStatus::from_str("DONE"), None);
        assert_eq!(ProposalType::from_str("risk_constraint"), Some(ProposalType::RiskConstraint));
        assert_eq!(ProposalType::from_str("universe_adjustment"), None);
    }
}
