use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::config_value::ConfigValue;
use super::diagnostics::{DiagnosticThresholds, DiagnosticsEngine, compute_confidence_score};
use super::meta_constants::*;
use super::risk_limits::RiskLimitSource;
use super::store::{MetaStore, ProposalFilter, StoreTx};
use super::types::{ConfigComparison, ConfigProposal, DiagnosticReport, ProposalStatus, ProposalType};
use crate::error::{DomainError, MetaError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalThresholds {
    pub min_confidence: f64,
    pub min_sharpe_improvement: f64,
}

impl Default for ProposalThresholds {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            min_sharpe_improvement: DEFAULT_MIN_SHARPE_IMPROVEMENT,
        }
    }
}

/// Turns diagnostic findings into ranked, persisted `PENDING` proposals
pub struct ProposalGenerator<S> {
    store: Arc<S>,
    diagnostics: DiagnosticsEngine<S>,
    risk_limits: Arc<dyn RiskLimitSource>,
    thresholds: ProposalThresholds,
    min_sample_size: usize,
}

impl<S: MetaStore> ProposalGenerator<S> {
    pub fn new(
        store: Arc<S>,
        diagnostic_thresholds: DiagnosticThresholds,
        risk_limits: Arc<dyn RiskLimitSource>,
    ) -> Self {
        Self {
            diagnostics: DiagnosticsEngine::new(store.clone(), diagnostic_thresholds),
            store,
            risk_limits,
            thresholds: ProposalThresholds::default(),
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
        }
    }

    pub fn with_thresholds(mut self, thresholds: ProposalThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_min_sample_size(mut self, min_sample_size: usize) -> Self {
        self.min_sample_size = min_sample_size;
        self
    }

    pub fn diagnostics(&self) -> &DiagnosticsEngine<S> {
        &self.diagnostics
    }

    #[instrument(name = "generate_proposals", skip(self), fields(on_close = true))]
    pub async fn generate_proposals(
        &self,
        strategy_id: &str,
        auto_save: bool,
    ) -> Result<Vec<ConfigProposal>, MetaError> {
        let report = self
            .diagnostics
            .analyze_strategy(strategy_id, self.min_sample_size)
            .await?;

        let proposals = self.proposals_from_report(&report, Utc::now());
        info!(strategy_id, count = proposals.len(), "Generated proposals");

        if auto_save && !proposals.is_empty() {
            self.store.save_proposals(&proposals).await?;
            info!(strategy_id, count = proposals.len(), "Saved proposals as PENDING");
        }

        Ok(proposals)
    }

    /// Candidate proposals from all three sources, filtered and ranked by
    /// expected Sharpe improvement
    pub fn proposals_from_report(&self, report: &DiagnosticReport, now: DateTime<Utc>) -> Vec<ConfigProposal> {
        let mut candidates: Vec<ConfigProposal> = report
            .config_comparisons
            .iter()
            .filter(|c| c.sharpe_delta > 0.0)
            .map(|c| comparison_proposal(&report.strategy_id, c, now))
            .collect();

        candidates.extend(underperformance_proposal(report, now));
        candidates.extend(self.high_risk_proposal(report, now));

        let total = candidates.len();
        let mut proposals: Vec<ConfigProposal> = candidates
            .into_iter()
            .filter(|p| {
                p.confidence_score >= self.thresholds.min_confidence
                    && p.expected_sharpe_improvement >= self.thresholds.min_sharpe_improvement
            })
            .collect();
        debug!(candidates = total, kept = proposals.len(), "Filtered proposal candidates");

        proposals.sort_by(|a, b| {
            b.expected_sharpe_improvement
                .total_cmp(&a.expected_sharpe_improvement)
        });
        proposals
    }

    fn high_risk_proposal(&self, report: &DiagnosticReport, now: DateTime<Utc>) -> Option<ConfigProposal> {
        let high_risk = &report.high_risk_configs;
        if high_risk.is_empty() {
            return None;
        }

        let limits = self.risk_limits.get(&report.strategy_id);
        // Strategy-wide figures, not just the flagged runs
        let avg_volatility = report.overall_performance.volatility;
        let worst_drawdown = report.overall_performance.max_drawdown;

        let proposed = ConfigValue::Map(BTreeMap::from([
            ("max_vol".to_string(), ConfigValue::Float(limits.max_volatility)),
            ("max_drawdown".to_string(), ConfigValue::Float(limits.max_drawdown)),
        ]));

        Some(new_proposal(
            &report.strategy_id,
            ProposalType::RiskConstraint,
            RISK_CONSTRAINT_TARGET,
            None,
            proposed,
            RISK_CONSTRAINT_CONFIDENCE,
            (RISK_CONSTRAINT_SHARPE_ESTIMATE, RISK_CONSTRAINT_RETURN_ESTIMATE, RISK_CONSTRAINT_RISK_ESTIMATE),
            format!(
                "{} runs exceeded risk thresholds (strategy average volatility {:.2}%, worst drawdown {:.2}%). \
                 Proposing tighter limits: max volatility {:.2}%, max drawdown {:.2}%.",
                high_risk.len(),
                avg_volatility * 100.0,
                worst_drawdown * 100.0,
                limits.max_volatility * 100.0,
                limits.max_drawdown * 100.0
            ),
            BTreeMap::from([
                ("high_risk_count".to_string(), high_risk.len() as f64),
                ("avg_volatility".to_string(), avg_volatility),
                ("worst_drawdown".to_string(), worst_drawdown),
            ]),
            now,
        ))
    }

    pub async fn load_pending_proposals(&self, strategy_id: Option<&str>) -> Result<Vec<ConfigProposal>, MetaError> {
        Ok(self.store.load_proposals(&ProposalFilter::pending(strategy_id)).await?)
    }

    pub async fn approve_proposal(&self, proposal_id: &str, approved_by: &str) -> Result<(), MetaError> {
        self.record_decision(proposal_id, ProposalStatus::Approved, approved_by).await
    }

    pub async fn reject_proposal(&self, proposal_id: &str, rejected_by: &str) -> Result<(), MetaError> {
        self.record_decision(proposal_id, ProposalStatus::Rejected, rejected_by).await
    }

    // Overwrites whatever status the proposal currently has
    async fn record_decision(&self, proposal_id: &str, status: ProposalStatus, by: &str) -> Result<(), MetaError> {
        let mut tx = self.store.begin().await?;
        let proposal = tx
            .load_proposal_for_update(proposal_id)
            .await?
            .ok_or_else(|| DomainError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Pending {
            warn!(
                proposal_id,
                current = %proposal.status,
                new = %status,
                "Overwriting decision on a proposal that is not PENDING"
            );
        }

        tx.set_proposal_decision(proposal_id, status, by, Utc::now()).await?;
        tx.commit().await?;
        info!(proposal_id, status = %status, by, "Proposal decision recorded");
        Ok(())
    }
}

fn comparison_proposal(strategy_id: &str, comparison: &ConfigComparison, now: DateTime<Utc>) -> ConfigProposal {
    let confidence = compute_confidence_score(
        comparison.sample_count,
        comparison.sharpe_delta,
        COMPARISON_CONSISTENCY,
    );
    let risk_reduction = if comparison.risk_delta < 0.0 { -comparison.risk_delta } else { 0.0 };

    new_proposal(
        strategy_id,
        ProposalType::ConfigParameterChange,
        &comparison.config_key,
        Some(comparison.baseline_value.clone()),
        comparison.alternative_value.clone(),
        confidence,
        (comparison.sharpe_delta, comparison.return_delta, risk_reduction),
        comparison_rationale(comparison),
        BTreeMap::from([
            ("sharpe_delta".to_string(), comparison.sharpe_delta),
            ("return_delta".to_string(), comparison.return_delta),
            ("risk_delta".to_string(), comparison.risk_delta),
            ("sample_count".to_string(), comparison.sample_count as f64),
        ]),
        now,
    )
}

fn underperformance_proposal(report: &DiagnosticReport, now: DateTime<Utc>) -> Option<ConfigProposal> {
    let underperforming = report.underperforming_configs.len();
    let total = report.overall_performance.sample_size;
    if (underperforming as f64) <= UNDERPERFORMING_FRACTION * total as f64 {
        return None;
    }

    let proposed = ConfigValue::Map(BTreeMap::from([(
        "action".to_string(),
        ConfigValue::from("review_and_tighten"),
    )]));

    Some(new_proposal(
        &report.strategy_id,
        ProposalType::RiskReduction,
        RISK_REDUCTION_TARGET,
        None,
        proposed,
        RISK_REDUCTION_CONFIDENCE,
        (RISK_REDUCTION_SHARPE_ESTIMATE, RISK_REDUCTION_RETURN_ESTIMATE, RISK_REDUCTION_RISK_ESTIMATE),
        format!(
            "{} of {} runs ({:.0}%) fall below the Sharpe threshold. \
             Review and tighten the strategy risk limits.",
            underperforming,
            total,
            underperforming as f64 / total as f64 * 100.0
        ),
        BTreeMap::from([
            ("underperforming_count".to_string(), underperforming as f64),
            ("total_runs".to_string(), total as f64),
        ]),
        now,
    ))
}

fn comparison_rationale(comparison: &ConfigComparison) -> String {
    let magnitude = if comparison.sharpe_delta > 0.3 {
        "significant"
    } else if comparison.sharpe_delta > 0.15 {
        "moderate"
    } else {
        "modest"
    };

    format!(
        "Changing {} from {} to {} shows {} improvement: Sharpe {:+.2}, Return {:+.2}%. Based on {} backtest runs.",
        title_case(&comparison.config_key),
        comparison.baseline_value,
        comparison.alternative_value,
        magnitude,
        comparison.sharpe_delta,
        comparison.return_delta * 100.0,
        comparison.sample_count
    )
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[allow(clippy::too_many_arguments)]
fn new_proposal(
    strategy_id: &str,
    proposal_type: ProposalType,
    target_component: &str,
    current_value: Option<ConfigValue>,
    proposed_value: ConfigValue,
    confidence_score: f64,
    (sharpe, ret, risk): (f64, f64, f64),
    rationale: String,
    supporting_metrics: BTreeMap<String, f64>,
    now: DateTime<Utc>,
) -> ConfigProposal {
    ConfigProposal {
        proposal_id: Uuid::new_v4().to_string(),
        strategy_id: strategy_id.to_string(),
        market_id: None,
        proposal_type,
        target_component: target_component.to_string(),
        current_value,
        proposed_value: Some(proposed_value),
        confidence_score,
        expected_sharpe_improvement: sharpe,
        expected_return_improvement: ret,
        expected_risk_reduction: risk,
        rationale,
        supporting_metrics,
        status: ProposalStatus::Pending,
        approved_by: None,
        approved_at: None,
        applied_at: None,
        reverted_at: None,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison(key: &str, sharpe_delta: f64, return_delta: f64, risk_delta: f64) -> ConfigComparison {
        ConfigComparison {
            config_key: key.to_string(),
            baseline_value: ConfigValue::Int(20),
            alternative_value: ConfigValue::Int(10),
            sharpe_delta,
            return_delta,
            risk_delta,
            sample_count: 10,
        }
    }

    #[test]
    fn rationale_names_parameter_and_magnitude() {
        let text = comparison_rationale(&comparison("lookback_window", 0.5, 0.031, 0.0));
        assert_eq!(
            text,
            "Changing Lookback Window from 20 to 10 shows significant improvement: \
             Sharpe +0.50, Return +3.10%. Based on 10 backtest runs."
        );
        assert!(comparison_rationale(&comparison("w", 0.2, 0.0, 0.0)).contains("moderate"));
        assert!(comparison_rationale(&comparison("w", 0.12, 0.0, 0.0)).contains("modest"));
    }

    #[test]
    fn risk_reduction_only_counts_lower_volatility() {
        let now = Utc::now();
        let calmer = comparison_proposal("S1", &comparison("w", 0.5, 0.0, -0.04), now);
        assert!((calmer.expected_risk_reduction - 0.04).abs() < 1e-12);

        let wilder = comparison_proposal("S1", &comparison("w", 0.5, 0.0, 0.04), now);
        assert_eq!(wilder.expected_risk_reduction, 0.0);
        assert_eq!(wilder.status, ProposalStatus::Pending);
        assert_eq!(wilder.current_value, Some(ConfigValue::Int(20)));
        assert_eq!(wilder.proposed_value, Some(ConfigValue::Int(10)));
    }

    #[test]
    fn title_case_splits_on_underscores() {
        assert_eq!(title_case("window"), "Window");
        assert_eq!(title_case("max_position_size"), "Max Position Size");
    }
}
