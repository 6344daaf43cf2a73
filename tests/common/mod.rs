#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use strategy_config_tuner::meta::applicator::ProposalApplicator;
use strategy_config_tuner::meta::config_value::{ConfigMap, ConfigValue};
use strategy_config_tuner::meta::diagnostics::DiagnosticThresholds;
use strategy_config_tuner::meta::memory_store::MemoryStore;
use strategy_config_tuner::meta::meta_constants::{
    DRAWDOWN_METRIC, RETURN_METRIC, SHARPE_METRIC, VOLATILITY_METRIC,
};
use strategy_config_tuner::meta::proposal_generator::ProposalGenerator;
use strategy_config_tuner::meta::risk_limits::DefaultRiskLimits;
use strategy_config_tuner::meta::types::{
    BacktestRunRecord, ConfigProposal, ProposalStatus, ProposalType,
};

pub const STRATEGY: &str = "S1";

pub struct RunSpec {
    pub config: Vec<(&'static str, ConfigValue)>,
    pub sharpe: f64,
    pub ret: f64,
    pub vol: f64,
    pub drawdown: f64,
}

impl RunSpec {
    pub fn new(sharpe: f64) -> Self {
        Self {
            config: Vec::new(),
            sharpe,
            ret: 0.10,
            vol: 0.15,
            drawdown: -0.05,
        }
    }

    pub fn with(mut self, key: &'static str, value: ConfigValue) -> Self {
        self.config.push((key, value));
        self
    }

    pub fn vol(mut self, vol: f64) -> Self {
        self.vol = vol;
        self
    }

    pub fn ret(mut self, ret: f64) -> Self {
        self.ret = ret;
        self
    }
}

/// Builds runs whose `created_at` decreases with position, so store order
/// (newest first) matches the order given here
pub fn runs(specs: Vec<RunSpec>) -> Vec<BacktestRunRecord> {
    let base = Utc::now();
    specs
        .into_iter()
        .enumerate()
        .map(|(i, spec)| BacktestRunRecord {
            run_id: format!("run-{:02}", i),
            strategy_id: STRATEGY.to_string(),
            universe_id: None,
            config: spec.config.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            metrics: BTreeMap::from([
                (SHARPE_METRIC.to_string(), spec.sharpe),
                (RETURN_METRIC.to_string(), spec.ret),
                (VOLATILITY_METRIC.to_string(), spec.vol),
                (DRAWDOWN_METRIC.to_string(), spec.drawdown),
            ]),
            start_date: None,
            end_date: None,
            created_at: base - Duration::minutes(i as i64),
        })
        .collect()
}

pub fn dated_run(id: &str, sharpe: f64, start: NaiveDate, end: NaiveDate) -> BacktestRunRecord {
    let mut run = runs(vec![RunSpec::new(sharpe)]).remove(0);
    run.run_id = id.to_string();
    run.start_date = Some(start);
    run.end_date = Some(end);
    run
}

pub fn approved_proposal(
    id: &str,
    target_component: &str,
    current: Option<ConfigValue>,
    proposed: ConfigValue,
    expected_sharpe: f64,
) -> ConfigProposal {
    let now: DateTime<Utc> = Utc::now();
    ConfigProposal {
        proposal_id: id.to_string(),
        strategy_id: STRATEGY.to_string(),
        market_id: None,
        proposal_type: ProposalType::ConfigParameterChange,
        target_component: target_component.to_string(),
        current_value: current,
        proposed_value: Some(proposed),
        confidence_score: 0.7,
        expected_sharpe_improvement: expected_sharpe,
        expected_return_improvement: 0.01,
        expected_risk_reduction: 0.0,
        rationale: "test proposal".to_string(),
        supporting_metrics: BTreeMap::new(),
        status: ProposalStatus::Approved,
        approved_by: Some("reviewer".to_string()),
        approved_at: Some(now),
        applied_at: None,
        reverted_at: None,
        created_at: now,
    }
}

pub fn live_config() -> ConfigMap {
    ConfigMap::from([
        ("window".to_string(), ConfigValue::Int(20)),
        ("fast".to_string(), ConfigValue::Bool(true)),
    ])
}

pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set_strategy_config(STRATEGY, live_config()).await;
    store
}

pub fn generator(store: &Arc<MemoryStore>) -> ProposalGenerator<MemoryStore> {
    ProposalGenerator::new(
        store.clone(),
        DiagnosticThresholds::default(),
        Arc::new(DefaultRiskLimits::default()),
    )
}

pub fn applicator(store: &Arc<MemoryStore>) -> ProposalApplicator<MemoryStore> {
    ProposalApplicator::new(store.clone())
}
