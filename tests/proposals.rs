mod common;

use serde_json::json;

use common::*;
use strategy_config_tuner::error::{DomainError, MetaError};
use strategy_config_tuner::meta::config_value::ConfigValue;
use strategy_config_tuner::meta::meta_constants::RISK_CONSTRAINT_TARGET;
use strategy_config_tuner::meta::store::MetaStore;
use strategy_config_tuner::meta::types::{ProposalStatus, ProposalType};

fn window_runs() -> Vec<RunSpec> {
    let mut specs = Vec::new();
    for _ in 0..6 {
        specs.push(RunSpec::new(0.8).with("window", ConfigValue::Int(20)));
    }
    for _ in 0..4 {
        specs.push(RunSpec::new(1.3).ret(0.15).with("window", ConfigValue::Int(10)));
    }
    specs
}

#[tokio::test]
async fn better_window_value_becomes_a_proposal() {
    let store = seeded_store().await;
    store.insert_runs(runs(window_runs())).await;

    let proposals = generator(&store).generate_proposals(STRATEGY, true).await.unwrap();

    assert_eq!(proposals.len(), 1);
    let p = &proposals[0];
    assert_eq!(p.proposal_type, ProposalType::ConfigParameterChange);
    assert_eq!(p.target_component, "window");
    assert_eq!(p.current_value, Some(ConfigValue::Int(20)));
    assert_eq!(p.proposed_value, Some(ConfigValue::Int(10)));
    assert!((p.expected_sharpe_improvement - 0.5).abs() < 1e-9);
    assert!((p.expected_return_improvement - 0.05).abs() < 1e-9);
    assert!(p.confidence_score >= 0.3 && p.confidence_score <= 1.0);
    assert!((p.confidence_score - 0.74).abs() < 1e-9);
    assert_eq!(p.status, ProposalStatus::Pending);
    assert!(p.rationale.starts_with("Changing Window from 20 to 10 shows significant improvement"));
    assert!(p.rationale.ends_with("Based on 10 backtest runs."));

    let pending = generator(&store).load_pending_proposals(Some(STRATEGY)).await.unwrap();
    assert_eq!(pending, proposals);
}

#[tokio::test]
async fn generate_without_saving_leaves_store_untouched() {
    let store = seeded_store().await;
    store.insert_runs(runs(window_runs())).await;

    let proposals = generator(&store).generate_proposals(STRATEGY, false).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert!(generator(&store).load_pending_proposals(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn volatile_runs_produce_a_risk_constraint() {
    let store = seeded_store().await;
    let mut specs = Vec::new();
    for i in 0..8 {
        let spec = RunSpec::new(1.0);
        specs.push(if i % 3 == 0 { spec.vol(0.35) } else { spec });
    }
    store.insert_runs(runs(specs)).await;

    let report = generator(&store)
        .diagnostics()
        .analyze_strategy(STRATEGY, 5)
        .await
        .unwrap();
    assert_eq!(report.high_risk_configs.len(), 3);
    assert_eq!(report.total_runs, 8);
    assert!(report.underperforming_configs.is_empty());

    let proposals = generator(&store).generate_proposals(STRATEGY, true).await.unwrap();
    let constraint = proposals
        .iter()
        .find(|p| p.proposal_type == ProposalType::RiskConstraint)
        .expect("risk constraint proposal");
    assert_eq!(constraint.target_component, RISK_CONSTRAINT_TARGET);
    assert_eq!(
        constraint.proposed_value,
        ConfigValue::from_json(&json!({"max_vol": 0.25, "max_drawdown": -0.15}))
    );
    assert_eq!(constraint.confidence_score, 0.6);
    assert_eq!(constraint.supporting_metrics["high_risk_count"], 3.0);
    // Reported figures cover every run, not only the flagged ones
    assert_eq!(
        constraint.supporting_metrics["avg_volatility"],
        report.overall_performance.volatility
    );
    assert_eq!(
        constraint.supporting_metrics["worst_drawdown"],
        report.overall_performance.max_drawdown
    );
    assert!(constraint.supporting_metrics["avg_volatility"] < 0.35);
}

#[tokio::test]
async fn widespread_underperformance_asks_for_risk_review() {
    let store = seeded_store().await;
    let specs = vec![
        RunSpec::new(0.1),
        RunSpec::new(0.2),
        RunSpec::new(0.3),
        RunSpec::new(1.0),
        RunSpec::new(1.1),
        RunSpec::new(1.2),
    ];
    store.insert_runs(runs(specs)).await;

    let proposals = generator(&store).generate_proposals(STRATEGY, false).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].proposal_type, ProposalType::RiskReduction);
    assert_eq!(proposals[0].expected_sharpe_improvement, 0.2);
    assert_eq!(
        proposals[0].proposed_value,
        Some(ConfigValue::Map([("action".to_string(), ConfigValue::from("review_and_tighten"))].into()))
    );
}

#[tokio::test]
async fn proposals_are_ranked_by_expected_sharpe() {
    let store = seeded_store().await;
    let mut specs = window_runs();
    for spec in specs.iter_mut().take(3) {
        spec.vol = 0.40;
    }
    store.insert_runs(runs(specs)).await;

    let proposals = generator(&store).generate_proposals(STRATEGY, false).await.unwrap();
    assert_eq!(proposals.len(), 2);
    assert!(
        proposals
            .windows(2)
            .all(|w| w[0].expected_sharpe_improvement >= w[1].expected_sharpe_improvement)
    );
    assert_eq!(proposals[0].target_component, "window");
}

#[tokio::test]
async fn too_few_runs_is_an_error() {
    let store = seeded_store().await;
    store
        .insert_runs(runs((0..3).map(|_| RunSpec::new(1.0)).collect()))
        .await;

    let err = generator(&store)
        .diagnostics()
        .analyze_strategy(STRATEGY, 5)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MetaError::Domain(DomainError::InsufficientData { available: 3, required: 5, .. })
    ));

    store
        .insert_runs(runs((0..2).map(|_| RunSpec::new(1.0)).collect()))
        .await;
    let report = generator(&store)
        .diagnostics()
        .analyze_strategy(STRATEGY, 5)
        .await
        .unwrap();
    assert_eq!(report.overall_performance.sample_size, 5);
}

#[tokio::test]
async fn runs_without_metrics_do_not_count() {
    let store = seeded_store().await;
    let mut all = runs((0..5).map(|_| RunSpec::new(1.0)).collect());
    all[4].metrics.clear();
    store.insert_runs(all).await;

    let err = generator(&store)
        .diagnostics()
        .analyze_strategy(STRATEGY, 5)
        .await
        .unwrap_err();
    assert!(err.is_domain());
}

#[tokio::test]
async fn approve_and_reject_record_the_decision() {
    let store = seeded_store().await;
    store.insert_runs(runs(window_runs())).await;
    let generator = generator(&store);
    let proposal = generator.generate_proposals(STRATEGY, true).await.unwrap().remove(0);

    generator.approve_proposal(&proposal.proposal_id, "alice").await.unwrap();
    let approved = store.load_proposal(&proposal.proposal_id).await.unwrap().unwrap();
    assert_eq!(approved.status, ProposalStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some("alice"));
    assert!(approved.approved_at.is_some());

    // Decisions overwrite whatever status is present
    generator.reject_proposal(&proposal.proposal_id, "bob").await.unwrap();
    let rejected = store.load_proposal(&proposal.proposal_id).await.unwrap().unwrap();
    assert_eq!(rejected.status, ProposalStatus::Rejected);
    assert_eq!(rejected.approved_by.as_deref(), Some("bob"));
}

#[tokio::test]
async fn deciding_an_unknown_proposal_fails() {
    let store = seeded_store().await;
    let err = generator(&store).approve_proposal("missing", "alice").await.unwrap_err();
    assert_eq!(err.domain(), Some(&DomainError::ProposalNotFound("missing".to_string())));

    let err = generator(&store).reject_proposal("missing", "alice").await.unwrap_err();
    assert!(err.is_domain());
}
