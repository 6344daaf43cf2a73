use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

use super::{metrics_from_json, metrics_to_json, optional_config_value};
use crate::error::StoreError;
use crate::meta::types::{ConfigProposal, ProposalStatus, ProposalType};

const ENTITY: &str = "meta_config_proposal";

#[derive(Debug, FromRow)]
pub struct ConfigProposalModel {
    pub proposal_id: String,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub proposal_type: String,
    pub target_component: String,
    pub current_value: Option<Json<Value>>,
    pub proposed_value: Option<Json<Value>>,
    pub confidence_score: f64,
    pub expected_sharpe_improvement: f64,
    pub expected_return_improvement: f64,
    pub expected_risk_reduction: f64,
    pub rationale: String,
    pub supporting_metrics: Json<Value>,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConfigProposalModel {
    pub proposal_id: String,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub proposal_type: String,
    pub target_component: String,
    pub current_value: Option<Json<Value>>,
    pub proposed_value: Option<Json<Value>>,
    pub confidence_score: f64,
    pub expected_sharpe_improvement: f64,
    pub expected_return_improvement: f64,
    pub expected_risk_reduction: f64,
    pub rationale: String,
    pub supporting_metrics: Json<Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ConfigProposal> for NewConfigProposalModel {
    fn from(p: &ConfigProposal) -> Self {
        Self {
            proposal_id: p.proposal_id.clone(),
            strategy_id: p.strategy_id.clone(),
            market_id: p.market_id.clone(),
            proposal_type: p.proposal_type.as_str().to_string(),
            target_component: p.target_component.clone(),
            current_value: p.current_value.as_ref().map(|v| Json(v.to_json())),
            proposed_value: p.proposed_value.as_ref().map(|v| Json(v.to_json())),
            confidence_score: p.confidence_score,
            expected_sharpe_improvement: p.expected_sharpe_improvement,
            expected_return_improvement: p.expected_return_improvement,
            expected_risk_reduction: p.expected_risk_reduction,
            rationale: p.rationale.clone(),
            supporting_metrics: Json(metrics_to_json(&p.supporting_metrics)),
            status: p.status.as_str().to_string(),
            created_at: p.created_at,
        }
    }
}

impl TryFrom<ConfigProposalModel> for ConfigProposal {
    type Error = StoreError;

    fn try_from(m: ConfigProposalModel) -> Result<Self, Self::Error> {
        let decode = |reason: String| StoreError::Decode {
            entity: ENTITY,
            id: m.proposal_id.clone(),
            reason,
        };
        let proposal_type = ProposalType::from_str(&m.proposal_type)
            .ok_or_else(|| decode(format!("unknown proposal_type {}", m.proposal_type)))?;
        let status = ProposalStatus::from_str(&m.status)
            .ok_or_else(|| decode(format!("unknown status {}", m.status)))?;
        let current_value =
            optional_config_value(ENTITY, &m.proposal_id, "current_value", m.current_value.as_ref().map(|j| &j.0))?;
        let proposed_value =
            optional_config_value(ENTITY, &m.proposal_id, "proposed_value", m.proposed_value.as_ref().map(|j| &j.0))?;

        Ok(ConfigProposal {
            proposal_type,
            status,
            current_value,
            proposed_value,
            supporting_metrics: metrics_from_json(&m.supporting_metrics.0),
            proposal_id: m.proposal_id,
            strategy_id: m.strategy_id,
            market_id: m.market_id,
            target_component: m.target_component,
            confidence_score: m.confidence_score,
            expected_sharpe_improvement: m.expected_sharpe_improvement,
            expected_return_improvement: m.expected_return_improvement,
            expected_risk_reduction: m.expected_risk_reduction,
            rationale: m.rationale,
            approved_by: m.approved_by,
            approved_at: m.approved_at,
            applied_at: m.applied_at,
            reverted_at: m.reverted_at,
            created_at: m.created_at,
        })
    }
}
