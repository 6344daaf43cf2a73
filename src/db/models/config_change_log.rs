use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

use super::optional_config_value;
use crate::error::StoreError;
use crate::meta::types::{ConfigChange, ProposalType};

const ENTITY: &str = "config_change";

#[derive(Debug, FromRow)]
pub struct ConfigChangeModel {
    pub change_id: String,
    pub proposal_id: Option<String>,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub change_type: String,
    pub target_component: String,
    pub previous_value: Option<Json<Value>>,
    pub new_value: Json<Value>,
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

#[derive(Debug, Clone)]
pub struct NewConfigChangeModel {
    pub change_id: String,
    pub proposal_id: Option<String>,
    pub strategy_id: String,
    pub market_id: Option<String>,
    pub change_type: String,
    pub target_component: String,
    pub previous_value: Option<Json<Value>>,
    pub new_value: Json<Value>,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
}

impl From<&ConfigChange> for NewConfigChangeModel {
    fn from(c: &ConfigChange) -> Self {
        Self {
            change_id: c.change_id.clone(),
            proposal_id: c.proposal_id.clone(),
            strategy_id: c.strategy_id.clone(),
            market_id: c.market_id.clone(),
            change_type: c.change_type.as_str().to_string(),
            target_component: c.target_component.clone(),
            previous_value: c.previous_value.as_ref().map(|v| Json(v.to_json())),
            new_value: Json(c.new_value.to_json()),
            applied_by: c.applied_by.clone(),
            applied_at: c.applied_at,
        }
    }
}

impl TryFrom<ConfigChangeModel> for ConfigChange {
    type Error = StoreError;

    fn try_from(m: ConfigChangeModel) -> Result<Self, Self::Error> {
        let change_type = ProposalType::from_str(&m.change_type).ok_or_else(|| StoreError::Decode {
            entity: ENTITY,
            id: m.change_id.clone(),
            reason: format!("unknown change_type {}", m.change_type),
        })?;
        let previous_value =
            optional_config_value(ENTITY, &m.change_id, "previous_value", m.previous_value.as_ref().map(|j| &j.0))?;
        let new_value = optional_config_value(ENTITY, &m.change_id, "new_value", Some(&m.new_value.0))?
            .ok_or_else(|| StoreError::Decode {
                entity: ENTITY,
                id: m.change_id.clone(),
                reason: "new_value is null".to_string(),
            })?;

        Ok(ConfigChange {
            change_id: m.change_id,
            proposal_id: m.proposal_id,
            strategy_id: m.strategy_id,
            market_id: m.market_id,
            change_type,
            target_component: m.target_component,
            previous_value,
            new_value,
            applied_by: m.applied_by,
            applied_at: m.applied_at,
            is_reverted: m.is_reverted,
            reverted_at: m.reverted_at,
            reverted_by: m.reverted_by,
            reversion_reason: m.reversion_reason,
            sharpe_before: m.sharpe_before,
            sharpe_after: m.sharpe_after,
            return_before: m.return_before,
            return_after: m.return_after,
            risk_before: m.risk_before,
            risk_after: m.risk_after,
            evaluation_start_date: m.evaluation_start_date,
            evaluation_end_date: m.evaluation_end_date,
        })
    }
}
