use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

#[derive(Debug, FromRow)]
pub struct StrategyConfigModel {
    pub strategy_id: String,
    pub config_json: Json<Value>,
    pub updated_at: DateTime<Utc>,
}
