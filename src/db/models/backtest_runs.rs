use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

use super::{config_map_from_json, metrics_from_json};
use crate::error::StoreError;
use crate::meta::types::BacktestRunRecord;

#[derive(Debug, FromRow)]
pub struct BacktestRunModel {
    pub run_id: String, // selected as run_id::text
    pub strategy_id: String,
    pub universe_id: Option<String>,
    pub config_json: Json<Value>,
    pub metrics_json: Option<Json<Value>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BacktestRunModel> for BacktestRunRecord {
    type Error = StoreError;

    fn try_from(model: BacktestRunModel) -> Result<Self, Self::Error> {
        let config = config_map_from_json("backtest_run", &model.run_id, &model.config_json.0)?;
        let metrics = model
            .metrics_json
            .as_ref()
            .map(|m| metrics_from_json(&m.0))
            .unwrap_or_default();

        Ok(BacktestRunRecord {
            run_id: model.run_id,
            strategy_id: model.strategy_id,
            universe_id: model.universe_id,
            config,
            metrics,
            start_date: model.start_date,
            end_date: model.end_date,
            created_at: model.created_at,
        })
    }
}
