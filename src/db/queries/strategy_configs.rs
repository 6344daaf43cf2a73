use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgExecutor;
use sqlx::types::Json;

use crate::db::models::strategy_configs::StrategyConfigModel;

pub async fn get_strategy_config<'e, E>(executor: E, strategy_id: &str) -> Result<Option<StrategyConfigModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, StrategyConfigModel>(
        r#"
        SELECT strategy_id, config_json, updated_at
        FROM strategy_configs
        WHERE strategy_id = $1
        "#,
    )
    .bind(strategy_id)
    .fetch_optional(executor)
    .await
}

/// One component of the live config, locking the strategy row
pub async fn get_component_for_update<'e, E>(
    executor: E,
    strategy_id: &str,
    component: &str,
) -> Result<Option<Value>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let row: Option<Option<Json<Value>>> = sqlx::query_scalar(
        r#"
        SELECT config_json -> $2::text
        FROM strategy_configs
        WHERE strategy_id = $1
        FOR UPDATE
        "#,
    )
    .bind(strategy_id)
    .bind(component)
    .fetch_optional(executor)
    .await?;

    Ok(row.flatten().map(|json| json.0))
}

/// Sets a single key, leaving sibling keys untouched
pub async fn set_component<'e, E>(
    executor: E,
    strategy_id: &str,
    component: &str,
    value: &Value,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO strategy_configs (strategy_id, config_json, updated_at)
        VALUES ($1, jsonb_build_object($2::text, $3::jsonb), $4)
        ON CONFLICT (strategy_id) DO UPDATE
        SET config_json = strategy_configs.config_json || jsonb_build_object($2::text, $3::jsonb),
            updated_at = $4
        "#,
    )
    .bind(strategy_id)
    .bind(component)
    .bind(Json(value))
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn remove_component<'e, E>(
    executor: E,
    strategy_id: &str,
    component: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE strategy_configs
        SET config_json = config_json - $2::text,
            updated_at = $3
        WHERE strategy_id = $1
        "#,
    )
    .bind(strategy_id)
    .bind(component)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}
