use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgExecutor;

use crate::db::models::config_change_log::{ConfigChangeModel, NewConfigChangeModel};

macro_rules! change_columns {
    () => {
        r#"
        change_id, proposal_id, strategy_id, market_id, change_type, target_component,
        previous_value, new_value, applied_by, applied_at, is_reverted, reverted_at,
        reverted_by, reversion_reason, sharpe_before, sharpe_after, return_before,
        return_after, risk_before, risk_after, evaluation_start_date, evaluation_end_date
        "#
    };
}

pub async fn insert_change<'e, E>(executor: E, change: &NewConfigChangeModel) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO config_change_log (
            change_id, proposal_id, strategy_id, market_id, change_type, target_component,
            previous_value, new_value, applied_by, applied_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        "#,
    )
    .bind(&change.change_id)
    .bind(&change.proposal_id)
    .bind(&change.strategy_id)
    .bind(&change.market_id)
    .bind(&change.change_type)
    .bind(&change.target_component)
    .bind(&change.previous_value)
    .bind(&change.new_value)
    .bind(&change.applied_by)
    .bind(change.applied_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_change<'e, E>(executor: E, change_id: &str) -> Result<Option<ConfigChangeModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigChangeModel>(concat!(
        "SELECT ",
        change_columns!(),
        "FROM config_change_log WHERE change_id = $1"
    ))
    .bind(change_id)
    .fetch_optional(executor)
    .await
}

pub async fn get_change_for_update<'e, E>(executor: E, change_id: &str) -> Result<Option<ConfigChangeModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigChangeModel>(concat!(
        "SELECT ",
        change_columns!(),
        "FROM config_change_log WHERE change_id = $1 FOR UPDATE"
    ))
    .bind(change_id)
    .fetch_optional(executor)
    .await
}

pub async fn get_changes<'e, E>(
    executor: E,
    strategy_id: Option<&str>,
    is_reverted: Option<bool>,
    limit: Option<i64>,
) -> Result<Vec<ConfigChangeModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigChangeModel>(concat!(
        "SELECT ",
        change_columns!(),
        r#"
        FROM config_change_log
        WHERE ($1::text IS NULL OR strategy_id = $1)
          AND ($2::boolean IS NULL OR is_reverted = $2)
        ORDER BY applied_at DESC
        LIMIT $3
        "#
    ))
    .bind(strategy_id)
    .bind(is_reverted)
    .bind(limit)
    .fetch_all(executor)
    .await
}

pub async fn mark_reverted<'e, E>(
    executor: E,
    change_id: &str,
    reason: &str,
    reverted_by: &str,
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE config_change_log
        SET is_reverted = TRUE, reverted_at = $2, reverted_by = $3, reversion_reason = $4
        WHERE change_id = $1
        "#,
    )
    .bind(change_id)
    .bind(at)
    .bind(reverted_by)
    .bind(reason)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[allow(clippy::too_many_arguments)]
pub async fn update_evaluation<'e, E>(
    executor: E,
    change_id: &str,
    (sharpe_before, sharpe_after): (f64, f64),
    (return_before, return_after): (f64, f64),
    (risk_before, risk_after): (f64, f64),
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE config_change_log
        SET sharpe_before = $2, sharpe_after = $3,
            return_before = $4, return_after = $5,
            risk_before = $6, risk_after = $7,
            evaluation_start_date = $8, evaluation_end_date = $9
        WHERE change_id = $1
        "#,
    )
    .bind(change_id)
    .bind(sharpe_before)
    .bind(sharpe_after)
    .bind(return_before)
    .bind(return_after)
    .bind(risk_before)
    .bind(risk_after)
    .bind(start)
    .bind(end)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
