use chrono::NaiveDate;
use sqlx::PgExecutor;

use crate::db::models::backtest_runs::BacktestRunModel;

macro_rules! run_columns {
    () => {
        "run_id::text AS run_id, strategy_id, universe_id, config_json, metrics_json, start_date, end_date, created_at"
    };
}

/// Runs with metrics for a strategy, newest first
pub async fn get_runs_for_strategy<'e, E>(executor: E, strategy_id: &str) -> Result<Vec<BacktestRunModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BacktestRunModel>(concat!(
        "SELECT ",
        run_columns!(),
        r#"
        FROM backtest_runs
        WHERE strategy_id = $1
          AND metrics_json IS NOT NULL
          AND metrics_json <> '{}'::jsonb
        ORDER BY created_at DESC
        "#
    ))
    .bind(strategy_id)
    .fetch_all(executor)
    .await
}

/// Runs whose whole date range lies inside [start, end]
pub async fn get_runs_in_window<'e, E>(
    executor: E,
    strategy_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<BacktestRunModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BacktestRunModel>(concat!(
        "SELECT ",
        run_columns!(),
        r#"
        FROM backtest_runs
        WHERE strategy_id = $1
          AND metrics_json IS NOT NULL
          AND metrics_json <> '{}'::jsonb
          AND start_date >= $2
          AND end_date <= $3
        ORDER BY created_at DESC
        "#
    ))
    .bind(strategy_id)
    .bind(start)
    .bind(end)
    .fetch_all(executor)
    .await
}
