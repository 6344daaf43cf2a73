use sqlx::{
    Executor,
    postgres::PgPool,
};

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("backtest_runs.sql")).await?;
    pool.execute(include_str!("meta_config_proposals.sql")).await?;
    pool.execute(include_str!("config_change_log.sql")).await?;
    pool.execute(include_str!("strategy_configs.sql")).await?;

    // Run lookups by strategy, newest first
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_backtest_runs_strategy_created
        ON backtest_runs(strategy_id, created_at DESC);
        "#
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_meta_config_proposals_strategy_status
        ON meta_config_proposals(strategy_id, status, expected_sharpe_improvement DESC);
        "#
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_config_change_log_strategy_applied
        ON config_change_log(strategy_id, applied_at DESC);
        "#
    )
    .execute(pool)
    .await?;

    Ok(())
}
