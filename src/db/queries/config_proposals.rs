use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::db::models::config_proposals::{ConfigProposalModel, NewConfigProposalModel};

macro_rules! proposal_columns {
    () => {
        r#"
        proposal_id, strategy_id, market_id, proposal_type, target_component,
        current_value, proposed_value, confidence_score, expected_sharpe_improvement,
        expected_return_improvement, expected_risk_reduction, rationale, supporting_metrics,
        status, approved_by, approved_at, applied_at, reverted_at, created_at
        "#
    };
}

pub async fn insert_proposal<'e, E>(executor: E, proposal: &NewConfigProposalModel) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO meta_config_proposals (
            proposal_id, strategy_id, market_id, proposal_type, target_component,
            current_value, proposed_value, confidence_score, expected_sharpe_improvement,
            expected_return_improvement, expected_risk_reduction, rationale, supporting_metrics,
            status, created_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
        "#,
    )
    .bind(&proposal.proposal_id)
    .bind(&proposal.strategy_id)
    .bind(&proposal.market_id)
    .bind(&proposal.proposal_type)
    .bind(&proposal.target_component)
    .bind(&proposal.current_value)
    .bind(&proposal.proposed_value)
    .bind(proposal.confidence_score)
    .bind(proposal.expected_sharpe_improvement)
    .bind(proposal.expected_return_improvement)
    .bind(proposal.expected_risk_reduction)
    .bind(&proposal.rationale)
    .bind(&proposal.supporting_metrics)
    .bind(&proposal.status)
    .bind(proposal.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_proposal<'e, E>(executor: E, proposal_id: &str) -> Result<Option<ConfigProposalModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigProposalModel>(concat!(
        "SELECT ",
        proposal_columns!(),
        "FROM meta_config_proposals WHERE proposal_id = $1"
    ))
    .bind(proposal_id)
    .fetch_optional(executor)
    .await
}

/// Same as [`get_proposal`] but row-locks the proposal until the transaction ends
pub async fn get_proposal_for_update<'e, E>(
    executor: E,
    proposal_id: &str,
) -> Result<Option<ConfigProposalModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigProposalModel>(concat!(
        "SELECT ",
        proposal_columns!(),
        "FROM meta_config_proposals WHERE proposal_id = $1 FOR UPDATE"
    ))
    .bind(proposal_id)
    .fetch_optional(executor)
    .await
}

/// Filters are optional; a `None` limit returns every match
pub async fn get_proposals<'e, E>(
    executor: E,
    strategy_id: Option<&str>,
    status: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<ConfigProposalModel>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ConfigProposalModel>(concat!(
        "SELECT ",
        proposal_columns!(),
        r#"
        FROM meta_config_proposals
        WHERE ($1::text IS NULL OR strategy_id = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY expected_sharpe_improvement DESC, created_at ASC
        LIMIT $3
        "#
    ))
    .bind(strategy_id)
    .bind(status)
    .bind(limit)
    .fetch_all(executor)
    .await
}

pub async fn update_proposal_status<'e, E>(
    executor: E,
    proposal_id: &str,
    status: &str,
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE meta_config_proposals
        SET status = $2,
            applied_at = CASE WHEN $2 = 'APPLIED' THEN $3 ELSE applied_at END,
            reverted_at = CASE WHEN $2 = 'REVERTED' THEN $3 ELSE reverted_at END
        WHERE proposal_id = $1
        "#,
    )
    .bind(proposal_id)
    .bind(status)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_proposal_decision<'e, E>(
    executor: E,
    proposal_id: &str,
    status: &str,
    decided_by: &str,
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE meta_config_proposals
        SET status = $2, approved_by = $3, approved_at = $4
        WHERE proposal_id = $1
        "#,
    )
    .bind(proposal_id)
    .bind(status)
    .bind(decided_by)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
