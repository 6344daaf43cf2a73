use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::connection;
use super::schema;
use super::models::{
    config_map_from_json,
    optional_config_value,
    backtest_runs::BacktestRunModel,
    config_change_log::NewConfigChangeModel,
    config_proposals::NewConfigProposalModel,
};
use super::queries::{
    backtest_runs as runs_queries,
    config_change_log as changes_queries,
    config_proposals as proposals_queries,
    strategy_configs as configs_queries,
};
use crate::config::Config;
use crate::error::StoreError;
use crate::meta::config_value::{ConfigMap, ConfigValue};
use crate::meta::store::{ChangeFilter, MetaStore, ProposalFilter, StoreTx};
use crate::meta::types::{
    BacktestRunRecord, ConfigChange, ConfigProposal, DateWindow, PeriodMetrics, ProposalStatus,
};

/// Postgres-backed [`MetaStore`]
pub struct DbManager {
    pub pool: PgPool,
}

impl DbManager {
    /// Creates a new database connection and initializes the schema
    pub async fn init(config: &Config) -> Result<Self, StoreError> {
        let pool = connection::create_pool(config).await?;

        // Ensure schema is initialized (creates tables if needed)
        schema::init_schema(&pool).await?;
        info!("Database schema ready");

        Ok(Self { pool })
    }
}

fn to_runs(models: Vec<BacktestRunModel>) -> Result<Vec<BacktestRunRecord>, StoreError> {
    models.into_iter().map(BacktestRunRecord::try_from).collect()
}

fn ensure_updated(rows: u64, entity: &str, id: &str) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::Backend(format!("{} {} does not exist", entity, id)));
    }
    Ok(())
}

fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX))
}

#[async_trait]
impl MetaStore for DbManager {
    type Tx = PgTx;

    async fn load_backtest_runs(&self, strategy_id: &str) -> Result<Vec<BacktestRunRecord>, StoreError> {
        let models = runs_queries::get_runs_for_strategy(&self.pool, strategy_id).await?;
        debug!(strategy_id, rows = models.len(), "Fetched backtest runs");
        to_runs(models)
    }

    async fn load_backtest_runs_in_window(
        &self,
        strategy_id: &str,
        window: DateWindow,
    ) -> Result<Vec<BacktestRunRecord>, StoreError> {
        let models = runs_queries::get_runs_in_window(&self.pool, strategy_id, window.start, window.end).await?;
        to_runs(models)
    }

    async fn save_proposals(&self, proposals: &[ConfigProposal]) -> Result<(), StoreError> {
        // All or nothing
        let mut tx = self.pool.begin().await?;
        for proposal in proposals {
            let new_proposal = NewConfigProposalModel::from(proposal);
            proposals_queries::insert_proposal(&mut *tx, &new_proposal).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_proposal(&self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError> {
        proposals_queries::get_proposal(&self.pool, proposal_id)
            .await?
            .map(ConfigProposal::try_from)
            .transpose()
    }

    async fn load_proposals(&self, filter: &ProposalFilter) -> Result<Vec<ConfigProposal>, StoreError> {
        let models = proposals_queries::get_proposals(
            &self.pool,
            filter.strategy_id.as_deref(),
            filter.status.map(|s| s.as_str()),
            limit_param(filter.limit),
        )
        .await?;
        models.into_iter().map(ConfigProposal::try_from).collect()
    }

    async fn load_change(&self, change_id: &str) -> Result<Option<ConfigChange>, StoreError> {
        changes_queries::get_change(&self.pool, change_id)
            .await?
            .map(ConfigChange::try_from)
            .transpose()
    }

    async fn list_changes(&self, filter: &ChangeFilter) -> Result<Vec<ConfigChange>, StoreError> {
        let models = changes_queries::get_changes(
            &self.pool,
            filter.strategy_id.as_deref(),
            filter.is_reverted,
            limit_param(filter.limit),
        )
        .await?;
        models.into_iter().map(ConfigChange::try_from).collect()
    }

    async fn record_change_evaluation(
        &self,
        change_id: &str,
        before: &PeriodMetrics,
        after: &PeriodMetrics,
        window: DateWindow,
    ) -> Result<(), StoreError> {
        let rows = changes_queries::update_evaluation(
            &self.pool,
            change_id,
            (before.sharpe, after.sharpe),
            (before.cumulative_return, after.cumulative_return),
            (before.volatility, after.volatility),
            window.start,
            window.end,
        )
        .await?;
        ensure_updated(rows, "change", change_id)
    }

    async fn load_strategy_config(&self, strategy_id: &str) -> Result<ConfigMap, StoreError> {
        match configs_queries::get_strategy_config(&self.pool, strategy_id).await? {
            Some(model) => config_map_from_json("strategy_config", strategy_id, &model.config_json.0),
            None => Ok(ConfigMap::new()),
        }
    }

    async fn begin(&self) -> Result<PgTx, StoreError> {
        Ok(PgTx { tx: self.pool.begin().await? })
    }
}

/// A Postgres transaction. Rows read `for_update` stay locked until commit or drop.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn load_proposal_for_update(&mut self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError> {
        proposals_queries::get_proposal_for_update(&mut *self.tx, proposal_id)
            .await?
            .map(ConfigProposal::try_from)
            .transpose()
    }

    async fn load_change_for_update(&mut self, change_id: &str) -> Result<Option<ConfigChange>, StoreError> {
        changes_queries::get_change_for_update(&mut *self.tx, change_id)
            .await?
            .map(ConfigChange::try_from)
            .transpose()
    }

    async fn read_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
    ) -> Result<Option<ConfigValue>, StoreError> {
        let raw = configs_queries::get_component_for_update(&mut *self.tx, strategy_id, component).await?;
        // A key holding JSON null reads as absent
        optional_config_value("strategy_config", strategy_id, component, raw.as_ref())
    }

    async fn write_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
        value: Option<&ConfigValue>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match value {
            Some(value) => {
                configs_queries::set_component(&mut *self.tx, strategy_id, component, &value.to_json(), at).await?
            }
            None => configs_queries::remove_component(&mut *self.tx, strategy_id, component, at).await?,
        }
        Ok(())
    }

    async fn insert_change(&mut self, change: &ConfigChange) -> Result<(), StoreError> {
        let new_change = NewConfigChangeModel::from(change);
        changes_queries::insert_change(&mut *self.tx, &new_change).await?;
        Ok(())
    }

    async fn set_proposal_status(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows = proposals_queries::update_proposal_status(&mut *self.tx, proposal_id, status.as_str(), at).await?;
        ensure_updated(rows, "proposal", proposal_id)
    }

    async fn set_proposal_decision(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        decided_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows =
            proposals_queries::update_proposal_decision(&mut *self.tx, proposal_id, status.as_str(), decided_by, at)
                .await?;
        ensure_updated(rows, "proposal", proposal_id)
    }

    async fn mark_change_reverted(
        &mut self,
        change_id: &str,
        reason: &str,
        reverted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows = changes_queries::mark_reverted(&mut *self.tx, change_id, reason, reverted_by, at).await?;
        ensure_updated(rows, "change", change_id)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
