use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::config_value::{ConfigMap, ConfigValue};
use super::types::{
    BacktestRunRecord, ConfigChange, ConfigProposal, DateWindow, PeriodMetrics, ProposalStatus,
};
use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub strategy_id: Option<String>,
    pub status: Option<ProposalStatus>,
    pub limit: Option<usize>,
}

impl ProposalFilter {
    pub fn approved(strategy_id: Option<&str>, limit: usize) -> Self {
        Self {
            strategy_id: strategy_id.map(str::to_string),
            status: Some(ProposalStatus::Approved),
            limit: Some(limit),
        }
    }

    pub fn pending(strategy_id: Option<&str>) -> Self {
        Self {
            strategy_id: strategy_id.map(str::to_string),
            status: Some(ProposalStatus::Pending),
            limit: None,
        }
    }

    pub fn matches(&self, proposal: &ConfigProposal) -> bool {
        self.strategy_id.as_deref().is_none_or(|s| s == proposal.strategy_id)
            && self.status.is_none_or(|s| s == proposal.status)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub strategy_id: Option<String>,
    pub is_reverted: Option<bool>,
    pub limit: Option<usize>,
}

impl ChangeFilter {
    pub fn matches(&self, change: &ConfigChange) -> bool {
        self.strategy_id.as_deref().is_none_or(|s| s == change.strategy_id)
            && self.is_reverted.is_none_or(|r| r == change.is_reverted)
    }
}

/// Persistence for backtest runs, proposals, the change log and live strategy configs.
///
/// Reads outside a transaction see committed state only. Every lifecycle
/// mutation goes through [`StoreTx`] so it lands atomically or not at all.
#[async_trait]
pub trait MetaStore: Send + Sync {
    type Tx: StoreTx;

    /// Runs with non-empty metrics, newest first
    async fn load_backtest_runs(&self, strategy_id: &str) -> Result<Vec<BacktestRunRecord>, StoreError>;

    /// Runs whose start and end dates both fall inside `window`
    async fn load_backtest_runs_in_window(
        &self,
        strategy_id: &str,
        window: DateWindow,
    ) -> Result<Vec<BacktestRunRecord>, StoreError>;

    async fn save_proposals(&self, proposals: &[ConfigProposal]) -> Result<(), StoreError>;

    async fn load_proposal(&self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError>;

    /// Matching proposals ordered by expected Sharpe improvement, highest first
    async fn load_proposals(&self, filter: &ProposalFilter) -> Result<Vec<ConfigProposal>, StoreError>;

    async fn load_change(&self, change_id: &str) -> Result<Option<ConfigChange>, StoreError>;

    /// Matching changes, most recently applied first
    async fn list_changes(&self, filter: &ChangeFilter) -> Result<Vec<ConfigChange>, StoreError>;

    async fn record_change_evaluation(
        &self,
        change_id: &str,
        before: &PeriodMetrics,
        after: &PeriodMetrics,
        window: DateWindow,
    ) -> Result<(), StoreError>;

    async fn load_strategy_config(&self, strategy_id: &str) -> Result<ConfigMap, StoreError>;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// A unit of work. Dropping without [`StoreTx::commit`] discards every write.
#[async_trait]
pub trait StoreTx: Send {
    async fn load_proposal_for_update(&mut self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError>;

    async fn load_change_for_update(&mut self, change_id: &str) -> Result<Option<ConfigChange>, StoreError>;

    async fn read_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
    ) -> Result<Option<ConfigValue>, StoreError>;

    /// Set one component of the live config; `None` removes the key
    async fn write_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
        value: Option<&ConfigValue>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_change(&mut self, change: &ConfigChange) -> Result<(), StoreError>;

    /// Moves a proposal to `status`, stamping `applied_at` / `reverted_at` where relevant
    async fn set_proposal_status(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Records an approve / reject decision
    async fn set_proposal_decision(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        decided_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_change_reverted(
        &mut self,
        change_id: &str,
        reason: &str,
        reverted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
