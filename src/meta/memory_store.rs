use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::config_value::{ConfigMap, ConfigValue};
use super::store::{ChangeFilter, MetaStore, ProposalFilter, StoreTx};
use super::types::{
    BacktestRunRecord, ConfigChange, ConfigProposal, DateWindow, PeriodMetrics, ProposalStatus,
};
use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    runs: Vec<BacktestRunRecord>,
    proposals: Vec<ConfigProposal>,
    changes: Vec<ConfigChange>,
    configs: BTreeMap<String, ConfigMap>,
    fail_change_inserts: bool,
}

impl MemoryState {
    fn proposal_mut(&mut self, proposal_id: &str) -> Result<&mut ConfigProposal, StoreError> {
        self.proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal_id)
            .ok_or_else(|| StoreError::Backend(format!("proposal {} does not exist", proposal_id)))
    }

    fn change_mut(&mut self, change_id: &str) -> Result<&mut ConfigChange, StoreError> {
        self.changes
            .iter_mut()
            .find(|c| c.change_id == change_id)
            .ok_or_else(|| StoreError::Backend(format!("change {} does not exist", change_id)))
    }
}

/// In-process [`MetaStore`] with the same ordering and transaction semantics
/// as the Postgres store. A transaction holds the whole state lock and works
/// on a staged copy that replaces the state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_run(&self, run: BacktestRunRecord) {
        self.state.lock().await.runs.push(run);
    }

    pub async fn insert_runs<I: IntoIterator<Item = BacktestRunRecord>>(&self, runs: I) {
        self.state.lock().await.runs.extend(runs);
    }

    pub async fn insert_proposal(&self, proposal: ConfigProposal) {
        self.state.lock().await.proposals.push(proposal);
    }

    pub async fn set_strategy_config(&self, strategy_id: &str, config: ConfigMap) {
        self.state.lock().await.configs.insert(strategy_id.to_string(), config);
    }

    /// Mutates the live config outside of the proposal lifecycle
    pub async fn set_config_component(&self, strategy_id: &str, component: &str, value: ConfigValue) {
        self.state
            .lock()
            .await
            .configs
            .entry(strategy_id.to_string())
            .or_default()
            .insert(component.to_string(), value);
    }

    /// Makes every subsequent change-log insert fail
    pub async fn fail_change_log_inserts(&self, fail: bool) {
        self.state.lock().await.fail_change_inserts = fail;
    }

    pub async fn all_changes(&self) -> Vec<ConfigChange> {
        self.state.lock().await.changes.clone()
    }
}

#[async_trait]
impl MetaStore for MemoryStore {
    type Tx = MemoryTx;

    async fn load_backtest_runs(&self, strategy_id: &str) -> Result<Vec<BacktestRunRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut runs: Vec<BacktestRunRecord> = state
            .runs
            .iter()
            .filter(|r| r.strategy_id == strategy_id && !r.metrics.is_empty())
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn load_backtest_runs_in_window(
        &self,
        strategy_id: &str,
        window: DateWindow,
    ) -> Result<Vec<BacktestRunRecord>, StoreError> {
        let runs = self.load_backtest_runs(strategy_id).await?;
        Ok(runs.into_iter().filter(|r| window.contains_run(r)).collect())
    }

    async fn save_proposals(&self, proposals: &[ConfigProposal]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(dup) = proposals
            .iter()
            .find(|p| state.proposals.iter().any(|q| q.proposal_id == p.proposal_id))
        {
            return Err(StoreError::Backend(format!("proposal {} already exists", dup.proposal_id)));
        }
        state.proposals.extend_from_slice(proposals);
        Ok(())
    }

    async fn load_proposal(&self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.proposals.iter().find(|p| p.proposal_id == proposal_id).cloned())
    }

    async fn load_proposals(&self, filter: &ProposalFilter) -> Result<Vec<ConfigProposal>, StoreError> {
        let state = self.state.lock().await;
        let mut proposals: Vec<ConfigProposal> =
            state.proposals.iter().filter(|p| filter.matches(p)).cloned().collect();
        proposals.sort_by(|a, b| {
            b.expected_sharpe_improvement
                .total_cmp(&a.expected_sharpe_improvement)
        });
        if let Some(limit) = filter.limit {
            proposals.truncate(limit);
        }
        Ok(proposals)
    }

    async fn load_change(&self, change_id: &str) -> Result<Option<ConfigChange>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.changes.iter().find(|c| c.change_id == change_id).cloned())
    }

    async fn list_changes(&self, filter: &ChangeFilter) -> Result<Vec<ConfigChange>, StoreError> {
        let state = self.state.lock().await;
        let mut changes: Vec<ConfigChange> =
            state.changes.iter().filter(|c| filter.matches(c)).cloned().collect();
        changes.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        if let Some(limit) = filter.limit {
            changes.truncate(limit);
        }
        Ok(changes)
    }

    async fn record_change_evaluation(
        &self,
        change_id: &str,
        before: &PeriodMetrics,
        after: &PeriodMetrics,
        window: DateWindow,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let change = state.change_mut(change_id)?;
        change.sharpe_before = Some(before.sharpe);
        change.sharpe_after = Some(after.sharpe);
        change.return_before = Some(before.cumulative_return);
        change.return_after = Some(after.cumulative_return);
        change.risk_before = Some(before.volatility);
        change.risk_after = Some(after.volatility);
        change.evaluation_start_date = Some(window.start);
        change.evaluation_end_date = Some(window.end);
        Ok(())
    }

    async fn load_strategy_config(&self, strategy_id: &str) -> Result<ConfigMap, StoreError> {
        let state = self.state.lock().await;
        Ok(state.configs.get(strategy_id).cloned().unwrap_or_default())
    }

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn load_proposal_for_update(&mut self, proposal_id: &str) -> Result<Option<ConfigProposal>, StoreError> {
        Ok(self.staged.proposals.iter().find(|p| p.proposal_id == proposal_id).cloned())
    }

    async fn load_change_for_update(&mut self, change_id: &str) -> Result<Option<ConfigChange>, StoreError> {
        Ok(self.staged.changes.iter().find(|c| c.change_id == change_id).cloned())
    }

    async fn read_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
    ) -> Result<Option<ConfigValue>, StoreError> {
        Ok(self
            .staged
            .configs
            .get(strategy_id)
            .and_then(|config| config.get(component))
            .cloned())
    }

    async fn write_config_component(
        &mut self,
        strategy_id: &str,
        component: &str,
        value: Option<&ConfigValue>,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let config = self.staged.configs.entry(strategy_id.to_string()).or_default();
        match value {
            Some(value) => {
                config.insert(component.to_string(), value.clone());
            }
            None => {
                config.remove(component);
            }
        }
        Ok(())
    }

    async fn insert_change(&mut self, change: &ConfigChange) -> Result<(), StoreError> {
        if self.staged.fail_change_inserts {
            return Err(StoreError::Backend("change log insert rejected".to_string()));
        }
        self.staged.changes.push(change.clone());
        Ok(())
    }

    async fn set_proposal_status(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let proposal = self.staged.proposal_mut(proposal_id)?;
        proposal.status = status;
        match status {
            ProposalStatus::Applied => proposal.applied_at = Some(at),
            ProposalStatus::Reverted => proposal.reverted_at = Some(at),
            _ => {}
        }
        Ok(())
    }

    async fn set_proposal_decision(
        &mut self,
        proposal_id: &str,
        status: ProposalStatus,
        decided_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let proposal = self.staged.proposal_mut(proposal_id)?;
        proposal.status = status;
        proposal.approved_by = Some(decided_by.to_string());
        proposal.approved_at = Some(at);
        Ok(())
    }

    async fn mark_change_reverted(
        &mut self,
        change_id: &str,
        reason: &str,
        reverted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let change = self.staged.change_mut(change_id)?;
        change.is_reverted = true;
        change.reverted_at = Some(at);
        change.reverted_by = Some(reverted_by.to_string());
        change.reversion_reason = Some(reason.to_string());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
