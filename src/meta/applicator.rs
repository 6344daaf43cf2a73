use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::config_value::ConfigValue;
use super::meta_constants::DRY_RUN_CHANGE_ID;
use super::performance::aggregate;
use super::store::{MetaStore, ProposalFilter, StoreTx};
use super::types::{ConfigChange, DateWindow, PeriodMetrics, ProposalStatus};
use crate::error::{DomainError, MetaError};

/// Structured outcome of [`ProposalApplicator::apply_proposal`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationResult {
    pub success: bool,
    pub proposal_id: String,
    pub change_id: Option<String>,
    pub error_message: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Structured outcome of [`ProposalApplicator::revert_change`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReversionResult {
    pub success: bool,
    pub change_id: String,
    pub restored_value: Option<ConfigValue>,
    pub error_message: Option<String>,
    pub reverted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub change_id: String,
    pub previous_value: Option<ConfigValue>,
    pub new_value: ConfigValue,
    pub applied_at: DateTime<Utc>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevertedChange {
    pub change_id: String,
    pub restored_value: Option<ConfigValue>,
    pub reverted_at: DateTime<Utc>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvaluation {
    pub change_id: String,
    pub before: PeriodMetrics,
    pub after: PeriodMetrics,
    pub improvement: PeriodMetrics, // after - before
    pub window: DateWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub first_failure: Option<String>,
}

impl BatchSummary {
    pub fn from_results(results: &[ApplicationResult]) -> Self {
        Self {
            attempted: results.len(),
            succeeded: results.iter().filter(|r| r.success).count(),
            first_failure: results
                .iter()
                .find(|r| !r.success)
                .and_then(|r| r.error_message.clone()),
        }
    }
}

/// Applies approved proposals to the live strategy config and reverts them.
///
/// Each apply and revert is a single store transaction: the status check,
/// the config rewrite, the change-log write and the proposal status update
/// land together or not at all.
pub struct ProposalApplicator<S> {
    store: Arc<S>,
    dry_run: bool,
}

impl<S: MetaStore> ProposalApplicator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, dry_run: false }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[instrument(name = "apply", skip(self), fields(on_close = true))]
    pub async fn apply(&self, proposal_id: &str, applied_by: &str) -> Result<AppliedChange, MetaError> {
        let mut tx = self.store.begin().await?;

        let proposal = tx
            .load_proposal_for_update(proposal_id)
            .await?
            .ok_or_else(|| DomainError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Approved {
            return Err(DomainError::InvalidStatus {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
                expected: ProposalStatus::Approved,
            }
            .into());
        }

        let missing = |field| DomainError::MissingField {
            proposal_id: proposal_id.to_string(),
            field,
        };
        if proposal.strategy_id.is_empty() {
            return Err(missing("strategy_id").into());
        }
        if proposal.target_component.is_empty() {
            return Err(missing("target_component").into());
        }
        let new_value = proposal.proposed_value.clone().ok_or_else(|| missing("proposed_value"))?;

        let previous_value = tx
            .read_config_component(&proposal.strategy_id, &proposal.target_component)
            .await?;
        let applied_at = Utc::now();

        if self.dry_run {
            info!(
                proposal_id,
                strategy_id = %proposal.strategy_id,
                component = %proposal.target_component,
                new_value = %new_value,
                "Dry run, proposal not applied"
            );
            return Ok(AppliedChange {
                change_id: DRY_RUN_CHANGE_ID.to_string(),
                previous_value,
                new_value,
                applied_at,
                dry_run: true,
            });
        }

        tx.write_config_component(
            &proposal.strategy_id,
            &proposal.target_component,
            Some(&new_value),
            applied_at,
        )
        .await?;

        let change = ConfigChange {
            change_id: Uuid::new_v4().to_string(),
            proposal_id: Some(proposal.proposal_id.clone()),
            strategy_id: proposal.strategy_id.clone(),
            market_id: proposal.market_id.clone(),
            change_type: proposal.proposal_type,
            target_component: proposal.target_component.clone(),
            previous_value: previous_value.clone(),
            new_value: new_value.clone(),
            applied_by: applied_by.to_string(),
            applied_at,
            is_reverted: false,
            reverted_at: None,
            reverted_by: None,
            reversion_reason: None,
            sharpe_before: None,
            sharpe_after: None,
            return_before: None,
            return_after: None,
            risk_before: None,
            risk_after: None,
            evaluation_start_date: None,
            evaluation_end_date: None,
        };
        tx.insert_change(&change).await?;
        tx.set_proposal_status(proposal_id, ProposalStatus::Applied, applied_at).await?;
        tx.commit().await?;

        info!(
            proposal_id,
            change_id = %change.change_id,
            strategy_id = %change.strategy_id,
            component = %change.target_component,
            previous = ?previous_value.as_ref().map(ToString::to_string),
            new_value = %new_value,
            applied_by,
            "Proposal applied"
        );

        Ok(AppliedChange {
            change_id: change.change_id,
            previous_value,
            new_value,
            applied_at,
            dry_run: false,
        })
    }

    /// [`Self::apply`] with every error folded into `success = false`
    pub async fn apply_proposal(&self, proposal_id: &str, applied_by: &str) -> ApplicationResult {
        match self.apply(proposal_id, applied_by).await {
            Ok(applied) => ApplicationResult {
                success: true,
                proposal_id: proposal_id.to_string(),
                change_id: Some(applied.change_id),
                error_message: None,
                applied_at: Some(applied.applied_at),
            },
            Err(e) => {
                log_failure(&e, "apply", proposal_id);
                ApplicationResult {
                    success: false,
                    proposal_id: proposal_id.to_string(),
                    change_id: None,
                    error_message: Some(e.to_string()),
                    applied_at: None,
                }
            }
        }
    }

    /// Applies up to `max_proposals` approved proposals, best expected Sharpe
    /// first, stopping after the first failure
    pub async fn apply_approved_proposals(
        &self,
        strategy_id: Option<&str>,
        applied_by: &str,
        max_proposals: usize,
    ) -> Result<Vec<ApplicationResult>, MetaError> {
        let proposals = self
            .store
            .load_proposals(&ProposalFilter::approved(strategy_id, max_proposals))
            .await?;
        info!(strategy_id = ?strategy_id, count = proposals.len(), "Applying approved proposals");

        let mut results = Vec::with_capacity(proposals.len());
        for proposal in &proposals {
            let result = self.apply_proposal(&proposal.proposal_id, applied_by).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                warn!(proposal_id = %proposal.proposal_id, "Stopping batch after failed application");
                break;
            }
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            first_failure = ?summary.first_failure,
            "Batch application finished"
        );
        Ok(results)
    }

    #[instrument(name = "revert", skip(self), fields(on_close = true))]
    pub async fn revert(&self, change_id: &str, reason: &str, reverted_by: &str) -> Result<RevertedChange, MetaError> {
        let mut tx = self.store.begin().await?;

        let change = tx
            .load_change_for_update(change_id)
            .await?
            .ok_or_else(|| DomainError::ChangeNotFound(change_id.to_string()))?;

        if change.is_reverted {
            return Err(DomainError::AlreadyReverted(change_id.to_string()).into());
        }

        let mut linked_proposal = None;
        if let Some(proposal_id) = &change.proposal_id {
            match tx.load_proposal_for_update(proposal_id).await? {
                Some(proposal) if !proposal.status.can_transition_to(ProposalStatus::Reverted) => {
                    return Err(DomainError::InvalidTransition {
                        proposal_id: proposal_id.clone(),
                        from: proposal.status,
                        to: ProposalStatus::Reverted,
                    }
                    .into());
                }
                Some(_) => linked_proposal = Some(proposal_id.as_str()),
                None => warn!(change_id, proposal_id = %proposal_id, "Linked proposal no longer exists"),
            }
        }

        let reverted_at = Utc::now();
        if self.dry_run {
            info!(
                change_id,
                component = %change.target_component,
                "Dry run, change not reverted"
            );
            return Ok(RevertedChange {
                change_id: change_id.to_string(),
                restored_value: change.previous_value,
                reverted_at,
                dry_run: true,
            });
        }

        tx.write_config_component(
            &change.strategy_id,
            &change.target_component,
            change.previous_value.as_ref(),
            reverted_at,
        )
        .await?;
        tx.mark_change_reverted(change_id, reason, reverted_by, reverted_at).await?;

        if let Some(proposal_id) = linked_proposal {
            tx.set_proposal_status(proposal_id, ProposalStatus::Reverted, reverted_at).await?;
        }
        tx.commit().await?;

        info!(
            change_id,
            strategy_id = %change.strategy_id,
            component = %change.target_component,
            restored = ?change.previous_value.as_ref().map(ToString::to_string),
            reason,
            reverted_by,
            "Change reverted"
        );

        Ok(RevertedChange {
            change_id: change_id.to_string(),
            restored_value: change.previous_value,
            reverted_at,
            dry_run: false,
        })
    }

    /// [`Self::revert`] with every error folded into `success = false`
    pub async fn revert_change(&self, change_id: &str, reason: &str, reverted_by: &str) -> ReversionResult {
        match self.revert(change_id, reason, reverted_by).await {
            Ok(reverted) => ReversionResult {
                success: true,
                change_id: reverted.change_id,
                restored_value: reverted.restored_value,
                error_message: None,
                reverted_at: Some(reverted.reverted_at),
            },
            Err(e) => {
                log_failure(&e, "revert", change_id);
                ReversionResult {
                    success: false,
                    change_id: change_id.to_string(),
                    restored_value: None,
                    error_message: Some(e.to_string()),
                    reverted_at: None,
                }
            }
        }
    }

    /// Compares runs that finished before the change with runs that started
    /// on or after it, and records the numbers on the change. Never touches
    /// proposal or change status.
    pub async fn evaluate_change_performance(
        &self,
        change_id: &str,
        eval_start: NaiveDate,
        eval_end: NaiveDate,
    ) -> Result<ChangeEvaluation, MetaError> {
        let change = self
            .store
            .load_change(change_id)
            .await?
            .ok_or_else(|| DomainError::ChangeNotFound(change_id.to_string()))?;

        let applied_date = change.applied_at.date_naive();
        let before_window = DateWindow {
            start: eval_start,
            end: applied_date.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN),
        };
        let after_window = DateWindow {
            start: applied_date,
            end: eval_end,
        };

        let before_runs = self
            .store
            .load_backtest_runs_in_window(&change.strategy_id, before_window)
            .await?;
        let after_runs = self
            .store
            .load_backtest_runs_in_window(&change.strategy_id, after_window)
            .await?;

        let before = PeriodMetrics::from(&aggregate(&before_runs));
        let after = PeriodMetrics::from(&aggregate(&after_runs));
        let window = DateWindow {
            start: eval_start,
            end: eval_end,
        };

        self.store
            .record_change_evaluation(change_id, &before, &after, window)
            .await?;

        let improvement = after.delta(&before);
        info!(
            change_id,
            before_runs = before_runs.len(),
            after_runs = after_runs.len(),
            sharpe_improvement = improvement.sharpe,
            "Change evaluated"
        );

        Ok(ChangeEvaluation {
            change_id: change_id.to_string(),
            before,
            after,
            improvement,
            window,
        })
    }
}

fn log_failure(e: &MetaError, operation: &str, id: &str) {
    match e {
        MetaError::Domain(_) => warn!(operation, id, error = %e, "Lifecycle precondition failed"),
        MetaError::Store(_) => error!(operation, id, error = %e, "Store failure, nothing was changed"),
    }
}
