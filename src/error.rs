use thiserror::Error;

use crate::meta::types::ProposalStatus;

/// Expected, caller-recoverable conditions of the tuning lifecycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Insufficient data: {available} runs available for {strategy_id}, need {required}")]
    InsufficientData {
        strategy_id: String,
        available: usize,
        required: usize,
    },

    #[error("Proposal {0} not found")]
    ProposalNotFound(String),

    #[error("Change {0} not found")]
    ChangeNotFound(String),

    #[error("Proposal status is {status}, must be {expected}")]
    InvalidStatus {
        proposal_id: String,
        status: ProposalStatus,
        expected: ProposalStatus,
    },

    #[error("Missing {field}")]
    MissingField {
        proposal_id: String,
        field: &'static str,
    },

    #[error("Change already reverted")]
    AlreadyReverted(String),

    #[error("Proposal {proposal_id} cannot move from {from} to {to}")]
    InvalidTransition {
        proposal_id: String,
        from: ProposalStatus,
        to: ProposalStatus,
    },
}

/// Failures of the backing store (database unreachable, malformed rows, ...).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed {entity} row {id}: {reason}")]
    Decode {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum MetaError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MetaError {
    pub fn is_domain(&self) -> bool {
        matches!(self, MetaError::Domain(_))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            MetaError::Domain(e) => Some(e),
            MetaError::Store(_) => None,
        }
    }
}
