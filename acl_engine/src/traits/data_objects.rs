use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Click, Commission, CommissionStatus, Conversion};

//--------------------------------------     ClickResult     ---------------------------------------------------------
/// The outcome of a click submission. A duplicate is a successful, idempotent result, never an
/// error: the caller gets the original row and a flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickResult {
    pub click: Click,
    pub duplicate: bool,
}

//--------------------------------------  ConversionResult   ---------------------------------------------------------
/// The outcome of a conversion submission: the conversion/commission pair, plus a flag indicating
/// that an existing pair was returned because the order id had already been counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub conversion: Conversion,
    pub commission: Commission,
    pub duplicate: bool,
}

//--------------------------------------     BatchAction     ---------------------------------------------------------
/// The transition applied to every commission in a `process_commissions` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchAction {
    Approve,
    Reject { reason: String },
    Pay { payment_reference: String },
}

impl BatchAction {
    pub fn verb(&self) -> &'static str {
        match self {
            BatchAction::Approve => "approve",
            BatchAction::Reject { .. } => "reject",
            BatchAction::Pay { .. } => "pay",
        }
    }
}

//--------------------------------------    BatchOutcome     ---------------------------------------------------------
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum BatchItemError {
    #[error("Commission {id} is {actual}; cannot {action} it")]
    InvalidState { id: i64, actual: CommissionStatus, action: String },
    #[error("Commission {0} does not exist")]
    NotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub commission_id: i64,
    pub outcome: Result<Commission, BatchItemError>,
}

/// Per-item results of a batch commission call. A precondition failure on one item never aborts
/// its siblings; callers reconcile partial success from this list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub items: Vec<BatchItemResult>,
    /// Partners touched by at least one successful transition, in first-seen order.
    pub partners_affected: Vec<i64>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn push(&mut self, result: BatchItemResult) {
        if let Ok(commission) = &result.outcome {
            if !self.partners_affected.contains(&commission.partner_id) {
                self.partners_affected.push(commission.partner_id);
            }
        }
        self.items.push(result);
    }
}
