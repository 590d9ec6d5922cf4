use thiserror::Error;

use crate::{
    db_types::{CommissionStatus, PartnerStatus, PayoutStatus, ReferralCode, SessionKey},
    traits::{LedgerError, PartnerQueryError},
};

//-------------------------------------- AttributionApiError ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum AttributionApiError {
    #[error("No partner is registered for referral code {0}")]
    UnknownReferralCode(ReferralCode),
    #[error("Partner {id} is {status}; attribution requires an active partner")]
    InactivePartner { id: i64, status: PartnerStatus },
    #[error("No attribution has been recorded for session {0}")]
    NoAttribution(SessionKey),
    #[error("The attribution window for session {0} has elapsed")]
    AttributionExpired(SessionKey),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for AttributionApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ReferralCodeNotFound(code) => AttributionApiError::UnknownReferralCode(code),
            LedgerError::ValidationError(s) => AttributionApiError::ValidationError(s),
            other => AttributionApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<PartnerQueryError> for AttributionApiError {
    fn from(e: PartnerQueryError) -> Self {
        AttributionApiError::DatabaseError(e.to_string())
    }
}

//-------------------------------------- CommissionApiError ----------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum CommissionApiError {
    #[error("{0}")]
    Attribution(#[from] AttributionApiError),
    #[error("The requested commission id {0} does not exist")]
    CommissionNotFound(i64),
    #[error("Commission {id} is {actual}; cannot {action} it")]
    InvalidState { id: i64, actual: CommissionStatus, action: String },
    #[error("None of the requested commission ids exist")]
    NoMatchingCommissions,
    #[error("The requested payout id {0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout {id} is {actual}; the requested transition to {requested} is not legal")]
    InvalidPayoutState { id: i64, actual: PayoutStatus, requested: PayoutStatus },
    #[error("No paid commissions to sweep into a payout for partner {0}")]
    EmptyPayout(i64),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for CommissionApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::CommissionNotFound(id) => CommissionApiError::CommissionNotFound(id),
            LedgerError::InvalidStateTransition { id, actual, requested } => CommissionApiError::InvalidState {
                id,
                actual,
                action: verb_for(requested).to_string(),
            },
            LedgerError::PayoutNotFound(id) => CommissionApiError::PayoutNotFound(id),
            LedgerError::InvalidPayoutTransition { id, actual, requested } => {
                CommissionApiError::InvalidPayoutState { id, actual, requested }
            },
            LedgerError::EmptyPayout(partner_id) => CommissionApiError::EmptyPayout(partner_id),
            LedgerError::ValidationError(s) => CommissionApiError::ValidationError(s),
            other => CommissionApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<PartnerQueryError> for CommissionApiError {
    fn from(e: PartnerQueryError) -> Self {
        CommissionApiError::DatabaseError(e.to_string())
    }
}

fn verb_for(status: CommissionStatus) -> &'static str {
    match status {
        CommissionStatus::Approved => "approve",
        CommissionStatus::Rejected => "reject",
        CommissionStatus::Paid => "pay",
        CommissionStatus::Pending => "reset",
    }
}

//--------------------------------------  SessionApiError  -----------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum SessionApiError {
    #[error("No session found for key {0}")]
    SessionNotFound(SessionKey),
    #[error("Session {0} has already ended")]
    SessionEnded(SessionKey),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for SessionApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::SessionNotFound(key) => SessionApiError::SessionNotFound(key),
            LedgerError::ValidationError(s) => SessionApiError::ValidationError(s),
            other => SessionApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<PartnerQueryError> for SessionApiError {
    fn from(e: PartnerQueryError) -> Self {
        SessionApiError::DatabaseError(e.to_string())
    }
}

//--------------------------------------  PartnerApiError  -----------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum PartnerApiError {
    #[error("The requested partner id {0} does not exist")]
    PartnerNotFound(i64),
    #[error("No partner is registered for referral code {0}")]
    UnknownReferralCode(ReferralCode),
    #[error("Could not issue a unique referral code after {0} attempts")]
    CodeIssueFailed(usize),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for PartnerApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::PartnerNotFound(id) => PartnerApiError::PartnerNotFound(id),
            LedgerError::ReferralCodeNotFound(code) => PartnerApiError::UnknownReferralCode(code),
            LedgerError::ValidationError(s) => PartnerApiError::ValidationError(s),
            other => PartnerApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<PartnerQueryError> for PartnerApiError {
    fn from(e: PartnerQueryError) -> Self {
        PartnerApiError::DatabaseError(e.to_string())
    }
}
