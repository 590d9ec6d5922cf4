use acl_common::{CommissionRate, Money};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Actor,
        Click,
        Commission,
        CommissionStatus,
        Conversion,
        LiveSession,
        NewClick,
        NewConversion,
        NewNotification,
        NewPartner,
        Notification,
        OrderId,
        Partner,
        PartnerStatus,
        Payout,
        PayoutStatus,
        ReferralCode,
        Session,
        SessionKey,
    },
    traits::{PartnerManagement, PartnerQueryError},
};

/// This trait defines the write side of a ledger backend: every mutation the pipeline performs.
///
/// Implementations must provide the guarantees the pipeline leans on:
/// * uniqueness constraints on click session keys, conversion order ids, commission conversion
///   ids and partner referral codes, so concurrent duplicate inserts are rejected by the store
///   and can be surfaced as the idempotent "already exists" case;
/// * earnings-bucket movements expressed as atomic relative updates (`x = x + delta`), never as
///   application-level read-modify-write;
/// * commission/payout state transitions guarded by a storage-level precondition on the current
///   status, so exactly one of two racing transitions wins.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone + PartnerManagement {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Inserts a new partner with the given (already generated) referral code.
    /// Fails with [`LedgerError::ReferralCodeTaken`] if the code collides.
    async fn create_partner(&self, partner: NewPartner, code: ReferralCode) -> Result<Partner, LedgerError>;

    /// Changes a partner's status, writing an audit entry in the same transaction.
    async fn update_partner_status(
        &self,
        partner_id: i64,
        status: PartnerStatus,
        actor: &Actor,
    ) -> Result<Partner, LedgerError>;

    /// Changes a partner's commission rate, writing an audit entry in the same transaction.
    /// Historical rate snapshots on conversions and commissions are untouched.
    async fn update_commission_rate(
        &self,
        partner_id: i64,
        rate: CommissionRate,
        actor: &Actor,
    ) -> Result<Partner, LedgerError>;

    /// Records a click for the partner, idempotently on the session key. In a single transaction:
    /// inserts the click row, bumps the partner's click counter and `last_click_at`.
    /// Returns the click and `true` if it was inserted, or the pre-existing click and `false`.
    async fn record_click(&self, partner_id: i64, click: NewClick) -> Result<(Click, bool), LedgerError>;

    /// Records a conversion and its commission in one transaction, idempotently on the order id:
    /// inserts the Conversion and Commission rows (both Pending, both rate-snapshotted), bumps
    /// the partner's conversion counter, adds `commission_amount` to total and pending earnings,
    /// and marks the originating click and the durable session (if present) converted.
    /// Returns the pair and `true` if inserted, or the pre-existing pair and `false`.
    async fn record_conversion(
        &self,
        partner_id: i64,
        conversion: NewConversion,
        rate: CommissionRate,
        commission_amount: Money,
    ) -> Result<(Conversion, Commission, bool), LedgerError>;

    /// Transitions a Pending commission to Approved, stamping the approver. No earnings change.
    /// Writes one audit entry. Fails with [`LedgerError::InvalidStateTransition`] otherwise.
    async fn approve_commission(&self, commission_id: i64, actor: &Actor) -> Result<Commission, LedgerError>;

    /// Transitions a Pending commission to Rejected (terminal) and reverses the partner's pending
    /// and total earnings by the commission amount. Writes one audit entry.
    async fn reject_commission(
        &self,
        commission_id: i64,
        actor: &Actor,
        reason: &str,
    ) -> Result<Commission, LedgerError>;

    /// Transitions an Approved commission to Paid, stamping the payment reference, and moves the
    /// amount from pending to paid earnings (total unchanged). Writes one audit entry.
    async fn pay_commission(
        &self,
        commission_id: i64,
        actor: &Actor,
        payment_reference: &str,
    ) -> Result<Commission, LedgerError>;

    /// Fetches the commissions with the given ids. Missing ids are simply absent from the result.
    async fn fetch_commissions_by_ids(&self, ids: &[i64]) -> Result<Vec<Commission>, LedgerError>;

    /// Sweeps the partner's Paid, not-yet-swept commissions in the period into a new Payout
    /// (status Pending), linking each commission to it. Writes one audit entry for the payout.
    /// Fails with [`LedgerError::EmptyPayout`] if nothing qualifies.
    async fn create_payout(
        &self,
        partner_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        actor: &Actor,
    ) -> Result<Payout, LedgerError>;

    /// Drives a payout along `Pending -> Processing -> Completed | Failed`, stamping the
    /// transaction id or failure reason as appropriate. Writes one audit entry.
    async fn update_payout_status(
        &self,
        payout_id: i64,
        status: PayoutStatus,
        actor: &Actor,
        transaction_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Payout, LedgerError>;

    /// Refreshes (or creates) the durable copy of an active session from the live working copy.
    async fn upsert_session(&self, live: &LiveSession) -> Result<(), LedgerError>;

    /// Final reconcile: writes the live copy, marks the session Ended and stores the computed
    /// duration and bounce flag. Idempotent; ending an already-Ended session is a no-op returning
    /// the stored row.
    async fn end_session(&self, live: &LiveSession, ended_at: DateTime<Utc>) -> Result<Session, LedgerError>;

    /// Forces Ended on every durable Active session whose last activity is older than
    /// `inactive_for`, computing final duration and bounce. Returns the sessions that were swept.
    async fn end_stale_sessions(&self, inactive_for: Duration) -> Result<Vec<Session>, LedgerError>;

    /// Appends a record to a partner's notification inbox.
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, LedgerError>;

    /// Flips a notification's read flag.
    async fn mark_notification_read(&self, notification_id: i64) -> Result<(), LedgerError>;

    /// Closes the backing store.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The requested partner id {0} does not exist")]
    PartnerNotFound(i64),
    #[error("No partner is registered for referral code {0}")]
    ReferralCodeNotFound(ReferralCode),
    #[error("Referral code {0} is already taken")]
    ReferralCodeTaken(ReferralCode),
    #[error("The requested commission id {0} does not exist")]
    CommissionNotFound(i64),
    #[error("The requested conversion {0} does not exist")]
    ConversionNotFound(OrderId),
    #[error("The requested payout id {0} does not exist")]
    PayoutNotFound(i64),
    #[error("No session found for key {0}")]
    SessionNotFound(SessionKey),
    #[error("Commission {id} is {actual}; the requested transition to {requested} is not legal")]
    InvalidStateTransition { id: i64, actual: CommissionStatus, requested: CommissionStatus },
    #[error("Payout {id} is {actual}; the requested transition to {requested} is not legal")]
    InvalidPayoutTransition { id: i64, actual: PayoutStatus, requested: PayoutStatus },
    #[error("No paid commissions to sweep into a payout for partner {0}")]
    EmptyPayout(i64),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

impl From<PartnerQueryError> for LedgerError {
    fn from(e: PartnerQueryError) -> Self {
        match e {
            PartnerQueryError::DatabaseError(s) => LedgerError::DatabaseError(s),
            PartnerQueryError::QueryError(s) => LedgerError::ValidationError(s),
        }
    }
}
