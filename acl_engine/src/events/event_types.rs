use acl_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{Click, Commission, CommissionStatus, Conversion, Payout, Session};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickRecordedEvent {
    pub click: Click,
}

impl ClickRecordedEvent {
    pub fn new(click: Click) -> Self {
        Self { click }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecordedEvent {
    pub conversion: Conversion,
    pub commission: Commission,
}

impl ConversionRecordedEvent {
    pub fn new(conversion: Conversion, commission: Commission) -> Self {
        Self { conversion, commission }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionStatusChangedEvent {
    pub commission: Commission,
    pub old_status: CommissionStatus,
}

impl CommissionStatusChangedEvent {
    pub fn new(commission: Commission, old_status: CommissionStatus) -> Self {
        Self { commission, old_status }
    }
}

/// Batch processing publishes one of these per affected partner rather than one event per
/// commission, so paying a hundred commissions for one partner in one call is one fan-out, not a
/// storm. Audit rows stay per-commission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionsSettledEvent {
    pub partner_id: i64,
    pub action: String,
    pub commission_ids: Vec<i64>,
    pub total_amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutUpdatedEvent {
    pub payout: Payout,
}

impl PayoutUpdatedEvent {
    pub fn new(payout: Payout) -> Self {
        Self { payout }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndedEvent {
    pub session: Session,
}

impl SessionEndedEvent {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

/// The union of everything the hub fans out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerEvent {
    ClickRecorded(ClickRecordedEvent),
    ConversionRecorded(ConversionRecordedEvent),
    CommissionStatusChanged(CommissionStatusChangedEvent),
    CommissionsSettled(CommissionsSettledEvent),
    PayoutUpdated(PayoutUpdatedEvent),
    SessionEnded(SessionEndedEvent),
}

impl LedgerEvent {
    /// The partner whose topic this event belongs to.
    pub fn partner_id(&self) -> i64 {
        match self {
            LedgerEvent::ClickRecorded(e) => e.click.partner_id,
            LedgerEvent::ConversionRecorded(e) => e.conversion.partner_id,
            LedgerEvent::CommissionStatusChanged(e) => e.commission.partner_id,
            LedgerEvent::CommissionsSettled(e) => e.partner_id,
            LedgerEvent::PayoutUpdated(e) => e.payout.partner_id,
            LedgerEvent::SessionEnded(e) => e.session.partner_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ClickRecorded(_) => "click_recorded",
            LedgerEvent::ConversionRecorded(_) => "conversion_recorded",
            LedgerEvent::CommissionStatusChanged(_) => "commission_status_changed",
            LedgerEvent::CommissionsSettled(_) => "commissions_settled",
            LedgerEvent::PayoutUpdated(_) => "payout_updated",
            LedgerEvent::SessionEnded(_) => "session_ended",
        }
    }

    /// Traffic-shaped events also go to the analytics topic; money-shaped ones do not.
    pub fn for_analytics(&self) -> bool {
        matches!(
            self,
            LedgerEvent::ClickRecorded(_) | LedgerEvent::ConversionRecorded(_) | LedgerEvent::SessionEnded(_)
        )
    }
}
