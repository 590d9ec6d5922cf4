use thiserror::Error;

use crate::{
    api::{ClickQueryFilter, CommissionQueryFilter, SessionQueryFilter},
    db_types::{
        AuditEntityType,
        AuditLogEntry,
        Click,
        Commission,
        Conversion,
        Notification,
        OrderId,
        Partner,
        Payout,
        ReferralCode,
        Session,
        SessionKey,
    },
};

#[derive(Debug, Clone, Error)]
pub enum PartnerQueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for PartnerQueryError {
    fn from(e: sqlx::Error) -> Self {
        PartnerQueryError::DatabaseError(e.to_string())
    }
}

/// The read side of a ledger backend: every query the pipeline and its callers need.
///
/// [`super::LedgerDatabase`] handles the machinery of recording attribution and moving money;
/// `PartnerManagement` provides methods for querying the resulting state.
#[allow(async_fn_in_trait)]
pub trait PartnerManagement {
    async fn fetch_partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerQueryError>;

    async fn fetch_partner_by_code(&self, code: &ReferralCode) -> Result<Option<Partner>, PartnerQueryError>;

    /// The click that started the given session, if any. This is the durable fallback for
    /// attribution resolution after a cache loss.
    async fn fetch_click_by_session(&self, key: &SessionKey) -> Result<Option<Click>, PartnerQueryError>;

    async fn fetch_conversion_by_order_id(&self, order_id: &OrderId) -> Result<Option<Conversion>, PartnerQueryError>;

    async fn fetch_commission(&self, commission_id: i64) -> Result<Option<Commission>, PartnerQueryError>;

    /// The commission derived from the given conversion (1:1).
    async fn fetch_commission_for_conversion(
        &self,
        conversion_id: i64,
    ) -> Result<Option<Commission>, PartnerQueryError>;

    async fn search_clicks(&self, query: ClickQueryFilter) -> Result<Vec<Click>, PartnerQueryError>;

    async fn search_commissions(&self, query: CommissionQueryFilter) -> Result<Vec<Commission>, PartnerQueryError>;

    async fn fetch_session(&self, key: &SessionKey) -> Result<Option<Session>, PartnerQueryError>;

    async fn search_sessions(&self, query: SessionQueryFilter) -> Result<Vec<Session>, PartnerQueryError>;

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, PartnerQueryError>;

    async fn fetch_notifications(
        &self,
        partner_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, PartnerQueryError>;

    /// The append-only audit trail for an entity, oldest first.
    async fn fetch_audit_trail(
        &self,
        entity_type: AuditEntityType,
        entity_id: i64,
    ) -> Result<Vec<AuditLogEntry>, PartnerQueryError>;
}
