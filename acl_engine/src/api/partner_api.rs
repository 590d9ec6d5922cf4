use std::{fmt::Debug, sync::Arc};

use acl_common::{CommissionRate, Money};
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::{ClickQueryFilter, CommissionQueryFilter, PartnerApiError, PartnerStats},
    cache::AttributionCache,
    db_types::{
        Actor,
        AuditEntityType,
        AuditLogEntry,
        Click,
        Commission,
        CommissionStatus,
        NewPartner,
        Notification,
        Partner,
        PartnerStatus,
        ReferralCode,
    },
    helpers::generate_referral_code,
    traits::{LedgerDatabase, LedgerError},
};

const CODE_ISSUE_ATTEMPTS: usize = 10;

/// `PartnerApi` manages the partner roster and its query surface.
///
/// Partner status and rate are money-bearing state: both mutations are audited, and both
/// invalidate the cached referral-code lookup so the attribution hot path picks the change up
/// immediately rather than after the cache TTL.
pub struct PartnerApi<B> {
    db: B,
    cache: Arc<AttributionCache>,
}

impl<B> Debug for PartnerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartnerApi")
    }
}

impl<B> PartnerApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B, cache: Arc<AttributionCache>) -> Self {
        Self { db, cache }
    }

    /// Registers a new partner, issuing a fresh referral code. Codes are random; the ledger's
    /// unique index arbitrates collisions and we simply retry with a new code.
    pub async fn create_partner(&self, partner: NewPartner) -> Result<Partner, PartnerApiError> {
        if partner.display_name.trim().is_empty() {
            return Err(PartnerApiError::ValidationError("Partner display name may not be empty".to_string()));
        }
        for attempt in 1..=CODE_ISSUE_ATTEMPTS {
            let code = {
                let mut rng = rand::thread_rng();
                generate_referral_code(&mut rng)
            };
            match self.db.create_partner(partner.clone(), code.clone()).await {
                Ok(created) => {
                    info!("🧑️ Partner #{} registered with code [{}]", created.id, created.referral_code);
                    return Ok(created);
                },
                Err(LedgerError::ReferralCodeTaken(code)) => {
                    debug!("🧑️ Referral code [{code}] already taken (attempt {attempt}); drawing another");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(PartnerApiError::CodeIssueFailed(CODE_ISSUE_ATTEMPTS))
    }

    /// Registers a partner under a caller-chosen referral code (imports, migrations).
    pub async fn create_partner_with_code(
        &self,
        partner: NewPartner,
        code: ReferralCode,
    ) -> Result<Partner, PartnerApiError> {
        self.db.create_partner(partner, code).await.map_err(|e| match e {
            LedgerError::ReferralCodeTaken(code) => {
                PartnerApiError::ValidationError(format!("Referral code {code} is already taken"))
            },
            other => other.into(),
        })
    }

    /// Changes a partner's status (Active/Inactive/Suspended). Audited; the cached lookup is
    /// dropped so a suspension takes effect on the next click, not the next cache expiry.
    pub async fn set_status(
        &self,
        partner_id: i64,
        status: PartnerStatus,
        actor: &Actor,
    ) -> Result<Partner, PartnerApiError> {
        let partner = self.db.update_partner_status(partner_id, status, actor).await?;
        self.cache.invalidate_partner(&partner.referral_code).await;
        Ok(partner)
    }

    /// Changes a partner's commission rate. Audited. Only future conversions are affected: the
    /// rate is snapshotted on every conversion and commission at creation time.
    pub async fn set_commission_rate(
        &self,
        partner_id: i64,
        rate: CommissionRate,
        actor: &Actor,
    ) -> Result<Partner, PartnerApiError> {
        let partner = self.db.update_commission_rate(partner_id, rate, actor).await?;
        self.cache.invalidate_partner(&partner.referral_code).await;
        Ok(partner)
    }

    pub async fn partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerApiError> {
        let partner = self.db.fetch_partner(partner_id).await?;
        Ok(partner)
    }

    pub async fn partner_by_code(&self, code: &ReferralCode) -> Result<Option<Partner>, PartnerApiError> {
        let partner = self.db.fetch_partner_by_code(code).await?;
        Ok(partner)
    }

    /// Performance summary for a partner over an optional date range, computed from the partner
    /// row and a scan of its commissions.
    pub async fn stats(
        &self,
        partner_id: i64,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<PartnerStats, PartnerApiError> {
        let partner =
            self.db.fetch_partner(partner_id).await?.ok_or(PartnerApiError::PartnerNotFound(partner_id))?;
        let mut filter = CommissionQueryFilter::default().with_partner_id(partner_id);
        if let Some(since) = since {
            filter = filter.since(since);
        }
        if let Some(until) = until {
            filter = filter.until(until);
        }
        let commissions = self.db.search_commissions(filter).await?;

        let count = |status: CommissionStatus| commissions.iter().filter(|c| c.status == status).count() as u64;
        let period_commission_total: Money = commissions
            .iter()
            .filter(|c| c.status != CommissionStatus::Rejected)
            .map(|c| c.amount)
            .sum();
        let conversion_rate = if partner.total_clicks > 0 {
            partner.total_conversions as f64 / partner.total_clicks as f64 * 100.0
        } else {
            0.0
        };

        Ok(PartnerStats {
            partner_id,
            total_clicks: partner.total_clicks,
            total_conversions: partner.total_conversions,
            conversion_rate,
            total_earnings: partner.total_earnings,
            pending_earnings: partner.pending_earnings,
            paid_earnings: partner.paid_earnings,
            pending_commissions: count(CommissionStatus::Pending),
            approved_commissions: count(CommissionStatus::Approved),
            rejected_commissions: count(CommissionStatus::Rejected),
            paid_commissions: count(CommissionStatus::Paid),
            period_commission_total,
            since,
            until,
        })
    }

    pub async fn search_commissions(&self, query: CommissionQueryFilter) -> Result<Vec<Commission>, PartnerApiError> {
        let commissions = self.db.search_commissions(query).await?;
        Ok(commissions)
    }

    pub async fn search_clicks(&self, query: ClickQueryFilter) -> Result<Vec<Click>, PartnerApiError> {
        let clicks = self.db.search_clicks(query).await?;
        Ok(clicks)
    }

    /// A partner's notification inbox, newest first.
    pub async fn notifications(
        &self,
        partner_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, PartnerApiError> {
        let notifications = self.db.fetch_notifications(partner_id, unread_only).await?;
        Ok(notifications)
    }

    pub async fn mark_notification_read(&self, notification_id: i64) -> Result<(), PartnerApiError> {
        self.db.mark_notification_read(notification_id).await?;
        Ok(())
    }

    /// The append-only audit trail for a commission, payout or partner, oldest first.
    pub async fn audit_trail(
        &self,
        entity_type: AuditEntityType,
        entity_id: i64,
    ) -> Result<Vec<AuditLogEntry>, PartnerApiError> {
        let trail = self.db.fetch_audit_trail(entity_type, entity_id).await?;
        Ok(trail)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
