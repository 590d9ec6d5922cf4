//! `SqliteDatabase` is a concrete implementation of an attribution & commission ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backing store and implements the traits defined in the
//! [`crate::traits`] module. Every money-bearing mutation runs inside a single transaction that
//! also adjusts the partner's earnings buckets (as atomic relative updates) and appends its audit
//! entry. An audit insert that fails never rolls back a mutation that succeeded; the failure is
//! logged out-of-band for reconciliation instead.
use std::fmt::Debug;

use acl_common::{CommissionRate, Money};
use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{audit, clicks, commissions, conversions, is_unique_violation, new_pool, notifications, partners, payouts, sessions};
use crate::{
    api::{ClickQueryFilter, CommissionQueryFilter, SessionQueryFilter},
    db_types::{
        Actor,
        AuditEntityType,
        AuditLogEntry,
        Click,
        Commission,
        CommissionStatus,
        Conversion,
        LiveSession,
        NewAuditEntry,
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
    traits::{LedgerDatabase, LedgerError, PartnerManagement, PartnerQueryError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects using `ACL_DATABASE_URL`, falling back to the default store path.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = super::db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    /// Creates a new database instance, connecting to the given URL.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Appends an audit entry inside the caller's transaction. A failure here is logged and
    /// swallowed: money-state correctness takes priority over audit completeness, and the gap
    /// stays detectable through the error log.
    async fn try_audit(entry: NewAuditEntry, conn: &mut SqliteConnection) {
        let entity_type = entry.entity_type;
        let entity_id = entry.entity_id;
        let action = entry.action.clone();
        if let Err(e) = audit::insert_entry(entry, conn).await {
            error!("🧾️ Audit write failed for {action} on {entity_type} #{entity_id}: {e}. Reconcile manually.");
        }
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_partner(&self, partner: NewPartner, code: ReferralCode) -> Result<Partner, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let partner = partners::insert_partner(partner, code, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Partner,
            partner.id,
            "create",
            &Actor::system(),
            None,
            Some(&partner),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        Ok(partner)
    }

    async fn update_partner_status(
        &self,
        partner_id: i64,
        status: PartnerStatus,
        actor: &Actor,
    ) -> Result<Partner, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before = partners::fetch_partner(partner_id, &mut tx)
            .await?
            .ok_or(LedgerError::PartnerNotFound(partner_id))?;
        let after = partners::update_status(partner_id, status, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Partner,
            partner_id,
            "status_change",
            actor,
            Some(&before),
            Some(&after),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("🧑️ Partner #{partner_id} status changed {} -> {status} by {actor}", before.status);
        Ok(after)
    }

    async fn update_commission_rate(
        &self,
        partner_id: i64,
        rate: CommissionRate,
        actor: &Actor,
    ) -> Result<Partner, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before = partners::fetch_partner(partner_id, &mut tx)
            .await?
            .ok_or(LedgerError::PartnerNotFound(partner_id))?;
        let after = partners::update_rate(partner_id, rate, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Partner,
            partner_id,
            "rate_change",
            actor,
            Some(&before),
            Some(&after),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("🧑️ Partner #{partner_id} rate changed {} -> {rate} by {actor}", before.commission_rate);
        Ok(after)
    }

    /// In a single transaction: inserts the click and bumps the partner's click counter.
    /// Idempotent on the session key; the counter only moves when a row is actually inserted.
    async fn record_click(&self, partner_id: i64, click: NewClick) -> Result<(Click, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let (click, inserted) = clicks::idempotent_insert(partner_id, click, &mut tx).await?;
        if inserted {
            partners::record_click_stats(partner_id, click.created_at, &mut tx).await?;
        }
        tx.commit().await?;
        Ok((click, inserted))
    }

    /// In a single transaction: inserts the Conversion and Commission (both Pending, both
    /// carrying the rate snapshot), bumps the conversion counter, credits pending earnings, and
    /// marks the originating click and durable session converted. Losing an order-id insert race
    /// downgrades to the idempotent "already exists" result.
    async fn record_conversion(
        &self,
        partner_id: i64,
        conversion: NewConversion,
        rate: CommissionRate,
        commission_amount: Money,
    ) -> Result<(Conversion, Commission, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;
        if let Some(order_id) = &conversion.order_id {
            if let Some(existing) = conversions::fetch_by_order_id(order_id, &mut tx).await? {
                let commission = commissions::fetch_for_conversion(existing.id, &mut tx)
                    .await?
                    .ok_or(LedgerError::CommissionNotFound(existing.id))?;
                tx.commit().await?;
                return Ok((existing, commission, false));
            }
        }
        let session_key = conversion.session_key.clone();
        let order_amount = conversion.order_amount;
        let inserted = match conversions::insert_conversion(partner_id, conversion, rate, commission_amount, &mut tx)
            .await
        {
            Ok(conversion) => conversion,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent racer won on the order id; hand back its result.
                drop(tx);
                let mut conn = self.pool.acquire().await?;
                let existing = conversion_race_fallback(&e, &session_key, &mut conn).await?;
                let commission = commissions::fetch_for_conversion(existing.id, &mut conn)
                    .await?
                    .ok_or(LedgerError::CommissionNotFound(existing.id))?;
                return Ok((existing, commission, false));
            },
            Err(e) => return Err(e.into()),
        };
        let commission = commissions::insert_commission(&inserted, &mut tx).await?;
        partners::record_conversion_stats(partner_id, inserted.created_at, &mut tx).await?;
        partners::adjust_earnings(partner_id, commission_amount, commission_amount, Money::from_cents(0), &mut tx)
            .await?;
        clicks::mark_converted(&session_key, inserted.created_at, &mut tx).await?;
        sessions::mark_converted(&session_key, order_amount, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🛒️ Conversion #{} recorded for partner #{partner_id}: {commission_amount} commission now pending",
            inserted.id
        );
        Ok((inserted, commission, true))
    }

    async fn approve_commission(&self, commission_id: i64, actor: &Actor) -> Result<Commission, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before = commissions::fetch_commission(commission_id, &mut tx)
            .await?
            .ok_or(LedgerError::CommissionNotFound(commission_id))?;
        let approved = commissions::approve(commission_id, &actor.id, Utc::now(), &mut tx).await?.ok_or(
            LedgerError::InvalidStateTransition {
                id: commission_id,
                actual: before.status,
                requested: CommissionStatus::Approved,
            },
        )?;
        conversions::mirror_status(approved.conversion_id, CommissionStatus::Approved, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Commission,
            commission_id,
            "approve",
            actor,
            Some(&before),
            Some(&approved),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("💸️ Commission #{commission_id} approved by {actor}");
        Ok(approved)
    }

    /// Rejection is the only path where pending earnings decrease without a payment: the amount
    /// is reversed out of both pending and total.
    async fn reject_commission(
        &self,
        commission_id: i64,
        actor: &Actor,
        reason: &str,
    ) -> Result<Commission, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before = commissions::fetch_commission(commission_id, &mut tx)
            .await?
            .ok_or(LedgerError::CommissionNotFound(commission_id))?;
        let rejected = commissions::reject(commission_id, &actor.id, reason, &mut tx).await?.ok_or(
            LedgerError::InvalidStateTransition {
                id: commission_id,
                actual: before.status,
                requested: CommissionStatus::Rejected,
            },
        )?;
        let amount = rejected.amount;
        partners::adjust_earnings(rejected.partner_id, -amount, -amount, Money::from_cents(0), &mut tx).await?;
        conversions::mirror_status(rejected.conversion_id, CommissionStatus::Rejected, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Commission,
            commission_id,
            "reject",
            actor,
            Some(&before),
            Some(&rejected),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("💸️ Commission #{commission_id} rejected by {actor}: {amount} reversed from pending earnings");
        Ok(rejected)
    }

    /// Paying moves the amount between buckets; the total is conserved.
    async fn pay_commission(
        &self,
        commission_id: i64,
        actor: &Actor,
        payment_reference: &str,
    ) -> Result<Commission, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before = commissions::fetch_commission(commission_id, &mut tx)
            .await?
            .ok_or(LedgerError::CommissionNotFound(commission_id))?;
        let paid = commissions::pay(commission_id, payment_reference, Utc::now(), &mut tx).await?.ok_or(
            LedgerError::InvalidStateTransition {
                id: commission_id,
                actual: before.status,
                requested: CommissionStatus::Paid,
            },
        )?;
        let amount = paid.amount;
        partners::adjust_earnings(paid.partner_id, Money::from_cents(0), -amount, amount, &mut tx).await?;
        conversions::mirror_status(paid.conversion_id, CommissionStatus::Paid, &mut tx).await?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Commission,
            commission_id,
            "pay",
            actor,
            Some(&before),
            Some(&paid),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("💸️ Commission #{commission_id} paid ({payment_reference}) by {actor}");
        Ok(paid)
    }

    async fn fetch_commissions_by_ids(&self, ids: &[i64]) -> Result<Vec<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let commissions = commissions::fetch_by_ids(ids, &mut conn).await?;
        Ok(commissions)
    }

    async fn create_payout(
        &self,
        partner_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        actor: &Actor,
    ) -> Result<Payout, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payable = commissions::payable_for_period(partner_id, period_start, period_end, &mut tx).await?;
        if payable.is_empty() {
            return Err(LedgerError::EmptyPayout(partner_id));
        }
        let amount: Money = payable.iter().map(|c| c.amount).sum();
        let ids: Vec<i64> = payable.iter().map(|c| c.id).collect();
        let payout =
            payouts::insert_payout(partner_id, amount, ids.len() as i64, period_start, period_end, &mut tx).await?;
        commissions::assign_payout(&ids, payout.id, &mut tx).await?;
        let entry =
            NewAuditEntry::change(AuditEntityType::Payout, payout.id, "create", actor, None, Some(&payout));
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("💸️ Payout #{} of {amount} created for partner #{partner_id} ({} commissions)", payout.id, ids.len());
        Ok(payout)
    }

    async fn update_payout_status(
        &self,
        payout_id: i64,
        status: PayoutStatus,
        actor: &Actor,
        transaction_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Payout, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let before =
            payouts::fetch_payout(payout_id, &mut tx).await?.ok_or(LedgerError::PayoutNotFound(payout_id))?;
        let after = payouts::transition(payout_id, status, &actor.id, transaction_id, failure_reason, &mut tx)
            .await?
            .ok_or(LedgerError::InvalidPayoutTransition { id: payout_id, actual: before.status, requested: status })?;
        let entry = NewAuditEntry::change(
            AuditEntityType::Payout,
            payout_id,
            "status_change",
            actor,
            Some(&before),
            Some(&after),
        );
        Self::try_audit(entry, &mut tx).await;
        tx.commit().await?;
        debug!("💸️ Payout #{payout_id} moved {} -> {status} by {actor}", before.status);
        Ok(after)
    }

    async fn upsert_session(&self, live: &LiveSession) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        sessions::upsert(live, &mut conn).await
    }

    async fn end_session(&self, live: &LiveSession, ended_at: DateTime<Utc>) -> Result<Session, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let session = sessions::finalize(live, ended_at, &mut conn).await?;
        debug!(
            "⏱️ Session [{}] ended after {}s ({} page views)",
            session.session_key,
            session.duration_secs.unwrap_or(0),
            session.page_views.0.len()
        );
        Ok(session)
    }

    async fn end_stale_sessions(&self, inactive_for: Duration) -> Result<Vec<Session>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let swept = sessions::end_stale(inactive_for, &mut conn).await?;
        if !swept.is_empty() {
            debug!("⏱️ Sweep ended {} stale session(s)", swept.len());
        }
        Ok(swept)
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let saved = notifications::insert_notification(notification, &mut conn).await?;
        Ok(saved)
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_read(notification_id, &mut conn).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

/// After losing a conversion insert race we no longer know the winning order id row by id, but
/// the session key pins down the conversion that was inserted concurrently.
async fn conversion_race_fallback(
    original: &sqlx::Error,
    session_key: &SessionKey,
    conn: &mut SqliteConnection,
) -> Result<Conversion, LedgerError> {
    let existing = sqlx::query_as::<_, Conversion>(
        "SELECT * FROM conversions WHERE session_key = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(session_key)
    .fetch_optional(conn)
    .await?;
    existing.ok_or_else(|| LedgerError::DatabaseError(original.to_string()))
}

impl PartnerManagement for SqliteDatabase {
    async fn fetch_partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch_partner(partner_id, &mut conn).await?;
        Ok(partner)
    }

    async fn fetch_partner_by_code(&self, code: &ReferralCode) -> Result<Option<Partner>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let partner = partners::fetch_partner_by_code(code, &mut conn).await?;
        Ok(partner)
    }

    async fn fetch_click_by_session(&self, key: &SessionKey) -> Result<Option<Click>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let click = clicks::fetch_by_session_key(key, &mut conn).await?;
        Ok(click)
    }

    async fn fetch_conversion_by_order_id(&self, order_id: &OrderId) -> Result<Option<Conversion>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let conversion = conversions::fetch_by_order_id(order_id, &mut conn).await?;
        Ok(conversion)
    }

    async fn fetch_commission(&self, commission_id: i64) -> Result<Option<Commission>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let commission = commissions::fetch_commission(commission_id, &mut conn).await?;
        Ok(commission)
    }

    async fn fetch_commission_for_conversion(
        &self,
        conversion_id: i64,
    ) -> Result<Option<Commission>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let commission = commissions::fetch_for_conversion(conversion_id, &mut conn).await?;
        Ok(commission)
    }

    async fn search_clicks(&self, query: ClickQueryFilter) -> Result<Vec<Click>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let clicks = clicks::search_clicks(query, &mut conn).await?;
        Ok(clicks)
    }

    async fn search_commissions(&self, query: CommissionQueryFilter) -> Result<Vec<Commission>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let commissions = commissions::search_commissions(query, &mut conn).await?;
        Ok(commissions)
    }

    async fn fetch_session(&self, key: &SessionKey) -> Result<Option<Session>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let session = sessions::fetch_by_key(key, &mut conn).await?;
        Ok(session)
    }

    async fn search_sessions(&self, query: SessionQueryFilter) -> Result<Vec<Session>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let sessions = sessions::search_sessions(query, &mut conn).await?;
        Ok(sessions)
    }

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(payout_id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_notifications(
        &self,
        partner_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let notifications = notifications::fetch_for_partner(partner_id, unread_only, &mut conn).await?;
        Ok(notifications)
    }

    async fn fetch_audit_trail(
        &self,
        entity_type: AuditEntityType,
        entity_id: i64,
    ) -> Result<Vec<AuditLogEntry>, PartnerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let trail = audit::fetch_trail(entity_type, entity_id, &mut conn).await?;
        Ok(trail)
    }
}
