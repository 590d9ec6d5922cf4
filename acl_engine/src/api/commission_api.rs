use std::{collections::HashSet, fmt::Debug, sync::Arc};

use acl_common::Money;
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::{AttributionApi, AttributionApiError, CommissionApiError},
    cache::AttributionCache,
    config::PipelineConfig,
    db_types::{
        Actor,
        Commission,
        CommissionStatus,
        NewConversion,
        NewNotification,
        NotificationKind,
        Payout,
        PayoutStatus,
    },
    events::{
        CommissionStatusChangedEvent,
        CommissionsSettledEvent,
        ConversionRecordedEvent,
        EventProducers,
        PayoutUpdatedEvent,
    },
    traits::{BatchAction, BatchItemError, BatchItemResult, BatchOutcome, ConversionResult, LedgerDatabase, LedgerError},
};

/// `CommissionApi` is the money half of the pipeline: it turns attributed conversions into
/// commission records and drives those records through their approval/payout lifecycle.
///
/// Legal commission transitions are `Pending -> Approved -> Paid` and `Pending -> Rejected`.
/// All preconditions are enforced at the storage layer, so concurrent admin actions cannot
/// double-apply a transition.
pub struct CommissionApi<B> {
    db: B,
    cache: Arc<AttributionCache>,
    attribution: AttributionApi<B>,
    producers: EventProducers,
}

impl<B> Debug for CommissionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommissionApi")
    }
}

impl<B> CommissionApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B, cache: Arc<AttributionCache>, producers: EventProducers, config: PipelineConfig) -> Self {
        let attribution = AttributionApi::new(db.clone(), Arc::clone(&cache), producers.clone(), config);
        Self { db, cache, attribution, producers }
    }

    /// Records a qualifying purchase event against the partner attributed to its session.
    ///
    /// Idempotent on the external order id: a repeat submission returns the existing
    /// conversion/commission pair with `duplicate = true`. This is the anti-double-count
    /// guarantee; the order-id unique index backs it up under concurrency.
    ///
    /// The commission amount is `round2(order_amount * rate / 100)` using the partner's rate at
    /// this moment; the rate is snapshotted on both rows and never re-read later.
    pub async fn record_conversion(&self, conversion: NewConversion) -> Result<ConversionResult, CommissionApiError> {
        if !conversion.order_amount.is_positive() {
            return Err(CommissionApiError::ValidationError(format!(
                "Order amount must be positive. Got {}",
                conversion.order_amount
            )));
        }

        let attribution = self.attribution.resolve_attribution(&conversion.session_key).await?;
        let partner = self.db.fetch_partner(attribution.partner_id).await?.ok_or_else(|| {
            CommissionApiError::DatabaseError(format!(
                "Attributed partner #{} does not exist",
                attribution.partner_id
            ))
        })?;
        if !partner.is_active() {
            return Err(CommissionApiError::Attribution(AttributionApiError::InactivePartner {
                id: partner.id,
                status: partner.status,
            }));
        }

        if let Some(order_id) = &conversion.order_id {
            if let Some(existing) = self.db.fetch_conversion_by_order_id(order_id).await? {
                let commission = self
                    .db
                    .fetch_commission_for_conversion(existing.id)
                    .await?
                    .ok_or(CommissionApiError::CommissionNotFound(existing.id))?;
                debug!("🛒️ Order {order_id} already counted as conversion #{}; idempotent return", existing.id);
                return Ok(ConversionResult { conversion: existing, commission, duplicate: true });
            }
        }

        let amount = partner.commission_rate.commission_on(conversion.order_amount);
        let session_key = conversion.session_key.clone();
        let (conversion_row, commission, inserted) =
            self.db.record_conversion(partner.id, conversion, partner.commission_rate, amount).await?;
        if !inserted {
            return Ok(ConversionResult { conversion: conversion_row, commission, duplicate: true });
        }

        // the live session copy tracks the conversion too; the durable copy was updated in the
        // same transaction as the conversion itself
        if let Some(mut live) = self.cache.session(&session_key).await {
            live.mark_converted(conversion_row.order_amount);
            self.cache.put_session(live).await;
        }
        self.cache.invalidate_partner(&partner.referral_code).await;

        self.notify(NewNotification::new(
            partner.id,
            NotificationKind::Conversion,
            "New conversion",
            format!(
                "Order of {} converted; {amount} commission is pending at {}",
                conversion_row.order_amount, partner.commission_rate
            ),
        ))
        .await;
        self.call_conversion_recorded_hook(&conversion_row, &commission).await;
        info!("🛒️ Conversion #{} recorded: {amount} pending for partner #{}", conversion_row.id, partner.id);
        Ok(ConversionResult { conversion: conversion_row, commission, duplicate: false })
    }

    /// Approves a pending commission. Earnings buckets are untouched (the amount is already
    /// counted as pending).
    pub async fn approve(&self, commission_id: i64, actor: &Actor) -> Result<Commission, CommissionApiError> {
        let approved = self.db.approve_commission(commission_id, actor).await?;
        self.after_transition(
            &approved,
            CommissionStatus::Pending,
            NewNotification::new(
                approved.partner_id,
                NotificationKind::CommissionApproved,
                "Commission approved",
                format!("Commission of {} has been approved", approved.amount),
            ),
        )
        .await;
        Ok(approved)
    }

    /// Rejects a pending commission (terminal), reversing the partner's pending earnings by the
    /// commission amount. This is the only case where pending earnings decrease without a
    /// payment.
    pub async fn reject(
        &self,
        commission_id: i64,
        actor: &Actor,
        reason: &str,
    ) -> Result<Commission, CommissionApiError> {
        let rejected = self.db.reject_commission(commission_id, actor, reason).await?;
        self.after_transition(
            &rejected,
            CommissionStatus::Pending,
            NewNotification::new(
                rejected.partner_id,
                NotificationKind::CommissionRejected,
                "Commission rejected",
                format!("Commission of {} was rejected: {reason}", rejected.amount),
            ),
        )
        .await;
        Ok(rejected)
    }

    /// Pays an approved commission, moving the amount from pending to paid earnings. The total
    /// is conserved.
    pub async fn pay(
        &self,
        commission_id: i64,
        actor: &Actor,
        payment_reference: &str,
    ) -> Result<Commission, CommissionApiError> {
        let paid = self.db.pay_commission(commission_id, actor, payment_reference).await?;
        self.after_transition(
            &paid,
            CommissionStatus::Approved,
            NewNotification::new(
                paid.partner_id,
                NotificationKind::PayoutProcessed,
                "Commission paid",
                format!("Commission of {} was paid ({payment_reference})", paid.amount),
            ),
        )
        .await;
        Ok(paid)
    }

    /// Applies one action to many commissions, each independently: a precondition failure on one
    /// id is recorded as an item-level failure while the other items proceed. The whole call
    /// only errors when no requested id exists at all.
    ///
    /// Every successful transition writes its own audit row; hub events are coalesced to one
    /// `CommissionsSettled` per affected partner, and each affected partner's cache entry is
    /// invalidated once.
    pub async fn process_commissions(
        &self,
        ids: &[i64],
        action: BatchAction,
        actor: &Actor,
    ) -> Result<BatchOutcome, CommissionApiError> {
        if ids.is_empty() {
            return Err(CommissionApiError::ValidationError("No commission ids supplied".to_string()));
        }
        let existing = self.db.fetch_commissions_by_ids(ids).await?;
        if existing.is_empty() {
            return Err(CommissionApiError::NoMatchingCommissions);
        }
        let known: HashSet<i64> = existing.iter().map(|c| c.id).collect();

        let mut outcome = BatchOutcome::default();
        for &id in ids {
            if !known.contains(&id) {
                outcome.push(BatchItemResult { commission_id: id, outcome: Err(BatchItemError::NotFound(id)) });
                continue;
            }
            let result = match &action {
                BatchAction::Approve => self.db.approve_commission(id, actor).await,
                BatchAction::Reject { reason } => self.db.reject_commission(id, actor, reason).await,
                BatchAction::Pay { payment_reference } => {
                    self.db.pay_commission(id, actor, payment_reference).await
                },
            };
            let item = match result {
                Ok(commission) => {
                    self.notify(notification_for(&action, &commission)).await;
                    Ok(commission)
                },
                Err(LedgerError::InvalidStateTransition { id, actual, .. }) => {
                    Err(BatchItemError::InvalidState { id, actual, action: action.verb().to_string() })
                },
                Err(LedgerError::CommissionNotFound(id)) => Err(BatchItemError::NotFound(id)),
                Err(e) => Err(BatchItemError::DatabaseError(e.to_string())),
            };
            outcome.push(BatchItemResult { commission_id: id, outcome: item });
        }

        // per-partner epilogue: invalidate the cached lookup once and publish one event, however
        // many commissions were settled for that partner in this call
        for &partner_id in &outcome.partners_affected {
            if let Ok(Some(partner)) = self.db.fetch_partner(partner_id).await {
                self.cache.invalidate_partner(&partner.referral_code).await;
            }
            let settled: Vec<&Commission> = outcome
                .items
                .iter()
                .filter_map(|i| i.outcome.as_ref().ok())
                .filter(|c| c.partner_id == partner_id)
                .collect();
            let event = CommissionsSettledEvent {
                partner_id,
                action: action.verb().to_string(),
                commission_ids: settled.iter().map(|c| c.id).collect(),
                total_amount: settled.iter().map(|c| c.amount).sum(),
            };
            self.call_commissions_settled_hook(event).await;
        }
        info!(
            "💸️ Batch {}: {} ok, {} failed across {} partner(s)",
            action.verb(),
            outcome.succeeded(),
            outcome.failed(),
            outcome.partners_affected.len()
        );
        Ok(outcome)
    }

    /// Sweeps a partner's paid commissions for the period into a Payout record (status Pending).
    pub async fn create_payout(
        &self,
        partner_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        actor: &Actor,
    ) -> Result<Payout, CommissionApiError> {
        let payout = self.db.create_payout(partner_id, period_start, period_end, actor).await?;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// The external payment collaborator has picked the payout up.
    pub async fn mark_payout_processing(&self, payout_id: i64, actor: &Actor) -> Result<Payout, CommissionApiError> {
        let payout =
            self.db.update_payout_status(payout_id, PayoutStatus::Processing, actor, None, None).await?;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// The external payment collaborator reports success.
    pub async fn complete_payout(
        &self,
        payout_id: i64,
        actor: &Actor,
        transaction_id: &str,
    ) -> Result<Payout, CommissionApiError> {
        let payout = self
            .db
            .update_payout_status(payout_id, PayoutStatus::Completed, actor, Some(transaction_id), None)
            .await?;
        self.notify(NewNotification::new(
            payout.partner_id,
            NotificationKind::PayoutProcessed,
            "Payout processed",
            format!("Payout of {} has been processed ({transaction_id})", payout.amount),
        ))
        .await;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// The external payment collaborator reports failure.
    pub async fn fail_payout(
        &self,
        payout_id: i64,
        actor: &Actor,
        reason: &str,
    ) -> Result<Payout, CommissionApiError> {
        let payout =
            self.db.update_payout_status(payout_id, PayoutStatus::Failed, actor, None, Some(reason)).await?;
        self.notify(NewNotification::new(
            payout.partner_id,
            NotificationKind::Alert,
            "Payout failed",
            format!("Payout of {} failed: {reason}", payout.amount),
        ))
        .await;
        self.call_payout_updated_hook(&payout).await;
        Ok(payout)
    }

    /// Cache invalidation, inbox record and status event shared by the single-commission
    /// transitions.
    async fn after_transition(&self, commission: &Commission, old_status: CommissionStatus, note: NewNotification) {
        if let Ok(Some(partner)) = self.db.fetch_partner(commission.partner_id).await {
            self.cache.invalidate_partner(&partner.referral_code).await;
        }
        self.notify(note).await;
        self.call_status_changed_hook(commission, old_status).await;
    }

    /// Inbox records are advisory; a failed insert is logged for reconciliation, never allowed
    /// to fail a money mutation that already committed.
    async fn notify(&self, notification: NewNotification) {
        let partner_id = notification.partner_id;
        if let Err(e) = self.db.insert_notification(notification).await {
            warn!("📬️ Could not write notification for partner #{partner_id}: {e}");
        }
    }

    async fn call_conversion_recorded_hook(&self, conversion: &crate::db_types::Conversion, commission: &Commission) {
        for producer in &self.producers.conversion_recorded {
            let event = ConversionRecordedEvent::new(conversion.clone(), commission.clone());
            producer.publish_event(event).await;
        }
    }

    async fn call_status_changed_hook(&self, commission: &Commission, old_status: CommissionStatus) {
        for producer in &self.producers.commission_status_changed {
            let event = CommissionStatusChangedEvent::new(commission.clone(), old_status);
            producer.publish_event(event).await;
        }
    }

    async fn call_commissions_settled_hook(&self, event: CommissionsSettledEvent) {
        for producer in &self.producers.commissions_settled {
            producer.publish_event(event.clone()).await;
        }
    }

    async fn call_payout_updated_hook(&self, payout: &Payout) {
        for producer in &self.producers.payout_updated {
            let event = PayoutUpdatedEvent::new(payout.clone());
            producer.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

fn notification_for(action: &BatchAction, commission: &Commission) -> NewNotification {
    let amount: Money = commission.amount;
    match action {
        BatchAction::Approve => NewNotification::new(
            commission.partner_id,
            NotificationKind::CommissionApproved,
            "Commission approved",
            format!("Commission of {amount} has been approved"),
        ),
        BatchAction::Reject { reason } => NewNotification::new(
            commission.partner_id,
            NotificationKind::CommissionRejected,
            "Commission rejected",
            format!("Commission of {amount} was rejected: {reason}"),
        ),
        BatchAction::Pay { payment_reference } => NewNotification::new(
            commission.partner_id,
            NotificationKind::PayoutProcessed,
            "Commission paid",
            format!("Commission of {amount} was paid ({payment_reference})"),
        ),
    }
}
