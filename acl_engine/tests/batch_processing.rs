//! Batch commission processing: per-item isolation, per-commission audit rows, per-partner
//! event coalescing.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use acl_engine::{
    api::CommissionApiError,
    db_types::{Actor, AuditEntityType, CommissionStatus},
    events::{EventHandlers, EventHooks},
    traits::{BatchAction, BatchItemError},
};
use futures_util::FutureExt;

mod support;
use support::{fetch_partner, money, pipeline, pipeline_with, record_click, record_sale, seed_partner, tear_down};

#[tokio::test]
async fn a_bad_item_does_not_abort_its_siblings() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    let mut ids = Vec::new();
    for (session, order) in [("S1", "O1"), ("S2", "O2"), ("S3", "O3")] {
        record_click(&p, &code, session).await;
        ids.push(record_sale(&p, session, order, "100.00").await.commission.id);
    }
    // the third commission is already paid before the batch runs
    p.commissions.approve(ids[2], &admin).await.unwrap();
    p.commissions.pay(ids[2], &admin, "TXN-PRE").await.unwrap();

    let outcome = p.commissions.process_commissions(&ids, BatchAction::Approve, &admin).await.unwrap();
    assert_eq!(outcome.succeeded(), 2);
    assert_eq!(outcome.failed(), 1);

    let failure = outcome.items.iter().find(|i| i.commission_id == ids[2]).unwrap();
    assert!(matches!(
        failure.outcome,
        Err(BatchItemError::InvalidState { actual: CommissionStatus::Paid, .. })
    ));

    // the already-paid commission is untouched
    let paid = p.db_commission(ids[2]).await;
    assert_eq!(paid.status, CommissionStatus::Paid);
    assert_eq!(paid.payment_reference.as_deref(), Some("TXN-PRE"));
    tear_down(p).await;
}

#[tokio::test]
async fn missing_ids_are_item_failures_unless_nothing_matches() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let id = record_sale(&p, "S1", "O1", "100.00").await.commission.id;
    let admin = Actor::admin("alice");

    // a mixed batch records the unknown id as an item-level failure
    let outcome = p.commissions.process_commissions(&[id, 9999], BatchAction::Approve, &admin).await.unwrap();
    assert_eq!(outcome.succeeded(), 1);
    assert!(matches!(
        outcome.items.iter().find(|i| i.commission_id == 9999).unwrap().outcome,
        Err(BatchItemError::NotFound(9999))
    ));

    // but a batch that resolves to zero rows is a whole-call error
    let result = p.commissions.process_commissions(&[777, 888], BatchAction::Approve, &admin).await;
    assert!(matches!(result, Err(CommissionApiError::NoMatchingCommissions)));

    // and an empty id set never reaches the ledger
    let result = p.commissions.process_commissions(&[], BatchAction::Approve, &admin).await;
    assert!(matches!(result, Err(CommissionApiError::ValidationError(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn batch_writes_one_audit_row_per_commission() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    let mut ids = Vec::new();
    for (session, order) in [("S1", "O1"), ("S2", "O2")] {
        record_click(&p, &code, session).await;
        ids.push(record_sale(&p, session, order, "100.00").await.commission.id);
    }
    p.commissions.process_commissions(&ids, BatchAction::Approve, &admin).await.unwrap();

    for id in ids {
        let trail = p.partners.audit_trail(AuditEntityType::Commission, id).await.unwrap();
        assert_eq!(trail.len(), 1, "expected exactly one audit row for commission {id}");
        assert_eq!(trail[0].action, "approve");
    }
    tear_down(p).await;
}

#[tokio::test]
async fn batch_pay_emits_one_event_per_partner() {
    let settled_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&settled_events);
    let mut hooks = EventHooks::default();
    hooks.on_commissions_settled(move |event| {
        if event.action == "pay" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        async {}.boxed()
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let p = pipeline_with(Default::default(), producers).await;
    let admin = Actor::admin("alice");
    let partner_a = seed_partner(&p, "AFF-AAAAAA-AAA", 10).await;
    let partner_b = seed_partner(&p, "AFF-BBBBBB-BBB", 10).await;

    let mut ids = Vec::new();
    for (code, session, order) in [
        (&partner_a.referral_code, "SA1", "OA1"),
        (&partner_a.referral_code, "SA2", "OA2"),
        (&partner_b.referral_code, "SB1", "OB1"),
        (&partner_b.referral_code, "SB2", "OB2"),
    ] {
        record_click(&p, code, session).await;
        ids.push(record_sale(&p, session, order, "100.00").await.commission.id);
    }
    p.commissions.process_commissions(&ids, BatchAction::Approve, &admin).await.unwrap();
    let outcome = p
        .commissions
        .process_commissions(&ids, BatchAction::Pay { payment_reference: "TXN-BATCH".to_string() }, &admin)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded(), 4);
    assert_eq!(outcome.partners_affected.len(), 2);

    // four commissions paid, but exactly two CommissionsSettled events (one per partner)
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(settled_events.load(Ordering::SeqCst), 2);

    let a = fetch_partner(&p, partner_a.id).await;
    let b = fetch_partner(&p, partner_b.id).await;
    assert_eq!(a.paid_earnings, money("20.00"));
    assert_eq!(b.paid_earnings, money("20.00"));
    assert!(a.earnings_balance() && b.earnings_balance());
    tear_down(p).await;
}

#[tokio::test]
async fn batch_reject_reverses_each_partner_once_per_commission() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    let mut ids = Vec::new();
    for (session, order) in [("S1", "O1"), ("S2", "O2"), ("S3", "O3")] {
        record_click(&p, &code, session).await;
        ids.push(record_sale(&p, session, order, "30.00").await.commission.id);
    }
    assert_eq!(fetch_partner(&p, partner.id).await.pending_earnings, money("9.00"));

    let outcome = p
        .commissions
        .process_commissions(&ids, BatchAction::Reject { reason: "campaign cancelled".to_string() }, &admin)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded(), 3);

    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("0.00"));
    assert_eq!(partner_row.total_earnings, money("0.00"));
    assert!(partner_row.earnings_balance());
    tear_down(p).await;
}

impl support::Pipeline {
    async fn db_commission(&self, id: i64) -> acl_engine::db_types::Commission {
        use acl_engine::PartnerManagement;
        self.db.fetch_commission(id).await.unwrap().expect("commission should exist")
    }
}
