//! The money path: conversion recording, the commission state machine, and the earnings
//! invariants that must hold at every observable point.
use acl_common::CommissionRate;
use acl_engine::{
    api::CommissionApiError,
    db_types::{Actor, AuditEntityType, CommissionStatus, ConversionType, NewConversion, PartnerStatus},
};

mod support;
use support::{fetch_partner, money, pipeline, record_click, record_sale, seed_partner, tear_down};

#[tokio::test]
async fn end_to_end_referral_flow() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    record_click(&p, &code, "S1").await;

    // $200.00 at 10% -> $20.00 pending
    let result = record_sale(&p, "S1", "O1", "200.00").await;
    assert!(!result.duplicate);
    assert_eq!(result.commission.amount, money("20.00"));
    assert_eq!(result.commission.status, CommissionStatus::Pending);
    assert_eq!(result.conversion.commission_rate, CommissionRate::percent(10).unwrap());

    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("20.00"));
    assert_eq!(partner_row.total_earnings, money("20.00"));
    assert_eq!(partner_row.paid_earnings, money("0.00"));
    assert_eq!(partner_row.total_conversions, 1);
    assert!(partner_row.earnings_balance());

    // approval stamps the approver and leaves the buckets alone
    let approved = p.commissions.approve(result.commission.id, &admin).await.unwrap();
    assert_eq!(approved.status, CommissionStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some("alice"));
    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("20.00"));

    // payment moves the amount from pending to paid; the total is conserved
    let paid = p.commissions.pay(result.commission.id, &admin, "TXN1").await.unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);
    assert_eq!(paid.payment_reference.as_deref(), Some("TXN1"));
    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("0.00"));
    assert_eq!(partner_row.paid_earnings, money("20.00"));
    assert_eq!(partner_row.total_earnings, money("20.00"));
    assert!(partner_row.earnings_balance());

    // every transition left its own audit row, with a field-level diff
    let trail = p.partners.audit_trail(AuditEntityType::Commission, paid.id).await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["approve", "pay"]);
    let diff = trail[1].diff.as_ref().unwrap();
    assert_eq!(diff.0["status"]["from"], "Approved");
    assert_eq!(diff.0["status"]["to"], "Paid");

    tear_down(p).await;
}

#[tokio::test]
async fn conversions_are_idempotent_on_the_order_id() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    let first = record_sale(&p, "S1", "O1", "100.00").await;
    let second = record_sale(&p, "S1", "O1", "100.00").await;
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.conversion.id, second.conversion.id);
    assert_eq!(first.commission.id, second.commission.id);

    // counted exactly once
    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.total_conversions, 1);
    assert_eq!(partner_row.pending_earnings, money("10.00"));
    tear_down(p).await;
}

#[tokio::test]
async fn rejection_reverses_pending_earnings() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let result = record_sale(&p, "S1", "O1", "50.00").await;
    assert_eq!(result.commission.amount, money("5.00"));

    let rejected =
        p.commissions.reject(result.commission.id, &Actor::admin("alice"), "self-referral").await.unwrap();
    assert_eq!(rejected.status, CommissionStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("self-referral"));

    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("0.00"));
    assert_eq!(partner_row.total_earnings, money("0.00"));
    assert_eq!(partner_row.paid_earnings, money("0.00"));
    assert!(partner_row.earnings_balance());
    tear_down(p).await;
}

#[tokio::test]
async fn rejected_is_terminal() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let result = record_sale(&p, "S1", "O1", "50.00").await;
    let admin = Actor::admin("alice");
    p.commissions.reject(result.commission.id, &admin, "fraud").await.unwrap();

    let approve = p.commissions.approve(result.commission.id, &admin).await;
    assert!(matches!(
        approve,
        Err(CommissionApiError::InvalidState { actual: CommissionStatus::Rejected, .. })
    ));
    tear_down(p).await;
}

#[tokio::test]
async fn paying_an_unapproved_commission_is_illegal() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let result = record_sale(&p, "S1", "O1", "80.00").await;

    let paid = p.commissions.pay(result.commission.id, &Actor::admin("alice"), "TXN9").await;
    assert!(matches!(
        paid,
        Err(CommissionApiError::InvalidState { actual: CommissionStatus::Pending, .. })
    ));

    // nothing moved
    let partner_row = fetch_partner(&p, partner.id).await;
    assert_eq!(partner_row.pending_earnings, money("8.00"));
    assert_eq!(partner_row.paid_earnings, money("0.00"));
    tear_down(p).await;
}

#[tokio::test]
async fn rate_changes_never_rewrite_history() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    record_click(&p, &code, "S1").await;
    let before = record_sale(&p, "S1", "O1", "100.00").await;
    assert_eq!(before.commission.amount, money("10.00"));

    p.partners.set_commission_rate(partner.id, CommissionRate::percent(20).unwrap(), &admin).await.unwrap();

    record_click(&p, &code, "S2").await;
    let after = record_sale(&p, "S2", "O2", "100.00").await;
    assert_eq!(after.commission.amount, money("20.00"));

    // the first commission still carries its original snapshot
    let stored = p.partners.search_commissions(Default::default()).await.unwrap();
    let original = stored.iter().find(|c| c.id == before.commission.id).unwrap();
    assert_eq!(original.commission_rate, CommissionRate::percent(10).unwrap());
    assert_eq!(original.amount, money("10.00"));
    tear_down(p).await;
}

#[tokio::test]
async fn conversions_without_attribution_are_refused() {
    let p = pipeline().await;
    seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let result = p
        .commissions
        .record_conversion(NewConversion::new("untracked", money("10.00"), ConversionType::Sale))
        .await;
    assert!(matches!(result, Err(CommissionApiError::Attribution(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn suspended_partners_earn_nothing() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    p.partners.set_status(partner.id, PartnerStatus::Suspended, &Actor::admin("alice")).await.unwrap();

    let result = p
        .commissions
        .record_conversion(NewConversion::new("S1", money("100.00"), ConversionType::Sale).with_order_id("O1".to_string()))
        .await;
    assert!(matches!(result, Err(CommissionApiError::Attribution(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn non_positive_amounts_fail_validation() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    let result = p
        .commissions
        .record_conversion(NewConversion::new("S1", money("0.00"), ConversionType::Sale))
        .await;
    assert!(matches!(result, Err(CommissionApiError::ValidationError(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn earnings_invariant_holds_across_mixed_activity() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 15).await;
    let code = partner.referral_code.clone();
    let admin = Actor::admin("alice");

    let mut commission_ids = Vec::new();
    for (session, order, amount) in
        [("S1", "O1", "40.00"), ("S2", "O2", "100.00"), ("S3", "O3", "19.99"), ("S4", "O4", "250.00")]
    {
        record_click(&p, &code, session).await;
        let result = record_sale(&p, session, order, amount).await;
        commission_ids.push(result.commission.id);
    }

    p.commissions.reject(commission_ids[0], &admin, "test order").await.unwrap();
    p.commissions.approve(commission_ids[1], &admin).await.unwrap();
    p.commissions.pay(commission_ids[1], &admin, "TXN-100").await.unwrap();
    p.commissions.approve(commission_ids[2], &admin).await.unwrap();

    let partner_row = fetch_partner(&p, partner.id).await;
    assert!(partner_row.earnings_balance());
    // 15% of 100 paid; 15% of 19.99 and 250.00 still pending (3.00 + 37.50)
    assert_eq!(partner_row.paid_earnings, money("15.00"));
    assert_eq!(partner_row.pending_earnings, money("40.50"));
    assert_eq!(partner_row.total_earnings, money("55.50"));
    tear_down(p).await;
}
