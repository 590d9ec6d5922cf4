//! Attribution engine: idempotent click recording, cache-first resolution, window expiry.
use std::{str::FromStr, sync::Arc};

use acl_engine::{
    api::AttributionApiError,
    cache::AttributionCache,
    db_types::{Actor, NewClick, PartnerStatus, ReferralCode, SessionKey},
    events::EventProducers,
    AttributionApi,
    PipelineConfig,
};

mod support;
use support::{fetch_partner, pipeline, pipeline_with, record_click, seed_partner, tear_down};

#[tokio::test]
async fn click_is_recorded_exactly_once_per_session() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();

    let first = record_click(&p, &code, "S1").await;
    assert!(!first.duplicate);

    let second = record_click(&p, &code, "S1").await;
    assert!(second.duplicate);
    assert_eq!(first.click.id, second.click.id);

    let partner = fetch_partner(&p, partner.id).await;
    assert_eq!(partner.total_clicks, 1);
    assert!(partner.last_click_at.is_some());
    tear_down(p).await;
}

#[tokio::test]
async fn unknown_referral_code_is_rejected() {
    let p = pipeline().await;
    let code = ReferralCode::from_str("AFF-NOBODY-XYZ").unwrap();
    let result = p.attribution.record_click(&code, NewClick::new("S1", "203.0.113.7", "https://x.test/")).await;
    assert!(matches!(result, Err(AttributionApiError::UnknownReferralCode(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn suspended_partner_receives_no_attribution() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();
    record_click(&p, &code, "S1").await;

    p.partners.set_status(partner.id, PartnerStatus::Suspended, &Actor::admin("alice")).await.unwrap();
    let result = p.attribution.record_click(&code, NewClick::new("S2", "203.0.113.7", "https://x.test/")).await;
    assert!(matches!(
        result,
        Err(AttributionApiError::InactivePartner { status: PartnerStatus::Suspended, .. })
    ));
    tear_down(p).await;
}

#[tokio::test]
async fn status_changes_are_audited() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    p.partners.set_status(partner.id, PartnerStatus::Inactive, &Actor::admin("alice")).await.unwrap();

    use acl_engine::db_types::AuditEntityType;
    let trail = p.partners.audit_trail(AuditEntityType::Partner, partner.id).await.unwrap();
    let status_change = trail.iter().find(|e| e.action == "status_change").expect("expected an audit entry");
    assert_eq!(status_change.actor_id, "alice");
    let diff = status_change.diff.as_ref().unwrap();
    assert_eq!(diff.0["status"]["from"], "Active");
    assert_eq!(diff.0["status"]["to"], "Inactive");
    tear_down(p).await;
}

#[tokio::test]
async fn attribution_survives_a_cache_loss() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    // a fresh cache simulates eviction or a process restart; the ledger's click row answers
    let cold = AttributionApi::new(
        p.db.clone(),
        Arc::new(AttributionCache::new(&p.config)),
        EventProducers::default(),
        p.config.clone(),
    );
    let attribution = cold.resolve_attribution(&SessionKey::from("S1")).await.unwrap();
    assert_eq!(attribution.partner_id, partner.id);
    assert_eq!(attribution.referral_code, partner.referral_code);
    tear_down(p).await;
}

#[tokio::test]
async fn resolving_an_untracked_session_reports_no_attribution() {
    let p = pipeline().await;
    let result = p.attribution.resolve_attribution(&SessionKey::from("never-seen")).await;
    assert!(matches!(result, Err(AttributionApiError::NoAttribution(_))));
    tear_down(p).await;
}

#[tokio::test]
async fn attribution_expires_after_the_window() {
    let mut config = PipelineConfig::default();
    config.attribution_window = chrono::Duration::seconds(1);
    let p = pipeline_with(config, EventProducers::default()).await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;
    let result = p.attribution.resolve_attribution(&SessionKey::from("S1")).await;
    assert!(matches!(result, Err(AttributionApiError::AttributionExpired(_))));
    tear_down(p).await;
}
