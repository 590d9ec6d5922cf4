//! Session lifecycle: cache-authoritative tracking, batched reconciliation, expiry sweep,
//! funnel metrics.
use acl_engine::{
    db_types::{Metadata, NewClick, SessionKey, SessionStatus},
    events::EventProducers,
    PartnerManagement,
    PipelineConfig,
};

mod support;
use support::{money, pipeline, pipeline_with, record_click, record_sale, seed_partner, tear_down};

#[tokio::test]
async fn first_click_starts_a_session() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    let session = p.db.fetch_session(&SessionKey::from("S1")).await.unwrap().expect("session row");
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.partner_id, partner.id);
    assert_eq!(session.page_views.0.len(), 1);
    assert_eq!(session.page_views.0[0].url, "https://example.com/landing");
    tear_down(p).await;
}

#[tokio::test]
async fn durable_copy_is_refreshed_every_nth_event() {
    let mut config = PipelineConfig::default();
    config.session_reconcile_every = 3;
    let p = pipeline_with(config, EventProducers::default()).await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let key = SessionKey::from("S1");

    // two tracked events stay cache-only
    p.sessions.track_activity(&key, "https://example.com/products").await.unwrap();
    p.sessions.track_activity(&key, "https://example.com/pricing").await.unwrap();
    let durable = p.db.fetch_session(&key).await.unwrap().unwrap();
    assert_eq!(durable.page_views.0.len(), 1, "durable copy should trail the cache");

    // the third one crosses the reconcile interval and flushes everything
    p.sessions.track_activity(&key, "https://example.com/checkout").await.unwrap();
    let durable = p.db.fetch_session(&key).await.unwrap().unwrap();
    assert_eq!(durable.page_views.0.len(), 4);
    tear_down(p).await;
}

#[tokio::test]
async fn ending_a_session_computes_duration_and_bounce() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();

    // a one-page session is a bounce
    record_click(&p, &code, "S1").await;
    let bounced = p.sessions.end_session(&SessionKey::from("S1")).await.unwrap();
    assert_eq!(bounced.status, SessionStatus::Ended);
    assert!(bounced.bounce);
    assert!(bounced.duration_secs.unwrap_or(-1) >= 0);

    // a session with further activity is not
    record_click(&p, &code, "S2").await;
    p.sessions.track_activity(&SessionKey::from("S2"), "https://example.com/pricing").await.unwrap();
    let engaged = p.sessions.end_session(&SessionKey::from("S2")).await.unwrap();
    assert!(!engaged.bounce);
    assert_eq!(engaged.page_views.0.len(), 2);
    tear_down(p).await;
}

#[tokio::test]
async fn ending_twice_is_a_no_op() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    let key = SessionKey::from("S1");

    let first = p.sessions.end_session(&key).await.unwrap();
    let second = p.sessions.end_session(&key).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.status, SessionStatus::Ended);
    tear_down(p).await;
}

#[tokio::test]
async fn sweep_ends_sessions_that_went_quiet() {
    let mut config = PipelineConfig::default();
    config.session_timeout = chrono::Duration::seconds(1);
    let p = pipeline_with(config, EventProducers::default()).await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;

    // nothing to sweep while the session is fresh
    assert!(p.sessions.sweep_expired().await.unwrap().is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
    let swept = p.sessions.sweep_expired().await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].session_key, SessionKey::from("S1"));
    assert_eq!(swept[0].status, SessionStatus::Ended);
    assert!(swept[0].bounce);

    // idempotent: a second sweep finds nothing
    assert!(p.sessions.sweep_expired().await.unwrap().is_empty());
    tear_down(p).await;
}

#[tokio::test]
async fn conversion_marks_the_session() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    record_click(&p, &partner.referral_code, "S1").await;
    record_sale(&p, "S1", "O1", "75.00").await;

    let session = p.db.fetch_session(&SessionKey::from("S1")).await.unwrap().unwrap();
    assert!(session.converted);
    assert_eq!(session.conversion_value, Some(money("75.00")));
    tear_down(p).await;
}

#[tokio::test]
async fn metrics_summarise_the_funnel() {
    let p = pipeline().await;
    let partner = seed_partner(&p, "AFF-AB12CD-E3F", 10).await;
    let code = partner.referral_code.clone();

    // a converted two-page mobile session
    let mut mobile = NewClick::new("S1", "203.0.113.7", "https://example.com/landing");
    mobile.metadata = Metadata { device: Some("mobile".to_string()), ..Default::default() };
    mobile.source = Some("newsletter".to_string());
    p.attribution.record_click(&code, mobile).await.unwrap();
    p.sessions.track_activity(&SessionKey::from("S1"), "https://example.com/checkout").await.unwrap();
    record_sale(&p, "S1", "O1", "120.00").await;
    p.sessions.end_session(&SessionKey::from("S1")).await.unwrap();

    // a bounced desktop session
    let mut desktop = NewClick::new("S2", "198.51.100.4", "https://example.com/landing");
    desktop.metadata = Metadata { device: Some("desktop".to_string()), ..Default::default() };
    p.attribution.record_click(&code, desktop).await.unwrap();
    p.sessions.end_session(&SessionKey::from("S2")).await.unwrap();

    let metrics = p.sessions.metrics(partner.id, None, None).await.unwrap();
    assert_eq!(metrics.total_sessions, 2);
    assert_eq!(metrics.ended_sessions, 2);
    assert_eq!(metrics.converted_sessions, 1);
    assert!((metrics.conversion_rate - 50.0).abs() < f64::EPSILON);
    assert!((metrics.bounce_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(metrics.total_conversion_value, money("120.00"));
    assert_eq!(metrics.device_breakdown.get("mobile"), Some(&1));
    assert_eq!(metrics.device_breakdown.get("desktop"), Some(&1));
    assert_eq!(metrics.source_breakdown.get("newsletter"), Some(&1));
    assert_eq!(metrics.top_landing_pages[0].url, "https://example.com/landing");
    assert_eq!(metrics.top_landing_pages[0].sessions, 2);
    tear_down(p).await;
}
