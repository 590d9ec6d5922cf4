//! The attribution cache: the hot path between inbound traffic and the durable ledger.
//!
//! Three keyspaces, each with its own expiry policy:
//! * referral-code -> partner lookups, with a short bounded TTL so rate or status changes are
//!   picked up within one TTL without re-querying the ledger on every request;
//! * session -> partner attributions, with a TTL equal to the attribution window. The cache is
//!   authoritative for the hot path; the ledger's click row is the fallback of record after an
//!   eviction or restart;
//! * live sessions, with a time-to-idle equal to the session timeout, so every touch resets the
//!   30-minute inactivity timer.
//!
//! The cache is an optimisation, never a correctness dependency: every entry can be rebuilt from
//! the ledger, and every consumer falls back to it on a miss.
use moka::future::Cache;

use crate::{
    config::PipelineConfig,
    db_types::{Attribution, LiveSession, Partner, ReferralCode, SessionKey},
};

pub struct AttributionCache {
    partners: Cache<String, Partner>,
    attributions: Cache<String, Attribution>,
    sessions: Cache<String, LiveSession>,
}

impl AttributionCache {
    pub fn new(config: &PipelineConfig) -> Self {
        let partners = Cache::builder()
            .max_capacity(config.partner_cache_capacity)
            .time_to_live(config.partner_cache_ttl.to_std().unwrap_or_default())
            .build();
        let attributions = Cache::builder()
            .max_capacity(config.attribution_cache_capacity)
            .time_to_live(config.attribution_window.to_std().unwrap_or_default())
            .build();
        let sessions = Cache::builder()
            .max_capacity(config.session_cache_capacity)
            .time_to_idle(config.session_timeout.to_std().unwrap_or_default())
            .build();
        Self { partners, attributions, sessions }
    }

    pub async fn partner(&self, code: &ReferralCode) -> Option<Partner> {
        self.partners.get(code.as_str()).await
    }

    pub async fn put_partner(&self, partner: &Partner) {
        self.partners.insert(partner.referral_code.0.clone(), partner.clone()).await;
    }

    /// Drops the cached lookup for a partner so the next resolution re-reads the ledger.
    /// Called after anything that changes the partner row (status, rate, earnings).
    pub async fn invalidate_partner(&self, code: &ReferralCode) {
        self.partners.invalidate(code.as_str()).await;
    }

    pub async fn attribution(&self, key: &SessionKey) -> Option<Attribution> {
        self.attributions.get(key.as_str()).await
    }

    pub async fn put_attribution(&self, key: &SessionKey, attribution: Attribution) {
        self.attributions.insert(key.0.clone(), attribution).await;
    }

    pub async fn session(&self, key: &SessionKey) -> Option<LiveSession> {
        self.sessions.get(key.as_str()).await
    }

    /// Inserting also resets the idle timer, which is exactly the "activity extends the session"
    /// semantics.
    pub async fn put_session(&self, live: LiveSession) {
        self.sessions.insert(live.session_key.0.clone(), live).await;
    }

    pub async fn remove_session(&self, key: &SessionKey) {
        self.sessions.invalidate(key.as_str()).await;
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use chrono::Utc;

    use super::*;
    use crate::db_types::Attribution;

    fn test_config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[tokio::test]
    async fn attribution_round_trip() {
        let cache = AttributionCache::new(&test_config());
        let key = SessionKey::from("sess-1");
        let attribution = Attribution {
            partner_id: 7,
            referral_code: ReferralCode::from_str("AFF-TEST42-AAA").unwrap(),
            clicked_at: Utc::now(),
        };
        cache.put_attribution(&key, attribution.clone()).await;
        assert_eq!(cache.attribution(&key).await, Some(attribution));
        assert!(cache.attribution(&SessionKey::from("sess-2")).await.is_none());
    }

    #[tokio::test]
    async fn partner_lookups_expire_after_their_ttl() {
        let mut config = test_config();
        config.partner_cache_ttl = chrono::Duration::milliseconds(50);
        let cache = AttributionCache::new(&config);
        let partner = test_partner();
        cache.put_partner(&partner).await;
        assert!(cache.partner(&partner.referral_code).await.is_some());
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(cache.partner(&partner.referral_code).await.is_none());
    }

    #[tokio::test]
    async fn invalidation_drops_partner_lookups() {
        let cache = AttributionCache::new(&test_config());
        let partner = test_partner();
        cache.put_partner(&partner).await;
        cache.invalidate_partner(&partner.referral_code).await;
        assert!(cache.partner(&partner.referral_code).await.is_none());
    }

    fn test_partner() -> Partner {
        use acl_common::{CommissionRate, Money};

        use crate::db_types::PartnerStatus;
        let now = Utc::now();
        Partner {
            id: 1,
            referral_code: ReferralCode::from_str("AFF-TEST42-BBB").unwrap(),
            display_name: "Test Partner".to_string(),
            contact_email: None,
            website_url: None,
            status: PartnerStatus::Active,
            commission_rate: CommissionRate::percent(10).unwrap(),
            total_earnings: Money::default(),
            pending_earnings: Money::default(),
            paid_earnings: Money::default(),
            total_clicks: 0,
            total_conversions: 0,
            last_click_at: None,
            last_conversion_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
