use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;

use crate::{
    api::AttributionApiError,
    cache::AttributionCache,
    config::PipelineConfig,
    db_types::{Attribution, Click, LiveSession, NewClick, Partner, ReferralCode, SessionKey},
    events::{ClickRecordedEvent, EventProducers},
    traits::{ClickResult, LedgerDatabase},
};

/// `AttributionApi` resolves referring partners and records clicks: the entry point of the
/// pipeline for inbound traffic.
///
/// The cache is authoritative for the hot path (partner lookups, session -> partner
/// associations); the ledger is the fallback of record and the only store that survives a
/// restart. Attribution must hold for the full 30-day window even across cache loss, which is
/// why every resolution path can rebuild its answer from the click row.
pub struct AttributionApi<B> {
    db: B,
    cache: Arc<AttributionCache>,
    producers: EventProducers,
    config: PipelineConfig,
}

impl<B> Debug for AttributionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AttributionApi")
    }
}

impl<B> AttributionApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B, cache: Arc<AttributionCache>, producers: EventProducers, config: PipelineConfig) -> Self {
        Self { db, cache, producers, config }
    }

    /// Resolves a referral code to its partner, cache-first. A miss falls through to the ledger
    /// and repopulates the cache (bounded TTL). Fails for unknown codes and for partners that
    /// are not Active.
    pub async fn resolve_partner(&self, code: &ReferralCode) -> Result<Partner, AttributionApiError> {
        let partner = match self.cache.partner(code).await {
            Some(partner) => partner,
            None => {
                let partner = self
                    .db
                    .fetch_partner_by_code(code)
                    .await?
                    .ok_or_else(|| AttributionApiError::UnknownReferralCode(code.clone()))?;
                self.cache.put_partner(&partner).await;
                trace!("🎯️ Cache miss for code [{code}]; repopulated from the ledger");
                partner
            },
        };
        if !partner.is_active() {
            return Err(AttributionApiError::InactivePartner { id: partner.id, status: partner.status });
        }
        Ok(partner)
    }

    /// Records a click for the referral code, idempotently on the session key.
    ///
    /// A first click creates the attribution association (30-day TTL) and seeds the visitor
    /// session in both cache and ledger, then emits a `ClickRecorded` event. A repeat submission
    /// for the same session returns the original click with `duplicate = true` and touches
    /// nothing else. This call never errors on duplicates.
    pub async fn record_click(&self, code: &ReferralCode, click: NewClick) -> Result<ClickResult, AttributionApiError> {
        let partner = self.resolve_partner(code).await?;
        let (click_row, inserted) = self.db.record_click(partner.id, click.clone()).await?;
        if !inserted {
            trace!("🎯️ Duplicate click for session [{}]; returning click #{}", click_row.session_key, click_row.id);
            return Ok(ClickResult { click: click_row, duplicate: true });
        }

        let attribution = Attribution {
            partner_id: partner.id,
            referral_code: partner.referral_code.clone(),
            clicked_at: click_row.created_at,
        };
        self.cache.put_attribution(&click_row.session_key, attribution).await;

        // first click for a session is also the start of its lifecycle
        let live = LiveSession::from_click(&partner, &click);
        self.db.upsert_session(&live).await?;
        self.cache.put_session(live).await;

        debug!("🎯️ Click #{} recorded for partner #{} (session [{}])", click_row.id, partner.id, click_row.session_key);
        self.call_click_recorded_hook(&click_row).await;
        Ok(ClickResult { click: click_row, duplicate: false })
    }

    /// Resolves the attribution for a session, used by the conversion path.
    ///
    /// Cache-first, with a defensive double-check: an association older than the attribution
    /// window fails `AttributionExpired` even if the cache entry has not been physically
    /// evicted. A cache miss falls back to the ledger's click row and repopulates.
    pub async fn resolve_attribution(&self, key: &SessionKey) -> Result<Attribution, AttributionApiError> {
        let now = Utc::now();
        if let Some(attribution) = self.cache.attribution(key).await {
            if attribution.age_at(now) > self.config.attribution_window {
                return Err(AttributionApiError::AttributionExpired(key.clone()));
            }
            return Ok(attribution);
        }

        let click = self
            .db
            .fetch_click_by_session(key)
            .await?
            .ok_or_else(|| AttributionApiError::NoAttribution(key.clone()))?;
        let partner = self.db.fetch_partner(click.partner_id).await?.ok_or_else(|| {
            AttributionApiError::DatabaseError(format!(
                "Click #{} references partner #{}, which does not exist",
                click.id, click.partner_id
            ))
        })?;
        let attribution = Attribution {
            partner_id: click.partner_id,
            referral_code: partner.referral_code,
            clicked_at: click.created_at,
        };
        if attribution.age_at(now) > self.config.attribution_window {
            return Err(AttributionApiError::AttributionExpired(key.clone()));
        }
        trace!("🎯️ Attribution for session [{key}] rebuilt from the ledger");
        self.cache.put_attribution(key, attribution.clone()).await;
        Ok(attribution)
    }

    async fn call_click_recorded_hook(&self, click: &Click) {
        for producer in &self.producers.click_recorded {
            let event = ClickRecordedEvent::new(click.clone());
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
