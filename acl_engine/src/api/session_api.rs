use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::{SessionApiError, SessionMetrics, SessionQueryFilter},
    cache::AttributionCache,
    config::PipelineConfig,
    db_types::{LiveSession, PageView, Session, SessionKey, SessionStatus},
    events::{EventProducers, SessionEndedEvent},
    traits::LedgerDatabase,
};

/// `SessionApi` manages the lifecycle of attribution sessions.
///
/// Sessions are created by the first click (see
/// [`crate::api::AttributionApi::record_click`]). From then on the authoritative copy lives in
/// the cache; every tracked activity extends the 30-minute inactivity timer, and the durable row
/// is only refreshed every Nth event to bound write amplification, then unconditionally on end.
/// A periodic sweep catches sessions whose cache entry was lost.
pub struct SessionApi<B> {
    db: B,
    cache: Arc<AttributionCache>,
    producers: EventProducers,
    config: PipelineConfig,
}

impl<B> Debug for SessionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionApi")
    }
}

impl<B> SessionApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B, cache: Arc<AttributionCache>, producers: EventProducers, config: PipelineConfig) -> Self {
        Self { db, cache, producers, config }
    }

    /// Records a page view (or other tracked event) for an active session and extends its
    /// inactivity timer. The durable copy is refreshed once every
    /// [`PipelineConfig::session_reconcile_every`] events.
    pub async fn track_activity(&self, key: &SessionKey, url: &str) -> Result<LiveSession, SessionApiError> {
        let mut live = self.live_session(key).await?;
        live.record_page_view(PageView::now(url));
        if live.events_since_reconcile >= self.config.session_reconcile_every {
            self.db.upsert_session(&live).await?;
            live.events_since_reconcile = 0;
            trace!("⏱️ Session [{key}] reconciled to the ledger ({} page views)", live.page_views.len());
        }
        self.cache.put_session(live.clone()).await;
        Ok(live)
    }

    /// Explicitly ends a session: final reconcile, duration and bounce computation, and a
    /// `SessionEnded` event. Ending an already-ended session returns the stored row unchanged.
    pub async fn end_session(&self, key: &SessionKey) -> Result<Session, SessionApiError> {
        let live = match self.cache.session(key).await {
            Some(live) => live,
            None => {
                let row = self
                    .db
                    .fetch_session(key)
                    .await?
                    .ok_or_else(|| SessionApiError::SessionNotFound(key.clone()))?;
                if row.status == SessionStatus::Ended {
                    return Ok(row);
                }
                LiveSession::from_row(&row)
            },
        };
        let ended = self.db.end_session(&live, Utc::now()).await?;
        self.cache.remove_session(key).await;
        self.call_session_ended_hook(&ended).await;
        Ok(ended)
    }

    /// The periodic sweep: forces Ended on durable sessions whose last activity predates the
    /// inactivity threshold. This is what ends sessions whose cache entry was evicted or lost to
    /// a restart.
    pub async fn sweep_expired(&self) -> Result<Vec<Session>, SessionApiError> {
        let swept = self.db.end_stale_sessions(self.config.session_timeout).await?;
        for session in &swept {
            self.cache.remove_session(&session.session_key).await;
            self.call_session_ended_hook(session).await;
        }
        if !swept.is_empty() {
            info!("⏱️ Sweep ended {} inactive session(s)", swept.len());
        }
        Ok(swept)
    }

    /// Funnel metrics for a partner over a date range. Read-only; scans matching sessions.
    pub async fn metrics(
        &self,
        partner_id: i64,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<SessionMetrics, SessionApiError> {
        let mut filter = SessionQueryFilter::default().with_partner_id(partner_id);
        if let Some(since) = since {
            filter = filter.since(since);
        }
        if let Some(until) = until {
            filter = filter.until(until);
        }
        let sessions = self.db.search_sessions(filter).await?;
        Ok(SessionMetrics::from_sessions(&sessions))
    }

    /// The working copy of an active session: cache-first, rebuilt from the durable row after a
    /// cache miss (the row may be up to one reconcile interval behind; that is the accepted
    /// consistency window).
    async fn live_session(&self, key: &SessionKey) -> Result<LiveSession, SessionApiError> {
        if let Some(live) = self.cache.session(key).await {
            return Ok(live);
        }
        let row =
            self.db.fetch_session(key).await?.ok_or_else(|| SessionApiError::SessionNotFound(key.clone()))?;
        if row.status == SessionStatus::Ended {
            return Err(SessionApiError::SessionEnded(key.clone()));
        }
        trace!("⏱️ Session [{key}] restored from the ledger after a cache miss");
        Ok(LiveSession::from_row(&row))
    }

    async fn call_session_ended_hook(&self, session: &Session) {
        for producer in &self.producers.session_ended {
            let event = SessionEndedEvent::new(session.clone());
            producer.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
