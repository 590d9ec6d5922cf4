use std::collections::BTreeMap;

use acl_common::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Session, SessionStatus};

//--------------------------------------  SessionQueryFilter  --------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionQueryFilter {
    pub partner_id: Option<i64>,
    pub status: Option<SessionStatus>,
    pub converted: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SessionQueryFilter {
    pub fn with_partner_id(mut self, partner_id: i64) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.partner_id.is_none()
            && self.status.is_none()
            && self.converted.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }
}

//--------------------------------------   SessionMetrics    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandingPageCount {
    pub url: String,
    pub sessions: u64,
}

/// Funnel metrics for a partner's sessions over a date range. Computed by scanning the matching
/// sessions; read-only, no side effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_sessions: u64,
    pub ended_sessions: u64,
    pub converted_sessions: u64,
    /// Converted sessions per session, as a percentage.
    pub conversion_rate: f64,
    /// Mean duration of ended sessions, in seconds.
    pub average_duration_secs: f64,
    /// Share of ended sessions with exactly one page view, as a percentage.
    pub bounce_rate: f64,
    pub total_conversion_value: Money,
    pub device_breakdown: BTreeMap<String, u64>,
    pub browser_breakdown: BTreeMap<String, u64>,
    pub source_breakdown: BTreeMap<String, u64>,
    /// The ten most common first-page URLs.
    pub top_landing_pages: Vec<LandingPageCount>,
}

impl SessionMetrics {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let mut metrics = SessionMetrics { total_sessions: sessions.len() as u64, ..Default::default() };
        let mut duration_sum = 0i64;
        let mut bounces = 0u64;
        let mut landing_counts: BTreeMap<String, u64> = BTreeMap::new();

        for session in sessions {
            if session.converted {
                metrics.converted_sessions += 1;
                if let Some(value) = session.conversion_value {
                    metrics.total_conversion_value += value;
                }
            }
            if session.status == SessionStatus::Ended {
                metrics.ended_sessions += 1;
                duration_sum += session.duration_secs.unwrap_or(0);
                if session.bounce {
                    bounces += 1;
                }
            }
            let bump = |map: &mut BTreeMap<String, u64>, key: &Option<String>| {
                if let Some(key) = key {
                    *map.entry(key.clone()).or_default() += 1;
                }
            };
            bump(&mut metrics.device_breakdown, &session.device);
            bump(&mut metrics.browser_breakdown, &session.browser);
            bump(&mut metrics.source_breakdown, &session.source);
            if let Some(first) = session.page_views.0.first() {
                *landing_counts.entry(first.url.clone()).or_default() += 1;
            }
        }

        if metrics.total_sessions > 0 {
            metrics.conversion_rate = metrics.converted_sessions as f64 / metrics.total_sessions as f64 * 100.0;
        }
        if metrics.ended_sessions > 0 {
            metrics.average_duration_secs = duration_sum as f64 / metrics.ended_sessions as f64;
            metrics.bounce_rate = bounces as f64 / metrics.ended_sessions as f64 * 100.0;
        }

        let mut pages: Vec<LandingPageCount> =
            landing_counts.into_iter().map(|(url, sessions)| LandingPageCount { url, sessions }).collect();
        pages.sort_by(|a, b| b.sessions.cmp(&a.sessions).then_with(|| a.url.cmp(&b.url)));
        pages.truncate(10);
        metrics.top_landing_pages = pages;

        metrics
    }
}
