use std::fmt::Display;

use acl_common::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{CommissionStatus, SessionKey};

//-------------------------------------- CommissionQueryFilter -------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommissionQueryFilter {
    pub partner_id: Option<i64>,
    pub status: Option<Vec<CommissionStatus>>,
    pub payout_id: Option<i64>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CommissionQueryFilter {
    pub fn with_partner_id(mut self, partner_id: i64) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_status(mut self, status: CommissionStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payout_id(mut self, payout_id: i64) -> Self {
        self.payout_id = Some(payout_id);
        self
    }

    pub fn with_min_amount(mut self, amount: Money) -> Self {
        self.min_amount = Some(amount);
        self
    }

    pub fn with_max_amount(mut self, amount: Money) -> Self {
        self.max_amount = Some(amount);
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
            && self.payout_id.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }
}

impl Display for CommissionQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(partner_id) = self.partner_id {
            write!(f, "partner_id: {partner_id}. ")?;
        }
        if let Some(statuses) = &self.status {
            let s = statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "status in [{s}]. ")?;
        }
        if let Some(payout_id) = self.payout_id {
            write!(f, "payout_id: {payout_id}. ")?;
        }
        if let Some(min) = self.min_amount {
            write!(f, "amount >= {min}. ")?;
        }
        if let Some(max) = self.max_amount {
            write!(f, "amount <= {max}. ")?;
        }
        if let Some(since) = self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

//--------------------------------------  ClickQueryFilter   ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickQueryFilter {
    pub partner_id: Option<i64>,
    pub session_key: Option<SessionKey>,
    pub converted: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ClickQueryFilter {
    pub fn with_partner_id(mut self, partner_id: i64) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn converted_only(mut self) -> Self {
        self.converted = Some(true);
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
            && self.session_key.is_none()
            && self.converted.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }
}

//--------------------------------------    PartnerStats     ---------------------------------------------------------
/// Read-only performance summary for a partner over a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerStats {
    pub partner_id: i64,
    pub total_clicks: i64,
    pub total_conversions: i64,
    /// Conversions per click, lifetime, as a percentage.
    pub conversion_rate: f64,
    pub total_earnings: Money,
    pub pending_earnings: Money,
    pub paid_earnings: Money,
    pub pending_commissions: u64,
    pub approved_commissions: u64,
    pub rejected_commissions: u64,
    pub paid_commissions: u64,
    /// Sum of commission amounts created inside the queried range (rejected ones excluded).
    pub period_commission_total: Money,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
