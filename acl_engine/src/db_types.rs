use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use acl_common::{CommissionRate, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

use crate::helpers::is_valid_referral_code;

//--------------------------------------    ReferralCode     ---------------------------------------------------------
/// A partner's unique referral code, e.g. `AFF-AB12CD-E3F`. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ReferralCode(pub String);

#[derive(Debug, Clone, Error)]
#[error("Invalid referral code: {0}")]
pub struct InvalidReferralCode(String);

impl FromStr for ReferralCode {
    type Err = InvalidReferralCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_referral_code(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidReferralCode(s.to_string()))
        }
    }
}

impl Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ReferralCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     SessionKey      ---------------------------------------------------------
/// An opaque visitor session identifier, generated at first click.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct SessionKey(pub String);

impl<S: Into<String>> From<S> for SessionKey {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       OrderId       ---------------------------------------------------------
/// An external order identifier, assigned by the storefront. Conversions are deduplicated on it.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    PartnerStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PartnerStatus {
    /// The partner may receive attribution and earn commissions.
    Active,
    /// The partner has been deactivated (voluntarily or administratively). No new attribution.
    Inactive,
    /// The partner has been suspended pending review. No new attribution.
    Suspended,
}

impl Display for PartnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartnerStatus::Active => write!(f, "Active"),
            PartnerStatus::Inactive => write!(f, "Inactive"),
            PartnerStatus::Suspended => write!(f, "Suspended"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for PartnerStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Inactive" => Ok(Self::Inactive),
            "Suspended" => Ok(Self::Suspended),
            s => Err(StatusConversionError(format!("Invalid partner status: {s}"))),
        }
    }
}

//--------------------------------------       Partner       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub referral_code: ReferralCode,
    pub display_name: String,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub status: PartnerStatus,
    pub commission_rate: CommissionRate,
    pub total_earnings: Money,
    pub pending_earnings: Money,
    pub paid_earnings: Money,
    pub total_clicks: i64,
    pub total_conversions: i64,
    pub last_click_at: Option<DateTime<Utc>>,
    pub last_conversion_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partner {
    pub fn is_active(&self) -> bool {
        self.status == PartnerStatus::Active
    }

    /// `total = pending + paid` must hold at every observable point in time.
    pub fn earnings_balance(&self) -> bool {
        self.total_earnings == self.pending_earnings + self.paid_earnings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPartner {
    pub display_name: String,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub commission_rate: CommissionRate,
}

impl NewPartner {
    pub fn new<S: Into<String>>(display_name: S, commission_rate: CommissionRate) -> Self {
        Self { display_name: display_name.into(), contact_email: None, website_url: None, commission_rate }
    }
}

//--------------------------------------      Metadata       ---------------------------------------------------------
/// Enrichment attached to clicks and conversions: the fields we know how to derive, plus an open
/// string-keyed map for anything upstream wants to stash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

//--------------------------------------        Click        ---------------------------------------------------------
/// One click per (partner, session) pair. Immutable after insert except the converted flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Click {
    pub id: i64,
    pub partner_id: i64,
    pub session_key: SessionKey,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_url: String,
    pub metadata: Json<Metadata>,
    pub converted: bool,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClick {
    pub session_key: SessionKey,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_url: String,
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub metadata: Metadata,
}

impl NewClick {
    pub fn new<K, I, L>(session_key: K, ip_address: I, landing_url: L) -> Self
    where
        K: Into<SessionKey>,
        I: Into<String>,
        L: Into<String>,
    {
        Self {
            session_key: session_key.into(),
            ip_address: ip_address.into(),
            user_agent: None,
            referrer_url: None,
            landing_url: landing_url.into(),
            source: None,
            medium: None,
            campaign: None,
            metadata: Metadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }
}

//--------------------------------------   ConversionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ConversionType {
    Sale,
    Signup,
    Subscription,
    Custom,
}

impl Display for ConversionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionType::Sale => write!(f, "Sale"),
            ConversionType::Signup => write!(f, "Signup"),
            ConversionType::Subscription => write!(f, "Subscription"),
            ConversionType::Custom => write!(f, "Custom"),
        }
    }
}

impl FromStr for ConversionType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sale" => Ok(Self::Sale),
            "Signup" => Ok(Self::Signup),
            "Subscription" => Ok(Self::Subscription),
            "Custom" => Ok(Self::Custom),
            s => Err(StatusConversionError(format!("Invalid conversion type: {s}"))),
        }
    }
}

//--------------------------------------  CommissionStatus   ---------------------------------------------------------
/// The lifecycle shared by conversions and their commissions.
///
/// Legal transitions are `Pending -> Approved -> Paid` and `Pending -> Rejected`; nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CommissionStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionStatus::Pending => write!(f, "Pending"),
            CommissionStatus::Approved => write!(f, "Approved"),
            CommissionStatus::Rejected => write!(f, "Rejected"),
            CommissionStatus::Paid => write!(f, "Paid"),
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Paid" => Ok(Self::Paid),
            s => Err(StatusConversionError(format!("Invalid commission status: {s}"))),
        }
    }
}

//--------------------------------------     Conversion      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversion {
    pub id: i64,
    pub partner_id: i64,
    pub session_key: SessionKey,
    pub customer_id: Option<String>,
    pub order_id: Option<OrderId>,
    pub conversion_type: ConversionType,
    pub order_amount: Money,
    pub commission_amount: Money,
    /// The partner's rate at conversion time. Never re-read from the partner record.
    pub commission_rate: CommissionRate,
    pub status: CommissionStatus,
    pub metadata: Json<Metadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversion {
    pub session_key: SessionKey,
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub conversion_type: ConversionType,
    pub order_amount: Money,
    pub metadata: Metadata,
}

impl NewConversion {
    pub fn new<K: Into<SessionKey>>(session_key: K, order_amount: Money, conversion_type: ConversionType) -> Self {
        Self {
            session_key: session_key.into(),
            order_id: None,
            customer_id: None,
            conversion_type,
            order_amount,
            metadata: Metadata::default(),
        }
    }

    pub fn with_order_id<O: Into<OrderId>>(mut self, order_id: O) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_customer_id<C: Into<String>>(mut self, customer_id: C) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }
}

//--------------------------------------     Commission      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Commission {
    pub id: i64,
    pub partner_id: i64,
    pub conversion_id: i64,
    pub order_id: Option<OrderId>,
    pub amount: Money,
    pub commission_rate: CommissionRate,
    pub status: CommissionStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub payout_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     PayoutStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "Pending"),
            PayoutStatus::Processing => write!(f, "Processing"),
            PayoutStatus::Completed => write!(f, "Completed"),
            PayoutStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            s => Err(StatusConversionError(format!("Invalid payout status: {s}"))),
        }
    }
}

//--------------------------------------       Payout        ---------------------------------------------------------
/// Aggregates one or more paid commissions for a partner over a period. Payment execution itself
/// is an external collaborator; this record only tracks the state transitions it reports back.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub partner_id: i64,
    pub amount: Money,
    pub commission_count: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: PayoutStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Actor        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ActorRole {
    Admin,
    Partner,
    System,
}

impl Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Admin => write!(f, "Admin"),
            ActorRole::Partner => write!(f, "Partner"),
            ActorRole::System => write!(f, "System"),
        }
    }
}

impl FromStr for ActorRole {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Self::Admin),
            "Partner" => Ok(Self::Partner),
            "System" => Ok(Self::System),
            s => Err(StatusConversionError(format!("Invalid actor role: {s}"))),
        }
    }
}

/// The authenticated principal responsible for a mutation. Supplied by the request layer; the
/// pipeline never authenticates anyone itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: ActorRole::Admin }
    }

    pub fn partner<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), role: ActorRole::Partner }
    }

    pub fn system() -> Self {
        Self { id: "system".to_string(), role: ActorRole::System }
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

//--------------------------------------   AuditLogEntry     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditEntityType {
    Commission,
    Payout,
    Partner,
}

impl Display for AuditEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEntityType::Commission => write!(f, "Commission"),
            AuditEntityType::Payout => write!(f, "Payout"),
            AuditEntityType::Partner => write!(f, "Partner"),
        }
    }
}

impl FromStr for AuditEntityType {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Commission" => Ok(Self::Commission),
            "Payout" => Ok(Self::Payout),
            "Partner" => Ok(Self::Partner),
            s => Err(StatusConversionError(format!("Invalid audit entity type: {s}"))),
        }
    }
}

/// Append-only change record. Never updated, never deleted by this pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub entity_type: AuditEntityType,
    pub entity_id: i64,
    pub action: String,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub previous_state: Option<Json<serde_json::Value>>,
    pub new_state: Option<Json<serde_json::Value>>,
    pub diff: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub entity_type: AuditEntityType,
    pub entity_id: i64,
    pub action: String,
    pub actor: Actor,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub diff: Option<serde_json::Value>,
}

impl NewAuditEntry {
    /// Builds an audit record from before/after snapshots, computing the field-level diff.
    pub fn change<T: Serialize>(
        entity_type: AuditEntityType,
        entity_id: i64,
        action: &str,
        actor: &Actor,
        before: Option<&T>,
        after: Option<&T>,
    ) -> Self {
        let previous_state = before.map(|b| serde_json::to_value(b).unwrap_or(serde_json::Value::Null));
        let new_state = after.map(|a| serde_json::to_value(a).unwrap_or(serde_json::Value::Null));
        let diff = match (&previous_state, &new_state) {
            (Some(p), Some(n)) => Some(crate::helpers::field_diff(p, n)),
            _ => None,
        };
        Self {
            entity_type,
            entity_id,
            action: action.to_string(),
            actor: actor.clone(),
            previous_state,
            new_state,
            diff,
        }
    }
}

//--------------------------------------    Notification     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum NotificationKind {
    Conversion,
    CommissionApproved,
    CommissionRejected,
    PayoutProcessed,
    Milestone,
    Alert,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Conversion => write!(f, "Conversion"),
            NotificationKind::CommissionApproved => write!(f, "CommissionApproved"),
            NotificationKind::CommissionRejected => write!(f, "CommissionRejected"),
            NotificationKind::PayoutProcessed => write!(f, "PayoutProcessed"),
            NotificationKind::Milestone => write!(f, "Milestone"),
            NotificationKind::Alert => write!(f, "Alert"),
        }
    }
}

impl FromStr for NotificationKind {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Conversion" => Ok(Self::Conversion),
            "CommissionApproved" => Ok(Self::CommissionApproved),
            "CommissionRejected" => Ok(Self::CommissionRejected),
            "PayoutProcessed" => Ok(Self::PayoutProcessed),
            "Milestone" => Ok(Self::Milestone),
            "Alert" => Ok(Self::Alert),
            s => Err(StatusConversionError(format!("Invalid notification kind: {s}"))),
        }
    }
}

/// A per-partner inbox record. Advisory only; never authoritative state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub partner_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub partner_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

impl NewNotification {
    pub fn new<T: Into<String>, B: Into<String>>(partner_id: i64, kind: NotificationKind, title: T, body: B) -> Self {
        Self { partner_id, kind, title: title.into(), body: body.into() }
    }
}

//--------------------------------------    Attribution      ---------------------------------------------------------
/// The session -> partner association recorded at first click. Cached for the lifetime of the
/// attribution window; reconstructible from the click row after a cache loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub partner_id: i64,
    pub referral_code: ReferralCode,
    pub clicked_at: DateTime<Utc>,
}

impl Attribution {
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.clicked_at
    }
}

//--------------------------------------   SessionStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Ended,
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "Active"),
            SessionStatus::Ended => write!(f, "Ended"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Ended" => Ok(Self::Ended),
            s => Err(StatusConversionError(format!("Invalid session status: {s}"))),
        }
    }
}

//--------------------------------------      PageView       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub url: String,
    pub at: DateTime<Utc>,
}

impl PageView {
    pub fn now<S: Into<String>>(url: S) -> Self {
        Self { url: url.into(), at: Utc::now() }
    }
}

//--------------------------------------       Session       ---------------------------------------------------------
/// The durable session row. While a session is active the authoritative copy lives in the cache
/// and this row is only refreshed every Nth tracked event, then unconditionally on end.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub session_key: SessionKey,
    pub partner_id: i64,
    pub referral_code: ReferralCode,
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub page_views: Json<Vec<PageView>>,
    pub converted: bool,
    pub conversion_value: Option<Money>,
    pub status: SessionStatus,
    pub duration_secs: Option<i64>,
    pub bounce: bool,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     LiveSession     ---------------------------------------------------------
/// The in-cache working copy of an active session. Converts to a durable row on reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSession {
    pub session_key: SessionKey,
    pub partner_id: i64,
    pub referral_code: ReferralCode,
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub country: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub page_views: Vec<PageView>,
    pub converted: bool,
    pub conversion_value: Option<Money>,
    /// Tracked events since the durable copy was last refreshed.
    pub events_since_reconcile: u32,
}

impl LiveSession {
    /// Seeds a live session from the click that started it.
    pub fn from_click(partner: &Partner, click: &NewClick) -> Self {
        let now = Utc::now();
        let landing = PageView { url: click.landing_url.clone(), at: now };
        Self {
            session_key: click.session_key.clone(),
            partner_id: partner.id,
            referral_code: partner.referral_code.clone(),
            source: click.source.clone(),
            medium: click.medium.clone(),
            campaign: click.campaign.clone(),
            device: click.metadata.device.clone(),
            browser: click.metadata.browser.clone(),
            country: click.metadata.country.clone(),
            started_at: now,
            last_activity_at: now,
            page_views: vec![landing],
            converted: false,
            conversion_value: None,
            events_since_reconcile: 0,
        }
    }

    /// Rebuilds the working copy from a durable row after a cache miss.
    pub fn from_row(session: &Session) -> Self {
        Self {
            session_key: session.session_key.clone(),
            partner_id: session.partner_id,
            referral_code: session.referral_code.clone(),
            source: session.source.clone(),
            medium: session.medium.clone(),
            campaign: session.campaign.clone(),
            device: session.device.clone(),
            browser: session.browser.clone(),
            country: session.country.clone(),
            started_at: session.started_at,
            last_activity_at: session.last_activity_at,
            page_views: session.page_views.0.clone(),
            converted: session.converted,
            conversion_value: session.conversion_value,
            events_since_reconcile: 0,
        }
    }

    pub fn record_page_view(&mut self, view: PageView) {
        self.last_activity_at = view.at;
        self.page_views.push(view);
        self.events_since_reconcile += 1;
    }

    pub fn mark_converted(&mut self, value: Money) {
        self.converted = true;
        self.conversion_value = Some(value);
    }

    pub fn duration_at(&self, ended_at: DateTime<Utc>) -> i64 {
        (ended_at - self.started_at).num_seconds().max(0)
    }

    /// A bounced session saw exactly one page.
    pub fn is_bounce(&self) -> bool {
        self.page_views.len() == 1
    }
}
