//! The public API surfaces of the pipeline, one per concern, all generic over the ledger
//! backend `B`:
//!
//! * [`AttributionApi`] — referral resolution, click recording, attribution lookup (§ traffic in)
//! * [`CommissionApi`] — conversions, the commission state machine, batches, payouts (§ money)
//! * [`SessionApi`] — session lifecycle, expiry sweep, funnel metrics
//! * [`PartnerApi`] — partner roster, stats, inbox and audit queries
mod attribution_api;
mod commission_api;
mod errors;
mod partner_api;
mod partner_objects;
mod session_api;
mod session_objects;

pub use attribution_api::AttributionApi;
pub use commission_api::CommissionApi;
pub use errors::{AttributionApiError, CommissionApiError, PartnerApiError, SessionApiError};
pub use partner_api::PartnerApi;
pub use partner_objects::{ClickQueryFilter, CommissionQueryFilter, PartnerStats};
pub use session_api::SessionApi;
pub use session_objects::{LandingPageCount, SessionMetrics, SessionQueryFilter};
