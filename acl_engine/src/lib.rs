//! Attribution & Commission Ledger Engine
//!
//! This library attributes web traffic and purchases to referring partners, computes the
//! commission owed, carries that commission through an approval/payout lifecycle, and notifies
//! interested parties as events occur. It is storage-agnostic at its seams.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@traits`], [`SqliteDatabase`]). SQLite is the
//!    supported backend. You should never need to touch the database directly; use the public
//!    APIs instead. The exception is the data types, defined in [`mod@db_types`], which are
//!    public.
//! 2. The public APIs ([`mod@api`]): attribution, conversions and the commission state machine,
//!    session lifecycle, and partner management. Backends implement the traits in
//!    [`mod@traits`] to carry these APIs.
//! 3. Events ([`mod@events`]): every state change is published through bounded channels to the
//!    event hub, which fans out to per-partner, admin and analytics topics, and parks a nudge
//!    for partners with no live connection.
//!
//! The attribution cache ([`mod@cache`]) sits in front of the ledger on the hot path. It is an
//! optimisation with defined expiry semantics (the 30-day attribution window, the 30-minute
//! session timeout), never a correctness dependency: everything in it can be rebuilt from the
//! ledger.
pub mod api;
pub mod cache;
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{AttributionApi, CommissionApi, PartnerApi, SessionApi};
pub use config::PipelineConfig;
pub use traits::{LedgerDatabase, LedgerError, PartnerManagement};
