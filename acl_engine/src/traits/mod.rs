//! # Ledger backend contracts.
//!
//! This module defines the interface contracts that storage *backends* must implement in order to
//! carry the attribution and commission ledger pipeline.
//!
//! ## The write side
//! [`LedgerDatabase`] is responsible for every mutation: recording clicks and conversions
//! (idempotently, under the store's uniqueness constraints), driving the commission and payout
//! state machines, adjusting partner earnings buckets with atomic relative updates, reconciling
//! sessions, and appending audit and notification records.
//!
//! ## The read side
//! [`PartnerManagement`] provides the query surface over the resulting state: partners, clicks,
//! conversions, commissions, sessions, payouts, notification inboxes and audit trails.
mod data_objects;
mod ledger_database;
mod partner_management;

pub use data_objects::{BatchAction, BatchItemError, BatchItemResult, BatchOutcome, ClickResult, ConversionResult};
pub use ledger_database::{LedgerDatabase, LedgerError};
pub use partner_management::{PartnerManagement, PartnerQueryError};
