//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions for the ledger.
//!
//! All interactions are maintained as simple functions (rather than stateful structs) that accept
//! a `&mut SqliteConnection` argument. Callers obtain a connection from a pool, or create an
//! atomic transaction as the need arises, and call through without any other changes.
use std::env;

use std::{str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod audit;
pub mod clicks;
pub mod commissions;
pub mod conversions;
pub mod notifications;
pub mod partners;
pub mod payouts;
pub mod sessions;

const SQLITE_DB_URL: &str = "sqlite://data/acl_store.db";

pub fn db_url() -> String {
    let result = env::var("ACL_DATABASE_URL").unwrap_or_else(|_| {
        info!("ACL_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

// SQLite allows only a single writer at a time. A multi-connection pool makes concurrent
// transactions race on the WAL snapshot (SQLITE_BUSY_SNAPSHOT, which the busy timeout does not
// retry), so the pool is capped at one connection and writes are serialized through it. The
// requested `max_connections` is retained in the signature for the backend contract but is not a
// safe knob for SQLite.
pub async fn new_pool(url: &str, _max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    Ok(pool)
}

/// The store rejecting a duplicate insert is how idempotent write paths detect a concurrent
/// winner; callers re-fetch and return the existing row.
pub(crate) fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation)
}
