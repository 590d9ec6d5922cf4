use acl_common::Money;
use chrono::{DateTime, Duration, Utc};
use log::trace;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    api::SessionQueryFilter,
    db_types::{LiveSession, Session, SessionKey},
    traits::LedgerError,
};

/// Refreshes the durable copy of a session from the live working copy, creating the row on first
/// write. The cache holds the authoritative copy while the session is active; this row trails it
/// by up to one reconcile interval.
pub async fn upsert(live: &LiveSession, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
            INSERT INTO sessions (
                session_key,
                partner_id,
                referral_code,
                source,
                medium,
                campaign,
                device,
                browser,
                country,
                started_at,
                last_activity_at,
                page_views,
                converted,
                conversion_value,
                status,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'Active', CURRENT_TIMESTAMP)
            ON CONFLICT (session_key) DO UPDATE SET
                last_activity_at = excluded.last_activity_at,
                page_views = excluded.page_views,
                converted = excluded.converted,
                conversion_value = excluded.conversion_value,
                updated_at = CURRENT_TIMESTAMP
            WHERE status = 'Active'
        "#,
    )
    .bind(&live.session_key)
    .bind(live.partner_id)
    .bind(&live.referral_code)
    .bind(&live.source)
    .bind(&live.medium)
    .bind(&live.campaign)
    .bind(&live.device)
    .bind(&live.browser)
    .bind(&live.country)
    .bind(live.started_at)
    .bind(live.last_activity_at)
    .bind(Json(&live.page_views))
    .bind(live.converted)
    .bind(live.conversion_value)
    .execute(conn)
    .await?;
    Ok(())
}

/// Final reconcile: flushes the live copy and marks the session Ended with its computed duration
/// and bounce flag. Ending an already-Ended session changes nothing and returns the stored row.
pub async fn finalize(
    live: &LiveSession,
    ended_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Session, LedgerError> {
    upsert(live, &mut *conn).await?;
    sqlx::query(
        r#"UPDATE sessions SET
       status = 'Ended',
       duration_secs = $1,
       bounce = $2,
       updated_at = CURRENT_TIMESTAMP
       WHERE session_key = $3 AND status = 'Active'
       "#,
    )
    .bind(live.duration_at(ended_at))
    .bind(live.is_bounce())
    .bind(&live.session_key)
    .execute(&mut *conn)
    .await?;
    fetch_by_key(&live.session_key, conn)
        .await?
        .ok_or_else(|| LedgerError::SessionNotFound(live.session_key.clone()))
}

/// Marks the durable session converted, if the row exists yet. Part of the conversion
/// transaction; the cached copy is updated separately by the session manager.
pub(crate) async fn mark_converted(
    key: &SessionKey,
    value: Money,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"UPDATE sessions SET
       converted = 1,
       conversion_value = $1,
       updated_at = CURRENT_TIMESTAMP
       WHERE session_key = $2"#,
    )
    .bind(value)
    .bind(key)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_by_key(key: &SessionKey, conn: &mut SqliteConnection) -> Result<Option<Session>, sqlx::Error> {
    let session =
        sqlx::query_as("SELECT * FROM sessions WHERE session_key = $1").bind(key).fetch_optional(conn).await?;
    Ok(session)
}

/// Forces Ended on every Active session whose last activity is older than `inactive_for`,
/// computing final duration and bounce in the same statement. Covers sessions whose cache entry
/// was lost (process restart) as well as ordinary idle expiry.
pub async fn end_stale(inactive_for: Duration, conn: &mut SqliteConnection) -> Result<Vec<Session>, LedgerError> {
    let rows = sqlx::query_as(
        format!(
            r#"UPDATE sessions SET
           status = 'Ended',
           duration_secs = MAX(unixepoch(last_activity_at) - unixepoch(started_at), 0),
           bounce = (json_array_length(page_views) <= 1),
           updated_at = CURRENT_TIMESTAMP
           WHERE status = 'Active'
             AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(last_activity_at)) > {}
           RETURNING *;"#,
            inactive_for.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Fetches sessions according to criteria in the `SessionQueryFilter`, ordered by start time.
pub async fn search_sessions(
    query: SessionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Session>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM sessions ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(partner_id) = query.partner_id {
        where_clause.push("partner_id = ");
        where_clause.push_bind_unseparated(partner_id);
    }
    if let Some(status) = query.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(converted) = query.converted {
        where_clause.push("converted = ");
        where_clause.push_bind_unseparated(converted);
    }
    if let Some(since) = query.since {
        where_clause.push("started_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("started_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY started_at ASC");
    trace!("⏱️ Executing query: {}", builder.sql());
    let sessions = builder.build_query_as::<Session>().fetch_all(conn).await?;
    Ok(sessions)
}
