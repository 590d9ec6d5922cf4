use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    api::ClickQueryFilter,
    db_types::{Click, NewClick, SessionKey},
    sqlite::db::is_unique_violation,
    traits::LedgerError,
};

/// Inserts the click, returning `false` in the second element if a click already exists for the
/// session key. A concurrent duplicate insert is rejected by the unique index and treated the
/// same way.
pub async fn idempotent_insert(
    partner_id: i64,
    click: NewClick,
    conn: &mut SqliteConnection,
) -> Result<(Click, bool), LedgerError> {
    if let Some(existing) = fetch_by_session_key(&click.session_key, &mut *conn).await? {
        return Ok((existing, false));
    }
    match insert_click(partner_id, click.clone(), &mut *conn).await {
        Ok(click) => {
            debug!("🖱️ Click for session [{}] inserted with id {}", click.session_key, click.id);
            Ok((click, true))
        },
        Err(e) if is_unique_violation(&e) => {
            trace!("🖱️ Lost insert race for session [{}]; returning the winner", click.session_key);
            let existing = fetch_by_session_key(&click.session_key, conn)
                .await?
                .ok_or_else(|| LedgerError::SessionNotFound(click.session_key.clone()))?;
            Ok((existing, false))
        },
        Err(e) => Err(e.into()),
    }
}

async fn insert_click(partner_id: i64, click: NewClick, conn: &mut SqliteConnection) -> Result<Click, sqlx::Error> {
    let click = sqlx::query_as(
        r#"
            INSERT INTO clicks (
                partner_id,
                session_key,
                ip_address,
                user_agent,
                referrer_url,
                landing_url,
                metadata,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(partner_id)
    .bind(click.session_key)
    .bind(click.ip_address)
    .bind(click.user_agent)
    .bind(click.referrer_url)
    .bind(click.landing_url)
    .bind(Json(click.metadata))
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(click)
}

pub async fn fetch_by_session_key(
    key: &SessionKey,
    conn: &mut SqliteConnection,
) -> Result<Option<Click>, sqlx::Error> {
    let click =
        sqlx::query_as("SELECT * FROM clicks WHERE session_key = $1").bind(key).fetch_optional(conn).await?;
    Ok(click)
}

/// Flips the converted flag on the click that started the session. The click is otherwise
/// immutable after insert.
pub async fn mark_converted(
    key: &SessionKey,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE clicks SET converted = 1, converted_at = $1 WHERE session_key = $2 AND converted = 0")
        .bind(at)
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}

/// Fetches clicks according to criteria in the `ClickQueryFilter`, ordered by `created_at`.
pub async fn search_clicks(query: ClickQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Click>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM clicks ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(partner_id) = query.partner_id {
        where_clause.push("partner_id = ");
        where_clause.push_bind_unseparated(partner_id);
    }
    if let Some(key) = query.session_key {
        where_clause.push("session_key = ");
        where_clause.push_bind_unseparated(key.0);
    }
    if let Some(converted) = query.converted {
        where_clause.push("converted = ");
        where_clause.push_bind_unseparated(converted);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("🖱️ Executing query: {}", builder.sql());
    let clicks = builder.build_query_as::<Click>().fetch_all(conn).await?;
    Ok(clicks)
}
