use chrono::Utc;
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{AuditEntityType, AuditLogEntry, NewAuditEntry};

/// Appends a change record. The table is append-only: nothing in this pipeline ever updates or
/// deletes a row (retention pruning is an external policy).
pub async fn insert_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<AuditLogEntry, sqlx::Error> {
    let saved: AuditLogEntry = sqlx::query_as(
        r#"
            INSERT INTO audit_log (
                entity_type,
                entity_id,
                action,
                actor_id,
                actor_role,
                previous_state,
                new_state,
                diff,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(entry.entity_type.to_string())
    .bind(entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.actor.id)
    .bind(entry.actor.role.to_string())
    .bind(entry.previous_state.map(Json))
    .bind(entry.new_state.map(Json))
    .bind(entry.diff.map(Json))
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    trace!("🧾️ Audit entry {} recorded: {} {} #{}", saved.id, saved.action, saved.entity_type, saved.entity_id);
    Ok(saved)
}

/// The trail for one entity, oldest first.
pub async fn fetch_trail(
    entity_type: AuditEntityType,
    entity_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    let entries = sqlx::query_as(
        "SELECT * FROM audit_log WHERE entity_type = $1 AND entity_id = $2 ORDER BY created_at ASC, id ASC",
    )
    .bind(entity_type.to_string())
    .bind(entity_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}
