use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{NewNotification, Notification};

pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, sqlx::Error> {
    let saved = sqlx::query_as(
        r#"
            INSERT INTO notifications (partner_id, kind, title, body, is_read, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            RETURNING *;
        "#,
    )
    .bind(notification.partner_id)
    .bind(notification.kind.to_string())
    .bind(notification.title)
    .bind(notification.body)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(saved)
}

/// A partner's inbox, newest first.
pub async fn fetch_for_partner(
    partner_id: i64,
    unread_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let sql = if unread_only {
        "SELECT * FROM notifications WHERE partner_id = $1 AND is_read = 0 ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT * FROM notifications WHERE partner_id = $1 ORDER BY created_at DESC, id DESC"
    };
    let notifications = sqlx::query_as(sql).bind(partner_id).fetch_all(conn).await?;
    Ok(notifications)
}

pub async fn mark_read(notification_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = $1")
        .bind(notification_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
