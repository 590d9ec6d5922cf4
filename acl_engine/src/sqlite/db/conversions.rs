use acl_common::{CommissionRate, Money};
use chrono::Utc;
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{CommissionStatus, Conversion, NewConversion, OrderId},
    traits::LedgerError,
};

/// Inserts a conversion row with Pending status and the rate snapshot taken at conversion time.
/// Uniqueness on `order_id` is enforced by the store; callers catch the violation and re-fetch.
pub(crate) async fn insert_conversion(
    partner_id: i64,
    conversion: NewConversion,
    rate: CommissionRate,
    commission_amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Conversion, sqlx::Error> {
    let now = Utc::now();
    let conversion: Conversion = sqlx::query_as(
        r#"
            INSERT INTO conversions (
                partner_id,
                session_key,
                customer_id,
                order_id,
                conversion_type,
                order_amount,
                commission_amount,
                commission_rate,
                status,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *;
        "#,
    )
    .bind(partner_id)
    .bind(conversion.session_key)
    .bind(conversion.customer_id)
    .bind(conversion.order_id)
    .bind(conversion.conversion_type.to_string())
    .bind(conversion.order_amount)
    .bind(commission_amount)
    .bind(rate)
    .bind(CommissionStatus::Pending.to_string())
    .bind(Json(conversion.metadata))
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🛒️ Conversion inserted with id {}", conversion.id);
    Ok(conversion)
}

pub async fn fetch_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Conversion>, sqlx::Error> {
    let conversion = sqlx::query_as("SELECT * FROM conversions WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(conversion)
}

/// Mirrors the commission's lifecycle onto its conversion row so conversion queries never report
/// a stale status. The commission row stays authoritative.
pub(crate) async fn mirror_status(
    conversion_id: i64,
    status: CommissionStatus,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE conversions SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(status.to_string())
        .bind(conversion_id)
        .execute(conn)
        .await?;
    Ok(())
}
