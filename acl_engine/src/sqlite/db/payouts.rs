use acl_common::Money;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Payout, PayoutStatus},
    traits::LedgerError,
};

pub(crate) async fn insert_payout(
    partner_id: i64,
    amount: Money,
    commission_count: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            INSERT INTO payouts (
                partner_id,
                amount,
                commission_count,
                period_start,
                period_end,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(partner_id)
    .bind(amount)
    .bind(commission_count)
    .bind(period_start)
    .bind(period_end)
    .bind(PayoutStatus::Pending.to_string())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("💸️ Payout of {amount} created for partner #{partner_id}");
    Ok(payout)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payout)
}

/// Drives a payout one step along `Pending -> Processing -> Completed | Failed`. The legal
/// predecessor is part of the UPDATE's WHERE clause; an illegal transition touches no rows.
pub(crate) async fn transition(
    id: i64,
    to: PayoutStatus,
    actor_id: &str,
    transaction_id: Option<&str>,
    failure_reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, LedgerError> {
    let from = match to {
        PayoutStatus::Processing => PayoutStatus::Pending,
        PayoutStatus::Completed | PayoutStatus::Failed => PayoutStatus::Processing,
        PayoutStatus::Pending => {
            return Err(LedgerError::ValidationError("A payout cannot be reset to Pending".to_string()))
        },
    };
    let payout = sqlx::query_as(
        r#"UPDATE payouts SET
       status = $1,
       transaction_id = COALESCE($2, transaction_id),
       failure_reason = $3,
       processed_by = $4,
       processed_at = $5,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $6 AND status = $7
       RETURNING *"#,
    )
    .bind(to.to_string())
    .bind(transaction_id)
    .bind(failure_reason)
    .bind(actor_id)
    .bind(Utc::now())
    .bind(id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}
