use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::CommissionQueryFilter,
    db_types::{Commission, CommissionStatus, Conversion},
    traits::LedgerError,
};

/// Creates the commission derived 1:1 from a conversion. The unique index on `conversion_id`
/// makes a second derivation impossible.
pub(crate) async fn insert_commission(
    conversion: &Conversion,
    conn: &mut SqliteConnection,
) -> Result<Commission, sqlx::Error> {
    let commission = sqlx::query_as(
        r#"
            INSERT INTO commissions (
                partner_id,
                conversion_id,
                order_id,
                amount,
                commission_rate,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(conversion.partner_id)
    .bind(conversion.id)
    .bind(&conversion.order_id)
    .bind(conversion.commission_amount)
    .bind(conversion.commission_rate)
    .bind(CommissionStatus::Pending.to_string())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(commission)
}

pub async fn fetch_commission(id: i64, conn: &mut SqliteConnection) -> Result<Option<Commission>, sqlx::Error> {
    let commission =
        sqlx::query_as("SELECT * FROM commissions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(commission)
}

pub async fn fetch_for_conversion(
    conversion_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    let commission = sqlx::query_as("SELECT * FROM commissions WHERE conversion_id = $1")
        .bind(conversion_id)
        .fetch_optional(conn)
        .await?;
    Ok(commission)
}

pub async fn fetch_by_ids(ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<Commission>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM commissions WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    builder.push(")");
    let commissions = builder.build_query_as::<Commission>().fetch_all(conn).await?;
    Ok(commissions)
}

/// Transitions `Pending -> Approved`, stamping the approver. The status precondition is part of
/// the UPDATE itself, so one of two racing approvals loses and gets `None` back.
pub(crate) async fn approve(
    id: i64,
    actor_id: &str,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    let commission = sqlx::query_as(
        r#"UPDATE commissions SET
       status = 'Approved',
       approved_by = $1,
       approved_at = $2,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $3 AND status = 'Pending'
       RETURNING *"#,
    )
    .bind(actor_id)
    .bind(at)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(commission)
}

/// Transitions `Pending -> Rejected` (terminal), storing the reason.
pub(crate) async fn reject(
    id: i64,
    actor_id: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    let commission = sqlx::query_as(
        r#"UPDATE commissions SET
       status = 'Rejected',
       approved_by = $1,
       rejection_reason = $2,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $3 AND status = 'Pending'
       RETURNING *"#,
    )
    .bind(actor_id)
    .bind(reason)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(commission)
}

/// Transitions `Approved -> Paid`, stamping the payment reference and time.
pub(crate) async fn pay(
    id: i64,
    payment_reference: &str,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    let commission = sqlx::query_as(
        r#"UPDATE commissions SET
       status = 'Paid',
       payment_reference = $1,
       paid_at = $2,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $3 AND status = 'Approved'
       RETURNING *"#,
    )
    .bind(payment_reference)
    .bind(at)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(commission)
}

/// Paid commissions in the period that have not yet been swept into a payout.
pub(crate) async fn payable_for_period(
    partner_id: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, sqlx::Error> {
    let commissions = sqlx::query_as(
        r#"SELECT * FROM commissions
       WHERE partner_id = $1 AND status = 'Paid' AND payout_id IS NULL
         AND paid_at >= $2 AND paid_at <= $3
       ORDER BY paid_at ASC"#,
    )
    .bind(partner_id)
    .bind(period_start)
    .bind(period_end)
    .fetch_all(conn)
    .await?;
    Ok(commissions)
}

pub(crate) async fn assign_payout(
    commission_ids: &[i64],
    payout_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    if commission_ids.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::new("UPDATE commissions SET payout_id = ");
    builder.push_bind(payout_id);
    builder.push(", updated_at = CURRENT_TIMESTAMP WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in commission_ids {
        separated.push_bind(id);
    }
    builder.push(")");
    builder.build().execute(conn).await?;
    Ok(())
}

/// Fetches commissions according to criteria in the `CommissionQueryFilter`, oldest first.
pub async fn search_commissions(
    query: CommissionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM commissions ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(partner_id) = query.partner_id {
        where_clause.push("partner_id = ");
        where_clause.push_bind_unseparated(partner_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(payout_id) = query.payout_id {
        where_clause.push("payout_id = ");
        where_clause.push_bind_unseparated(payout_id);
    }
    if let Some(min) = query.min_amount {
        where_clause.push("amount >= ");
        where_clause.push_bind_unseparated(min);
    }
    if let Some(max) = query.max_amount {
        where_clause.push("amount <= ");
        where_clause.push_bind_unseparated(max);
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
    trace!("💸️ Executing query: {}", builder.sql());
    let commissions = builder.build_query_as::<Commission>().fetch_all(conn).await?;
    Ok(commissions)
}
