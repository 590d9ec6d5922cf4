use acl_common::{CommissionRate, Money};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPartner, Partner, PartnerStatus, ReferralCode},
    sqlite::db::is_unique_violation,
    traits::LedgerError,
};

pub async fn insert_partner(
    partner: NewPartner,
    code: ReferralCode,
    conn: &mut SqliteConnection,
) -> Result<Partner, LedgerError> {
    let now = Utc::now();
    let result = sqlx::query_as::<_, Partner>(
        r#"
            INSERT INTO partners (
                referral_code,
                display_name,
                contact_email,
                website_url,
                status,
                commission_rate,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(&code)
    .bind(partner.display_name)
    .bind(partner.contact_email)
    .bind(partner.website_url)
    .bind(PartnerStatus::Active.to_string())
    .bind(partner.commission_rate)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(partner) => {
            debug!("🧑️ Partner [{code}] created with id {}", partner.id);
            Ok(partner)
        },
        Err(e) if is_unique_violation(&e) => Err(LedgerError::ReferralCodeTaken(code)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_partner(partner_id: i64, conn: &mut SqliteConnection) -> Result<Option<Partner>, sqlx::Error> {
    let partner =
        sqlx::query_as("SELECT * FROM partners WHERE id = $1").bind(partner_id).fetch_optional(conn).await?;
    Ok(partner)
}

pub async fn fetch_partner_by_code(
    code: &ReferralCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Partner>, sqlx::Error> {
    trace!("🧑️ Fetching partner for referral code [{code}]");
    let partner = sqlx::query_as("SELECT * FROM partners WHERE referral_code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(partner)
}

/// Moves the earnings buckets by the given deltas as a single atomic relative update.
/// This is the only way earnings are ever mutated; the invariant `total = pending + paid` holds
/// exactly when `total_delta == pending_delta + paid_delta` for every call site.
pub async fn adjust_earnings(
    partner_id: i64,
    total_delta: Money,
    pending_delta: Money,
    paid_delta: Money,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let d_total = total_delta.value();
    let d_pending = pending_delta.value();
    let d_paid = paid_delta.value();
    let result = sqlx::query(
        r#"UPDATE partners SET
       total_earnings = total_earnings + $1,
       pending_earnings = pending_earnings + $2,
       paid_earnings = paid_earnings + $3,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $4
       "#,
    )
    .bind(d_total)
    .bind(d_pending)
    .bind(d_paid)
    .bind(partner_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::PartnerNotFound(partner_id));
    }
    trace!("🧑️ Adjusted earnings for partner #{partner_id}: total {d_total}, pending {d_pending}, paid {d_paid}");
    Ok(())
}

pub async fn record_click_stats(
    partner_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"UPDATE partners SET
       total_clicks = total_clicks + 1,
       last_click_at = $1,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $2
       "#,
    )
    .bind(at)
    .bind(partner_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::PartnerNotFound(partner_id));
    }
    Ok(())
}

pub async fn record_conversion_stats(
    partner_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"UPDATE partners SET
       total_conversions = total_conversions + 1,
       last_conversion_at = $1,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $2
       "#,
    )
    .bind(at)
    .bind(partner_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::PartnerNotFound(partner_id));
    }
    Ok(())
}

pub(crate) async fn update_status(
    partner_id: i64,
    status: PartnerStatus,
    conn: &mut SqliteConnection,
) -> Result<Partner, LedgerError> {
    let result: Option<Partner> =
        sqlx::query_as("UPDATE partners SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status.to_string())
            .bind(partner_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(LedgerError::PartnerNotFound(partner_id))
}

pub(crate) async fn update_rate(
    partner_id: i64,
    rate: CommissionRate,
    conn: &mut SqliteConnection,
) -> Result<Partner, LedgerError> {
    let result: Option<Partner> = sqlx::query_as(
        "UPDATE partners SET commission_rate = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(rate)
    .bind(partner_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(LedgerError::PartnerNotFound(partner_id))
}
