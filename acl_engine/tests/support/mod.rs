#![allow(dead_code)]

pub mod prepare_env;

use std::{str::FromStr, sync::Arc};

use acl_common::{CommissionRate, Money};
use acl_engine::{
    cache::AttributionCache,
    db_types::{ConversionType, NewClick, NewConversion, NewPartner, Partner, ReferralCode},
    events::EventProducers,
    traits::{ClickResult, ConversionResult, LedgerDatabase},
    AttributionApi,
    CommissionApi,
    PartnerApi,
    PipelineConfig,
    SessionApi,
    SqliteDatabase,
};
use log::error;
use sqlx::{migrate::MigrateDatabase, Sqlite};

/// A fully wired pipeline over a throwaway SQLite database.
pub struct Pipeline {
    pub url: String,
    pub db: SqliteDatabase,
    pub cache: Arc<AttributionCache>,
    pub config: PipelineConfig,
    pub attribution: AttributionApi<SqliteDatabase>,
    pub commissions: CommissionApi<SqliteDatabase>,
    pub sessions: SessionApi<SqliteDatabase>,
    pub partners: PartnerApi<SqliteDatabase>,
}

pub async fn pipeline() -> Pipeline {
    pipeline_with(PipelineConfig::default(), EventProducers::default()).await
}

pub async fn pipeline_with(config: PipelineConfig, producers: EventProducers) -> Pipeline {
    let url = prepare_env::random_db_path();
    prepare_env::prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let cache = Arc::new(AttributionCache::new(&config));
    Pipeline {
        url: url.clone(),
        attribution: AttributionApi::new(db.clone(), Arc::clone(&cache), producers.clone(), config.clone()),
        commissions: CommissionApi::new(db.clone(), Arc::clone(&cache), producers.clone(), config.clone()),
        sessions: SessionApi::new(db.clone(), Arc::clone(&cache), producers.clone(), config.clone()),
        partners: PartnerApi::new(db.clone(), Arc::clone(&cache)),
        db,
        cache,
        config,
    }
}

pub async fn tear_down(mut pipeline: Pipeline) {
    if let Err(e) = pipeline.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&pipeline.url).await {
        error!("🚀️ Failed to drop database: {e}");
    }
}

pub async fn seed_partner(pipeline: &Pipeline, code: &str, rate_percent: i64) -> Partner {
    let code = ReferralCode::from_str(code).expect("invalid referral code in test");
    let partner = NewPartner::new("Acme Media", CommissionRate::percent(rate_percent).unwrap());
    pipeline.partners.create_partner_with_code(partner, code).await.expect("Error creating partner")
}

pub async fn record_click(pipeline: &Pipeline, code: &ReferralCode, session: &str) -> ClickResult {
    let click = NewClick::new(session, "203.0.113.7", "https://example.com/landing");
    pipeline.attribution.record_click(code, click).await.expect("Error recording click")
}

pub async fn record_sale(pipeline: &Pipeline, session: &str, order: &str, amount: &str) -> ConversionResult {
    let conversion = NewConversion::new(session, money(amount), ConversionType::Sale).with_order_id(order.to_string());
    pipeline.commissions.record_conversion(conversion).await.expect("Error recording conversion")
}

pub fn money(s: &str) -> Money {
    Money::from_str(s).expect("invalid amount in test")
}

pub async fn fetch_partner(pipeline: &Pipeline, partner_id: i64) -> Partner {
    pipeline.partners.partner(partner_id).await.unwrap().expect("partner should exist")
}
