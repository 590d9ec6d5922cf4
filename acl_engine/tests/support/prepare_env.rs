use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use acl_engine::SqliteDatabase;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/acl_test_store_{}.db", dir.display(), rand::random::<u64>())
}

async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

async fn create_database(path: &str) {
    if let Err(e) = Sqlite::drop_database(path).await {
        warn!("Error dropping database {path}: {e:?}");
    }
    Sqlite::create_database(path).await.expect("Error creating database");
    info!("Created Sqlite database {path}");
}
