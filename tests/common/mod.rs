#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use pharmstock::{
    config::AppConfig,
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{facility, product, stock_lot},
    events::{event_channel, Event},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DbPool>,
    pub events: mpsc::Receiver<Event>,
}

/// Fresh in-memory database with migrations applied and the full
/// service graph wired over it. A single pooled connection keeps every
/// statement on the same SQLite memory database.
pub async fn setup() -> TestApp {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = Arc::new(
        establish_connection_with_config(&db_config)
            .await
            .expect("failed to open in-memory database"),
    );
    run_migrations(db.as_ref())
        .await
        .expect("failed to run migrations");

    let (event_sender, events) = event_channel(256);
    let config = AppConfig {
        database_url: db_config.url,
        max_connections: 1,
        min_connections: 1,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: false,
        report_queue_capacity: 64,
    };

    let state = AppState::new(db.clone(), config, Arc::new(event_sender));
    TestApp { state, db, events }
}

pub async fn seed_facility(db: &DbPool, code: &str) -> facility::Model {
    let now = Utc::now();
    facility::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Facility {}", code)),
        facility_type: Set("FACILITY".to_string()),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed facility")
}

pub async fn seed_product(db: &DbPool, code: &str) -> product::Model {
    seed_product_with_lead_time(db, code, None).await
}

pub async fn seed_product_with_lead_time(
    db: &DbPool,
    code: &str,
    lead_time_months: Option<i32>,
) -> product::Model {
    seed_product_full(db, code, true, lead_time_months).await
}

pub async fn seed_product_full(
    db: &DbPool,
    code: &str,
    active: bool,
    lead_time_months: Option<i32>,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Product {}", code)),
        unit_of_measure: Set("tablet".to_string()),
        lead_time_months: Set(lead_time_months),
        active: Set(active),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

/// Inserts a lot directly, bypassing the receipt path, for tests that
/// need a precise starting lot layout without ledger noise.
pub async fn seed_lot(
    db: &DbPool,
    facility_id: i64,
    product_id: i64,
    batch: &str,
    quantity: Decimal,
    expiry: Option<NaiveDate>,
) -> stock_lot::Model {
    let now = Utc::now();
    stock_lot::ActiveModel {
        facility_id: Set(facility_id),
        product_id: Set(product_id),
        batch_number: Set(batch.to_string()),
        expiry_date: Set(expiry),
        quantity: Set(quantity),
        unit_of_measure: Set("tablet".to_string()),
        barcode: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed lot")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}
