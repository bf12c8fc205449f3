//! Pharmstock core library
//!
//! Stock ledger, lot allocation, and LMIS monthly reporting for
//! multi-facility pharmaceutical inventory management. The crate owns
//! the batch-level stock truth (lots), the append-only movement ledger,
//! the transactional operations that move stock (dispensing, transfers,
//! order receipts), monthly report aggregation, and the screened AMC
//! calculator. Authentication, HTTP routing, and export formatting are
//! outer-layer concerns wired on top of these services.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod message_queue;
pub mod migrator;
pub mod services;

use crate::message_queue::{InMemoryMessageQueue, MessageQueue};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Wired-up service graph over one database pool.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub dispensing: services::dispensing::DispenseService,
    pub transfers: services::transfers::TransferService,
    pub orders: services::orders::OrderReceiptService,
    pub reporting: services::reporting::MonthlyReportService,
    pub consumption: services::consumption::AmcService,
}

impl AppState {
    /// Builds the service graph with an in-memory report queue sized
    /// from the configuration.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let queue: Arc<dyn MessageQueue> = Arc::new(InMemoryMessageQueue::with_max_size(
            config.report_queue_capacity,
        ));
        Self::with_queue(db, config, event_sender, queue)
    }

    /// Builds the service graph over a caller-provided queue backend.
    pub fn with_queue(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            dispensing: services::dispensing::DispenseService::new(
                db.clone(),
                event_sender.clone(),
            ),
            transfers: services::transfers::TransferService::new(db.clone(), event_sender.clone()),
            orders: services::orders::OrderReceiptService::new(db.clone(), event_sender.clone()),
            reporting: services::reporting::MonthlyReportService::new(
                db.clone(),
                event_sender.clone(),
                queue,
            ),
            consumption: services::consumption::AmcService::new(db.clone()),
            db,
            config,
            event_sender,
        }
    }
}
