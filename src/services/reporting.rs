//! Monthly LMIS report aggregation.
//!
//! A report covers one facility for one month: per product, the opening
//! balance (chained from the previous month's closing), received and
//! issued totals read from the movement ledger, operator adjustments,
//! and the derived closing balance. Generation is all-or-nothing and
//! guarded against accidental regeneration.

use crate::{
    common::ReportPeriod,
    db::DbPool,
    entities::{
        facility::Entity as Facility,
        monthly_report::{self, Entity as MonthlyReport},
        monthly_report_item::{self, Entity as MonthlyReportItem},
        product::{self, Entity as Product},
    },
    errors::{from_transaction_error, ServiceError},
    events::{Event, EventSender},
    message_queue::{Message, MessageQueue},
    services::{ledger, lots},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Queue topic for deferred report generation.
pub const REPORT_GENERATION_TOPIC: &str = "reports.generate";

/// Payload for a queued generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGenerationJob {
    pub facility_id: i64,
    pub period: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Discard and regenerate an existing report.
    pub force: bool,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReportSummary {
    pub report_id: i64,
    pub facility_id: i64,
    pub period: String,
    pub item_count: usize,
    pub regenerated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReportView {
    pub report: monthly_report::Model,
    pub items: Vec<monthly_report_item::Model>,
}

/// Manual edit of a report row. Only adjustments and stockout days are
/// settable; the closing balance is always recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemEdit {
    pub positive_adjustments: Option<Decimal>,
    pub negative_adjustments: Option<Decimal>,
    pub stockout_days: Option<i32>,
}

#[derive(Debug, Default)]
pub struct ProcessedReportJobs {
    pub generated: Vec<MonthlyReportSummary>,
    pub failed: usize,
}

#[derive(Clone)]
pub struct MonthlyReportService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    queue: Arc<dyn MessageQueue>,
}

impl MonthlyReportService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            queue,
        }
    }

    /// Generates the monthly report for a facility and period.
    ///
    /// Covers every product with a movement in the period plus the whole
    /// active catalog (zero rows included, so the report is complete for
    /// every eligible product). Without `force` an existing report is an
    /// error; with it, the prior report is discarded and rebuilt. The
    /// whole run is one transaction.
    #[instrument(skip(self, options), fields(facility_id, period = %period))]
    pub async fn generate(
        &self,
        facility_id: i64,
        period: ReportPeriod,
        options: GenerateOptions,
    ) -> Result<MonthlyReportSummary, ServiceError> {
        let db = self.db_pool.as_ref();
        let summary = db
            .transaction::<_, MonthlyReportSummary, ServiceError>(move |txn| {
                Box::pin(async move {
                    Facility::find_by_id(facility_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("facility {} not found", facility_id))
                        })?;

                    let existing = MonthlyReport::find()
                        .filter(monthly_report::Column::FacilityId.eq(facility_id))
                        .filter(monthly_report::Column::Period.eq(period.to_string()))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let regenerated = existing.is_some();
                    if let Some(report) = existing {
                        if !options.force {
                            return Err(ServiceError::ReportAlreadyExists {
                                facility_id,
                                period: period.to_string(),
                            });
                        }
                        MonthlyReportItem::delete_many()
                            .filter(monthly_report_item::Column::ReportId.eq(report.id))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        report.delete(txn).await.map_err(ServiceError::db_error)?;
                    }

                    let totals = ledger::period_totals(txn, facility_id, period).await?;

                    let catalog = Product::find()
                        .filter(product::Column::Active.eq(true))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let mut product_ids: BTreeSet<i64> =
                        catalog.iter().map(|p| p.id).collect();
                    product_ids.extend(totals.keys().copied());

                    let prior_closings =
                        prior_period_closings(txn, facility_id, period).await?;

                    let now = Utc::now();
                    let report = monthly_report::ActiveModel {
                        facility_id: Set(facility_id),
                        period: Set(period.to_string()),
                        generated_at: Set(now),
                        created_by: Set(options.created_by),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let mut item_count = 0usize;
                    for product_id in product_ids {
                        let totals = totals.get(&product_id).copied().unwrap_or_default();

                        // Chain from last month's closing; a product absent
                        // from the prior report (or a first report) opens at
                        // the current on-hand total instead.
                        let opening = match prior_closings.get(&product_id) {
                            Some(closing) => *closing,
                            None => lots::total_quantity(txn, facility_id, product_id).await?,
                        };

                        let closing = opening + totals.received - totals.issued;

                        monthly_report_item::ActiveModel {
                            report_id: Set(report.id),
                            product_id: Set(product_id),
                            opening_balance: Set(opening),
                            stock_received: Set(totals.received),
                            stock_issued: Set(totals.issued),
                            positive_adjustments: Set(Decimal::ZERO),
                            negative_adjustments: Set(Decimal::ZERO),
                            closing_balance: Set(closing),
                            stockout_days: Set(0),
                            created_at: Set(now),
                            updated_at: Set(now),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                        item_count += 1;
                    }

                    Ok(MonthlyReportSummary {
                        report_id: report.id,
                        facility_id,
                        period: period.to_string(),
                        item_count,
                        regenerated,
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            report_id = summary.report_id,
            facility_id = summary.facility_id,
            period = %summary.period,
            items = summary.item_count,
            regenerated = summary.regenerated,
            "monthly report generated"
        );

        self.event_sender
            .send(Event::MonthlyReportGenerated {
                report_id: summary.report_id,
                facility_id: summary.facility_id,
                period: summary.period.clone(),
                item_count: summary.item_count,
                regenerated: summary.regenerated,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(summary)
    }

    /// Applies an operator edit to a report row and recomputes the
    /// closing balance.
    #[instrument(skip(self, edit))]
    pub async fn update_item(
        &self,
        item_id: i64,
        edit: ItemEdit,
    ) -> Result<monthly_report_item::Model, ServiceError> {
        if let Some(value) = edit.positive_adjustments {
            if value < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "positive_adjustments must not be negative, got {}",
                    value
                )));
            }
        }
        if let Some(value) = edit.negative_adjustments {
            if value < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "negative_adjustments must not be negative, got {}",
                    value
                )));
            }
        }
        if let Some(days) = edit.stockout_days {
            if !(0..=31).contains(&days) {
                return Err(ServiceError::ValidationError(format!(
                    "stockout_days must be within 0..=31, got {}",
                    days
                )));
            }
        }

        let db = self.db_pool.as_ref();
        let updated = db
            .transaction::<_, monthly_report_item::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let item = MonthlyReportItem::find_by_id(item_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("report item {} not found", item_id))
                        })?;

                    let mut updated = item.clone();
                    if let Some(value) = edit.positive_adjustments {
                        updated.positive_adjustments = value;
                    }
                    if let Some(value) = edit.negative_adjustments {
                        updated.negative_adjustments = value;
                    }
                    if let Some(days) = edit.stockout_days {
                        updated.stockout_days = days;
                    }

                    let closing = updated.computed_closing();
                    let mut active: monthly_report_item::ActiveModel = item.into();
                    active.positive_adjustments = Set(updated.positive_adjustments);
                    active.negative_adjustments = Set(updated.negative_adjustments);
                    active.stockout_days = Set(updated.stockout_days);
                    active.closing_balance = Set(closing);
                    active.updated_at = Set(Utc::now());
                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.event_sender
            .send(Event::MonthlyReportItemEdited {
                report_id: updated.report_id,
                item_id: updated.id,
                product_id: updated.product_id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(updated)
    }

    /// Report header plus rows, for the read-only export collaborator.
    pub async fn get_report(
        &self,
        facility_id: i64,
        period: ReportPeriod,
    ) -> Result<MonthlyReportView, ServiceError> {
        let db = self.db_pool.as_ref();
        let report = MonthlyReport::find()
            .filter(monthly_report::Column::FacilityId.eq(facility_id))
            .filter(monthly_report::Column::Period.eq(period.to_string()))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no report for facility {} period {}",
                    facility_id, period
                ))
            })?;

        let items = MonthlyReportItem::find()
            .filter(monthly_report_item::Column::ReportId.eq(report.id))
            .order_by_asc(monthly_report_item::Column::ProductId)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(MonthlyReportView { report, items })
    }

    /// Queues a generation request for the background worker.
    pub async fn enqueue_generation(&self, job: ReportGenerationJob) -> Result<(), ServiceError> {
        let payload = serde_json::to_value(&job)
            .map_err(|e| ServiceError::QueueError(e.to_string()))?;
        self.queue
            .publish(Message::new(REPORT_GENERATION_TOPIC.to_string(), payload))
            .await
            .map_err(|e| ServiceError::QueueError(e.to_string()))?;
        info!(
            facility_id = job.facility_id,
            period = %job.period,
            force = job.force,
            "report generation queued"
        );
        Ok(())
    }

    /// Drains queued generation jobs. Each job is its own transaction; a
    /// failing job is logged and counted, never retried here, and does
    /// not stop the drain.
    pub async fn process_queued_jobs(&self) -> Result<ProcessedReportJobs, ServiceError> {
        let mut processed = ProcessedReportJobs::default();

        loop {
            let message = self
                .queue
                .subscribe(REPORT_GENERATION_TOPIC)
                .await
                .map_err(|e| ServiceError::QueueError(e.to_string()))?;
            let Some(message) = message else {
                break;
            };

            match self.run_job(&message).await {
                Ok(summary) => processed.generated.push(summary),
                Err(err) => {
                    error!(message_id = %message.id, error = %err, "report job failed");
                    processed.failed += 1;
                }
            }

            self.queue
                .ack(&message.id)
                .await
                .map_err(|e| ServiceError::QueueError(e.to_string()))?;
        }

        if processed.failed > 0 {
            warn!(failed = processed.failed, "some report jobs failed");
        }
        Ok(processed)
    }

    async fn run_job(&self, message: &Message) -> Result<MonthlyReportSummary, ServiceError> {
        let job: ReportGenerationJob = serde_json::from_value(message.payload.clone())
            .map_err(|e| ServiceError::QueueError(format!("bad job payload: {}", e)))?;
        let period: ReportPeriod = job.period.parse()?;
        self.generate(
            job.facility_id,
            period,
            GenerateOptions {
                force: job.force,
                created_by: None,
            },
        )
        .await
    }
}

/// Closing balances of the previous period's report, keyed by product.
/// Empty when no prior report exists.
async fn prior_period_closings(
    txn: &sea_orm::DatabaseTransaction,
    facility_id: i64,
    period: ReportPeriod,
) -> Result<HashMap<i64, Decimal>, ServiceError> {
    let prior = MonthlyReport::find()
        .filter(monthly_report::Column::FacilityId.eq(facility_id))
        .filter(monthly_report::Column::Period.eq(period.prev().to_string()))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let Some(prior) = prior else {
        return Ok(HashMap::new());
    };

    let items = MonthlyReportItem::find()
        .filter(monthly_report_item::Column::ReportId.eq(prior.id))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(items
        .into_iter()
        .map(|item| (item.product_id, item.closing_balance))
        .collect())
}
