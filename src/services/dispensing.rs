//! Dispensing: patient dispenses and bulk MOH dispenses.
//!
//! Both paths allocate every line inside one transaction and write one
//! ISSUED movement per consumed lot. Insufficiency on any line aborts
//! the whole batch; the error carries every short product so the caller
//! can restock and retry the batch as a unit.

use crate::{
    db::DbPool,
    entities::stock_movement::MovementSource,
    errors::{from_transaction_error, ServiceError, StockShortfall},
    events::{Event, EventSender},
    services::{allocation, ledger},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispenseRequest {
    pub facility_id: i64,
    /// Identifier of the dispense record owned by the calling layer.
    pub dispense_id: Uuid,
    pub movement_date: NaiveDate,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub dispensed_by: Option<Uuid>,
    #[validate(length(min = 1))]
    pub lines: Vec<DispenseLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseLine {
    /// Line id in the calling layer's dispense record, if any.
    pub line_id: Option<Uuid>,
    pub product_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispenseOutcome {
    pub dispense_id: Uuid,
    pub facility_id: i64,
    pub line_count: usize,
    pub movement_count: usize,
    pub total_issued: Decimal,
}

#[derive(Clone)]
pub struct DispenseService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl DispenseService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Dispenses to a patient.
    #[instrument(skip(self, request), fields(dispense_id = %request.dispense_id))]
    pub async fn dispense(&self, request: DispenseRequest) -> Result<DispenseOutcome, ServiceError> {
        self.execute(request, MovementSource::Dispense).await
    }

    /// Bulk dispense to the Ministry of Health. Same ledger semantics as
    /// a patient dispense, distinct source attribution.
    #[instrument(skip(self, request), fields(dispense_id = %request.dispense_id))]
    pub async fn dispense_bulk(
        &self,
        request: DispenseRequest,
    ) -> Result<DispenseOutcome, ServiceError> {
        self.execute(request, MovementSource::MohDispense).await
    }

    async fn execute(
        &self,
        request: DispenseRequest,
        source: MovementSource,
    ) -> Result<DispenseOutcome, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            if line.quantity < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "dispense line for product {} has negative quantity {}",
                    line.product_id, line.quantity
                )));
            }
        }

        let db = self.db_pool.as_ref();
        let req = request.clone();
        let outcome = db
            .transaction::<_, DispenseOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut shortages = Vec::new();
                    let mut total_issued = Decimal::ZERO;
                    let mut movement_count = 0usize;

                    for line in &req.lines {
                        let allocations = match allocation::allocate(
                            txn,
                            req.facility_id,
                            line.product_id,
                            line.quantity,
                        )
                        .await
                        {
                            Ok(allocations) => allocations,
                            Err(ServiceError::InsufficientStock(shortfall)) => {
                                // Keep probing the remaining lines so the
                                // error names every short product at once.
                                shortages.extend(shortfall.shortages);
                                continue;
                            }
                            Err(other) => return Err(other),
                        };

                        for taken in allocations {
                            ledger::record_issued(
                                txn,
                                ledger::NewMovement {
                                    facility_id: req.facility_id,
                                    product_id: line.product_id,
                                    source,
                                    source_id: req.dispense_id,
                                    source_item_id: line.line_id,
                                    quantity: taken.quantity,
                                    batch_number: Some(taken.batch_number),
                                    expiry_date: taken.expiry_date,
                                    movement_date: req.movement_date,
                                    reference_number: req.reference_number.clone(),
                                    created_by: req.dispensed_by,
                                },
                            )
                            .await?;
                            total_issued += taken.quantity;
                            movement_count += 1;
                        }
                    }

                    if !shortages.is_empty() {
                        return Err(ServiceError::InsufficientStock(StockShortfall {
                            facility_id: req.facility_id,
                            shortages,
                        }));
                    }

                    Ok(DispenseOutcome {
                        dispense_id: req.dispense_id,
                        facility_id: req.facility_id,
                        line_count: req.lines.len(),
                        movement_count,
                        total_issued,
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            dispense_id = %outcome.dispense_id,
            facility_id = outcome.facility_id,
            lines = outcome.line_count,
            issued = %outcome.total_issued,
            "dispense committed"
        );

        let event = match source {
            MovementSource::MohDispense => Event::BulkDispenseCompleted {
                facility_id: outcome.facility_id,
                dispense_id: outcome.dispense_id,
                line_count: outcome.line_count,
                total_issued: outcome.total_issued,
            },
            _ => Event::DispenseCompleted {
                facility_id: outcome.facility_id,
                dispense_id: outcome.dispense_id,
                line_count: outcome.line_count,
                total_issued: outcome.total_issued,
            },
        };
        self.event_sender
            .send(event)
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }
}
