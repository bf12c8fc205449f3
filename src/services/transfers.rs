//! Inter-facility transfers: dispatch issues stock from the source
//! facility, receive books it into the destination. The two legs are
//! independent transactions against independent lot stores; each leg is
//! all-or-nothing on its own side.

use crate::{
    db::DbPool,
    entities::stock_movement::MovementSource,
    errors::{from_transaction_error, ServiceError, StockShortfall},
    events::{Event, EventSender},
    services::{allocation, ledger, lots},
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
pub struct TransferDispatchRequest {
    pub source_facility_id: i64,
    pub transfer_id: Uuid,
    pub movement_date: NaiveDate,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub dispatched_by: Option<Uuid>,
    #[validate(length(min = 1))]
    pub lines: Vec<TransferDispatchLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDispatchLine {
    pub line_id: Option<Uuid>,
    pub product_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferReceiptRequest {
    pub destination_facility_id: i64,
    pub transfer_id: Uuid,
    pub movement_date: NaiveDate,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub received_by: Option<Uuid>,
    #[validate(length(min = 1))]
    pub lines: Vec<IncomingStockLine>,
}

/// Stock arriving with full batch attribution, as shipped by the source
/// or delivered by a supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingStockLine {
    pub line_id: Option<Uuid>,
    pub product_id: i64,
    pub batch_number: String,
    pub quantity: Decimal,
    pub expiry_date: Option<NaiveDate>,
    pub unit_of_measure: String,
    #[serde(default)]
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub transfer_id: Uuid,
    pub facility_id: i64,
    pub line_count: usize,
    pub movement_count: usize,
}

#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl TransferService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Issues transfer stock out of the source facility.
    #[instrument(skip(self, request), fields(transfer_id = %request.transfer_id))]
    pub async fn dispatch(
        &self,
        request: TransferDispatchRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            if line.quantity < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "transfer line for product {} has negative quantity {}",
                    line.product_id, line.quantity
                )));
            }
        }

        let db = self.db_pool.as_ref();
        let req = request.clone();
        let outcome = db
            .transaction::<_, TransferOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut shortages = Vec::new();
                    let mut movement_count = 0usize;

                    for line in &req.lines {
                        let allocations = match allocation::allocate(
                            txn,
                            req.source_facility_id,
                            line.product_id,
                            line.quantity,
                        )
                        .await
                        {
                            Ok(allocations) => allocations,
                            Err(ServiceError::InsufficientStock(shortfall)) => {
                                shortages.extend(shortfall.shortages);
                                continue;
                            }
                            Err(other) => return Err(other),
                        };

                        for taken in allocations {
                            ledger::record_issued(
                                txn,
                                ledger::NewMovement {
                                    facility_id: req.source_facility_id,
                                    product_id: line.product_id,
                                    source: MovementSource::Transfer,
                                    source_id: req.transfer_id,
                                    source_item_id: line.line_id,
                                    quantity: taken.quantity,
                                    batch_number: Some(taken.batch_number),
                                    expiry_date: taken.expiry_date,
                                    movement_date: req.movement_date,
                                    reference_number: req.reference_number.clone(),
                                    created_by: req.dispatched_by,
                                },
                            )
                            .await?;
                            movement_count += 1;
                        }
                    }

                    if !shortages.is_empty() {
                        return Err(ServiceError::InsufficientStock(StockShortfall {
                            facility_id: req.source_facility_id,
                            shortages,
                        }));
                    }

                    Ok(TransferOutcome {
                        transfer_id: req.transfer_id,
                        facility_id: req.source_facility_id,
                        line_count: req.lines.len(),
                        movement_count,
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            transfer_id = %outcome.transfer_id,
            facility_id = outcome.facility_id,
            lines = outcome.line_count,
            "transfer dispatched"
        );

        self.event_sender
            .send(Event::TransferDispatched {
                facility_id: outcome.facility_id,
                transfer_id: outcome.transfer_id,
                line_count: outcome.line_count,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }

    /// Books transfer stock into the destination facility.
    #[instrument(skip(self, request), fields(transfer_id = %request.transfer_id))]
    pub async fn receive(
        &self,
        request: TransferReceiptRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();
        let req = request.clone();
        let outcome = db
            .transaction::<_, TransferOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut movement_count = 0usize;

                    for line in &req.lines {
                        lots::receive(
                            txn,
                            lots::NewLotStock {
                                facility_id: req.destination_facility_id,
                                product_id: line.product_id,
                                batch_number: line.batch_number.clone(),
                                quantity: line.quantity,
                                expiry_date: line.expiry_date,
                                unit_of_measure: line.unit_of_measure.clone(),
                                barcode: line.barcode.clone(),
                            },
                        )
                        .await?;

                        ledger::record_received(
                            txn,
                            ledger::NewMovement {
                                facility_id: req.destination_facility_id,
                                product_id: line.product_id,
                                source: MovementSource::Transfer,
                                source_id: req.transfer_id,
                                source_item_id: line.line_id,
                                quantity: line.quantity,
                                batch_number: Some(line.batch_number.clone()),
                                expiry_date: line.expiry_date,
                                movement_date: req.movement_date,
                                reference_number: req.reference_number.clone(),
                                created_by: req.received_by,
                            },
                        )
                        .await?;
                        movement_count += 1;
                    }

                    Ok(TransferOutcome {
                        transfer_id: req.transfer_id,
                        facility_id: req.destination_facility_id,
                        line_count: req.lines.len(),
                        movement_count,
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            transfer_id = %outcome.transfer_id,
            facility_id = outcome.facility_id,
            lines = outcome.line_count,
            "transfer received"
        );

        self.event_sender
            .send(Event::TransferReceived {
                facility_id: outcome.facility_id,
                transfer_id: outcome.transfer_id,
                line_count: outcome.line_count,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }
}
