//! Order receipt: delivery of ordered stock into a facility. The order
//! itself (supplier, approval, pricing) lives in the calling layer; the
//! core books the delivered quantities and their ledger rows.

use crate::{
    db::DbPool,
    entities::stock_movement::MovementSource,
    errors::{from_transaction_error, ServiceError},
    events::{Event, EventSender},
    services::{ledger, lots, transfers::IncomingStockLine},
};
use chrono::NaiveDate;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderReceiptRequest {
    pub facility_id: i64,
    pub order_id: Uuid,
    pub movement_date: NaiveDate,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub received_by: Option<Uuid>,
    #[validate(length(min = 1))]
    pub lines: Vec<IncomingStockLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReceiptOutcome {
    pub order_id: Uuid,
    pub facility_id: i64,
    pub line_count: usize,
    pub lot_ids: Vec<i64>,
}

#[derive(Clone)]
pub struct OrderReceiptService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderReceiptService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Books delivered order items into the facility's lot store.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn receive_order(
        &self,
        request: OrderReceiptRequest,
    ) -> Result<OrderReceiptOutcome, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();
        let req = request.clone();
        let outcome = db
            .transaction::<_, OrderReceiptOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut lot_ids = Vec::with_capacity(req.lines.len());

                    for line in &req.lines {
                        let lot = lots::receive(
                            txn,
                            lots::NewLotStock {
                                facility_id: req.facility_id,
                                product_id: line.product_id,
                                batch_number: line.batch_number.clone(),
                                quantity: line.quantity,
                                expiry_date: line.expiry_date,
                                unit_of_measure: line.unit_of_measure.clone(),
                                barcode: line.barcode.clone(),
                            },
                        )
                        .await?;
                        lot_ids.push(lot.id);

                        ledger::record_received(
                            txn,
                            ledger::NewMovement {
                                facility_id: req.facility_id,
                                product_id: line.product_id,
                                source: MovementSource::Order,
                                source_id: req.order_id,
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
                    }

                    Ok(OrderReceiptOutcome {
                        order_id: req.order_id,
                        facility_id: req.facility_id,
                        line_count: req.lines.len(),
                        lot_ids,
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(
            order_id = %outcome.order_id,
            facility_id = outcome.facility_id,
            lines = outcome.line_count,
            "order receipt committed"
        );

        self.event_sender
            .send(Event::OrderReceived {
                facility_id: outcome.facility_id,
                order_id: outcome.order_id,
                line_count: outcome.line_count,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }
}
