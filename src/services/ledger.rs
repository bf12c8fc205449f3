//! Movement ledger: the append-only audit record of every stock change.
//!
//! Writes happen only inside the transaction that mutates the matching
//! lot; a movement without a lot mutation (or the reverse) is an
//! invariant violation, so neither insert is ever exposed on a bare
//! connection.

use crate::{
    common::ReportPeriod,
    entities::stock_movement::{self, Entity as StockMovement, MovementSource, MovementType},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    Set,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Attribution for a single movement row.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub facility_id: i64,
    pub product_id: i64,
    pub source: MovementSource,
    pub source_id: Uuid,
    pub source_item_id: Option<Uuid>,
    pub quantity: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub movement_date: NaiveDate,
    pub reference_number: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Received and issued totals for one product in one period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodTotals {
    pub received: Decimal,
    pub issued: Decimal,
}

pub async fn record_received(
    txn: &DatabaseTransaction,
    movement: NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    insert(txn, movement, MovementType::Received).await
}

pub async fn record_issued(
    txn: &DatabaseTransaction,
    movement: NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    insert(txn, movement, MovementType::Issued).await
}

async fn insert(
    txn: &DatabaseTransaction,
    movement: NewMovement,
    movement_type: MovementType,
) -> Result<stock_movement::Model, ServiceError> {
    if movement.quantity < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "movement quantity {} must not be negative",
            movement.quantity
        )));
    }

    let (received, issued) = match movement_type {
        MovementType::Received => (movement.quantity, Decimal::ZERO),
        MovementType::Issued => (Decimal::ZERO, movement.quantity),
    };

    let row = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        facility_id: Set(movement.facility_id),
        product_id: Set(movement.product_id),
        movement_type: Set(movement_type.as_ref().to_string()),
        source_type: Set(movement.source.as_ref().to_string()),
        source_id: Set(movement.source_id),
        source_item_id: Set(movement.source_item_id),
        received_quantity: Set(received),
        issued_quantity: Set(issued),
        batch_number: Set(movement.batch_number),
        expiry_date: Set(movement.expiry_date),
        movement_date: Set(movement.movement_date),
        reference_number: Set(movement.reference_number),
        created_by: Set(movement.created_by),
        created_at: Set(Utc::now()),
    };

    row.insert(txn).await.map_err(ServiceError::db_error)
}

/// Sum of one movement type for a product over a reporting period.
pub async fn sum_by_type_and_period<C: ConnectionTrait>(
    conn: &C,
    facility_id: i64,
    product_id: i64,
    movement_type: MovementType,
    period: ReportPeriod,
) -> Result<Decimal, ServiceError> {
    let rows = StockMovement::find()
        .filter(stock_movement::Column::FacilityId.eq(facility_id))
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::MovementType.eq(movement_type.as_ref()))
        .filter(stock_movement::Column::MovementDate.between(period.first_day(), period.last_day()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(rows
        .iter()
        .map(|row| match movement_type {
            MovementType::Received => row.received_quantity,
            MovementType::Issued => row.issued_quantity,
        })
        .sum())
}

/// Per-product received/issued totals for a facility's period, in one
/// scan. All source types count; the aggregator does not care whether an
/// issue went to a patient, an MOH bulk dispense, or another facility.
pub async fn period_totals<C: ConnectionTrait>(
    conn: &C,
    facility_id: i64,
    period: ReportPeriod,
) -> Result<HashMap<i64, PeriodTotals>, ServiceError> {
    let rows = StockMovement::find()
        .filter(stock_movement::Column::FacilityId.eq(facility_id))
        .filter(stock_movement::Column::MovementDate.between(period.first_day(), period.last_day()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut totals: HashMap<i64, PeriodTotals> = HashMap::new();
    for row in rows {
        let entry = totals.entry(row.product_id).or_default();
        entry.received += row.received_quantity;
        entry.issued += row.issued_quantity;
    }

    Ok(totals)
}

/// Movements of a product in a period, for audit listings.
pub async fn movements_for_product<C: ConnectionTrait>(
    conn: &C,
    facility_id: i64,
    product_id: i64,
    period: ReportPeriod,
) -> Result<Vec<stock_movement::Model>, ServiceError> {
    StockMovement::find()
        .filter(stock_movement::Column::FacilityId.eq(facility_id))
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::MovementDate.between(period.first_day(), period.last_day()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}
