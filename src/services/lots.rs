//! Lot store: per-batch inventory rows scoped to one facility.
//!
//! Exhausted lots are retained as zeroed rows for the audit trail and
//! filtered out of issuable queries; nothing here deletes a lot.

use crate::{
    entities::stock_lot::{self, Entity as StockLot},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::instrument;

/// Input for a stock receipt into the lot store.
#[derive(Debug, Clone)]
pub struct NewLotStock {
    pub facility_id: i64,
    pub product_id: i64,
    pub batch_number: String,
    pub quantity: Decimal,
    pub expiry_date: Option<NaiveDate>,
    pub unit_of_measure: String,
    pub barcode: Option<String>,
}

/// Lots with stock on hand, ordered for issue: ascending expiry date with
/// NULL expiries last, ties broken by lot id (insertion order).
///
/// The fetch is id-ordered and the expiry ordering applied as a stable
/// sort in Rust, so NULL placement does not depend on the backend.
pub async fn find_issuable_lots<C: ConnectionTrait>(
    conn: &C,
    facility_id: i64,
    product_id: i64,
) -> Result<Vec<stock_lot::Model>, ServiceError> {
    let mut lots = StockLot::find()
        .filter(stock_lot::Column::FacilityId.eq(facility_id))
        .filter(stock_lot::Column::ProductId.eq(product_id))
        .filter(stock_lot::Column::Quantity.gt(Decimal::ZERO))
        .order_by_asc(stock_lot::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    sort_for_issue(&mut lots);
    Ok(lots)
}

/// Same ordering as [`find_issuable_lots`], but takes exclusive row locks
/// so concurrent allocations against the same product cannot both read a
/// stale quantity. Postgres renders `FOR UPDATE`; SQLite serializes
/// through the transaction itself.
pub async fn find_issuable_lots_for_update(
    txn: &DatabaseTransaction,
    facility_id: i64,
    product_id: i64,
) -> Result<Vec<stock_lot::Model>, ServiceError> {
    let mut lots = StockLot::find()
        .filter(stock_lot::Column::FacilityId.eq(facility_id))
        .filter(stock_lot::Column::ProductId.eq(product_id))
        .filter(stock_lot::Column::Quantity.gt(Decimal::ZERO))
        .order_by_asc(stock_lot::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    sort_for_issue(&mut lots);
    Ok(lots)
}

fn sort_for_issue(lots: &mut [stock_lot::Model]) {
    // Stable: equal keys keep the id order from the fetch.
    lots.sort_by_key(|lot| match lot.expiry_date {
        Some(date) => (0u8, date),
        None => (1u8, NaiveDate::MAX),
    });
}

/// Receives stock: increments the existing `(facility, product, batch)`
/// lot or creates a new one. Must run inside the transaction that also
/// records the matching ledger movement.
#[instrument(skip(txn))]
pub async fn receive(
    txn: &DatabaseTransaction,
    stock: NewLotStock,
) -> Result<stock_lot::Model, ServiceError> {
    if stock.quantity < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "cannot receive negative quantity {} for product {}",
            stock.quantity, stock.product_id
        )));
    }

    let existing = StockLot::find()
        .filter(stock_lot::Column::FacilityId.eq(stock.facility_id))
        .filter(stock_lot::Column::ProductId.eq(stock.product_id))
        .filter(stock_lot::Column::BatchNumber.eq(stock.batch_number.clone()))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?;

    match existing {
        Some(lot) => {
            let mut active: stock_lot::ActiveModel = lot.clone().into();
            active.quantity = Set(lot.quantity + stock.quantity);
            if lot.expiry_date.is_none() && stock.expiry_date.is_some() {
                active.expiry_date = Set(stock.expiry_date);
            }
            if lot.barcode.is_none() && stock.barcode.is_some() {
                active.barcode = Set(stock.barcode.clone());
            }
            active.updated_at = Set(Utc::now());
            active.update(txn).await.map_err(ServiceError::db_error)
        }
        None => {
            let now = Utc::now();
            let lot = stock_lot::ActiveModel {
                facility_id: Set(stock.facility_id),
                product_id: Set(stock.product_id),
                batch_number: Set(stock.batch_number.clone()),
                expiry_date: Set(stock.expiry_date),
                quantity: Set(stock.quantity),
                unit_of_measure: Set(stock.unit_of_measure.clone()),
                barcode: Set(stock.barcode.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            lot.insert(txn).await.map_err(ServiceError::db_error)
        }
    }
}

/// Applies a signed quantity delta to a lot. Refuses to drive the
/// quantity below zero; the allocation engine keeps this from ever
/// firing on the happy path.
pub async fn adjust(
    txn: &DatabaseTransaction,
    lot_id: i64,
    delta: Decimal,
) -> Result<stock_lot::Model, ServiceError> {
    let lot = StockLot::find_by_id(lot_id)
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("stock lot {} not found", lot_id)))?;

    let resulting = lot.quantity + delta;
    if resulting < Decimal::ZERO {
        return Err(ServiceError::NegativeQuantity { lot_id, resulting });
    }

    let mut active: stock_lot::ActiveModel = lot.into();
    active.quantity = Set(resulting);
    active.updated_at = Set(Utc::now());
    active.update(txn).await.map_err(ServiceError::db_error)
}

/// Total on-hand quantity across all lots of a product at a facility.
/// Used as the opening-balance fallback for a facility's first report.
pub async fn total_quantity<C: ConnectionTrait>(
    conn: &C,
    facility_id: i64,
    product_id: i64,
) -> Result<Decimal, ServiceError> {
    let lots = StockLot::find()
        .filter(stock_lot::Column::FacilityId.eq(facility_id))
        .filter(stock_lot::Column::ProductId.eq(product_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(lots.iter().map(|lot| lot.quantity).sum())
}
