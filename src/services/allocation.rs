//! Allocation engine: splits a required quantity across lots in
//! earliest-expiry-first order.
//!
//! Runs strictly inside the caller's transaction. Decrements are applied
//! lot by lot; if the request cannot be fully covered the engine returns
//! `InsufficientStock` and the caller's rollback undoes every decrement
//! already made, so no partial issue can ever be committed.

use crate::{
    errors::{ServiceError, StockShortfall},
    services::lots,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use serde::Serialize;
use tracing::{debug, instrument};

/// One lot's share of an allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotAllocation {
    pub lot_id: i64,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Decimal,
}

/// Deducts `requested` of a product from the facility's lots.
///
/// Lots are consumed in ascending expiry order (NULL expiry last, ties by
/// insertion order), each taken up to its full quantity, until the
/// request is satisfied. Identical lot states always produce the
/// identical split.
///
/// A zero request is a no-op returning an empty allocation.
#[instrument(skip(txn))]
pub async fn allocate(
    txn: &DatabaseTransaction,
    facility_id: i64,
    product_id: i64,
    requested: Decimal,
) -> Result<Vec<LotAllocation>, ServiceError> {
    if requested < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "cannot allocate negative quantity {} of product {}",
            requested, product_id
        )));
    }
    if requested.is_zero() {
        return Ok(Vec::new());
    }

    let candidates = lots::find_issuable_lots_for_update(txn, facility_id, product_id).await?;

    let mut remaining = requested;
    let mut allocations = Vec::new();

    for lot in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(lot.quantity);
        lots::adjust(txn, lot.id, -take).await?;
        debug!(
            lot_id = lot.id,
            batch = %lot.batch_number,
            taken = %take,
            "allocated from lot"
        );
        allocations.push(LotAllocation {
            lot_id: lot.id,
            batch_number: lot.batch_number,
            expiry_date: lot.expiry_date,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        return Err(ServiceError::InsufficientStock(StockShortfall::single(
            facility_id,
            product_id,
            requested,
            remaining,
        )));
    }

    Ok(allocations)
}
