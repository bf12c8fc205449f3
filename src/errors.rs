use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::Serialize;
use std::fmt;

/// A single product that could not be fully allocated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockShortage {
    pub product_id: i64,
    /// Quantity the caller asked for.
    pub requested: Decimal,
    /// Portion of the request that no lot could cover.
    pub missing: Decimal,
}

/// Every product short in a failed allocation batch.
///
/// A bulk dispense halts as a whole; the report lists all short lines so
/// the caller can restock and retry the full batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockShortfall {
    pub facility_id: i64,
    pub shortages: Vec<StockShortage>,
}

impl StockShortfall {
    pub fn single(facility_id: i64, product_id: i64, requested: Decimal, missing: Decimal) -> Self {
        Self {
            facility_id,
            shortages: vec![StockShortage {
                product_id,
                requested,
                missing,
            }],
        }
    }
}

impl fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "facility {}: {} product(s) short (",
            self.facility_id,
            self.shortages.len()
        )?;
        for (i, s) in self.shortages.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "product {} requested {} missing {}",
                s.product_id, s.requested, s.missing
            )?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(StockShortfall),

    #[error("Negative quantity on lot {lot_id}: adjustment would leave {resulting}")]
    NegativeQuantity { lot_id: i64, resulting: Decimal },

    #[error("Report already exists for facility {facility_id} period {period}")]
    ReportAlreadyExists { facility_id: i64, period: String },

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// True when the caller can fix the condition and retry (restock,
    /// reduce the quantity, or pass the force flag).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::InsufficientStock(_)
                | ServiceError::ReportAlreadyExists { .. }
                | ServiceError::ValidationError(_)
        )
    }
}

/// Unwraps sea-orm's transaction error wrapper back into a ServiceError.
pub fn from_transaction_error(err: sea_orm::TransactionError<ServiceError>) -> ServiceError {
    match err {
        sea_orm::TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        sea_orm::TransactionError::Transaction(service_err) => service_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shortfall_display_lists_every_short_product() {
        let shortfall = StockShortfall {
            facility_id: 7,
            shortages: vec![
                StockShortage {
                    product_id: 1,
                    requested: dec!(10),
                    missing: dec!(2),
                },
                StockShortage {
                    product_id: 2,
                    requested: dec!(5),
                    missing: dec!(5),
                },
            ],
        };
        let text = shortfall.to_string();
        assert!(text.contains("product 1 requested 10 missing 2"));
        assert!(text.contains("product 2 requested 5 missing 5"));
    }

    #[test]
    fn recoverable_classification() {
        let err = ServiceError::InsufficientStock(StockShortfall::single(
            1,
            2,
            dec!(10),
            dec!(3),
        ));
        assert!(err.is_recoverable());
        assert!(!ServiceError::NegativeQuantity {
            lot_id: 1,
            resulting: dec!(-1)
        }
        .is_recoverable());
    }
}
