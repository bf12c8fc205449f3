use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-product row of a monthly report.
///
/// `closing_balance` is derived, never set directly:
/// opening + received - issued + positive_adj - negative_adj.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_report_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub report_id: i64,
    pub product_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub opening_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub stock_received: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub stock_issued: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub positive_adjustments: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub negative_adjustments: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub closing_balance: Decimal,
    pub stockout_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monthly_report::Entity",
        from = "Column::ReportId",
        to = "super::monthly_report::Column::Id"
    )]
    MonthlyReport,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::monthly_report::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonthlyReport.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The balance identity every row must satisfy.
    pub fn computed_closing(&self) -> Decimal {
        self.opening_balance + self.stock_received - self.stock_issued
            + self.positive_adjustments
            - self.negative_adjustments
    }
}
