use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "facilities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub code: String,
    pub name: String,
    pub facility_type: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_lot::Entity")]
    StockLots,
    #[sea_orm(has_many = "super::monthly_report::Entity")]
    MonthlyReports,
}

impl Related<super::stock_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockLots.def()
    }
}

impl Related<super::monthly_report::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonthlyReports.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Dispensing points and bulk warehouses share one table; the type only
/// matters to outer layers routing transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilityType {
    Facility,
    Warehouse,
}
