pub mod facility;
pub mod monthly_report;
pub mod monthly_report_item;
pub mod product;
pub mod stock_lot;
pub mod stock_movement;
