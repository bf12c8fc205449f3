pub mod allocation;
pub mod consumption;
pub mod dispensing;
pub mod ledger;
pub mod lots;
pub mod orders;
pub mod reporting;
pub mod transfers;
