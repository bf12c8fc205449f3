//! Screened average monthly consumption (AMC).
//!
//! Raw monthly issue totals are a poor reorder signal: a stockout month
//! records near-zero consumption and a campaign month records a spike,
//! and either one swings a plain average hard. Screening walks the
//! series in time order, compares each month against the rolling average
//! of the three months before it, and replaces outliers with the last
//! accepted value before averaging.

use crate::{
    common::ReportPeriod,
    db::DbPool,
    entities::{
        monthly_report::{self, Entity as MonthlyReport},
        monthly_report_item::{self, Entity as MonthlyReportItem},
        product::Entity as Product,
    },
    errors::ServiceError,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Months whose deviation from the rolling average exceeds this are
/// excluded from the AMC.
const DEVIATION_THRESHOLD_PCT: Decimal = dec!(70);
/// Months screened before the rolling window applies.
const UNSCREENED_PREFIX: usize = 3;
/// The AMC is the average of this many trailing adjusted values.
const AVERAGING_WINDOW: usize = 3;

pub const DEFAULT_MONTHS_TO_ANALYZE: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct AmcOptions {
    pub months_to_analyze: usize,
    /// Reference date; the month containing it is in progress and
    /// excluded from analysis.
    pub as_of: NaiveDate,
}

impl AmcOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            months_to_analyze: DEFAULT_MONTHS_TO_ANALYZE,
            as_of,
        }
    }
}

/// One month of consumption history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthConsumption {
    pub period: ReportPeriod,
    pub quantity: Decimal,
}

/// Screening verdict for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenedMonth {
    pub period: ReportPeriod,
    /// Consumption as recorded.
    pub actual: Decimal,
    /// Value used for averaging: the actual when eligible, the most
    /// recently accepted value when excluded.
    pub adjusted: Decimal,
    pub eligible: bool,
    /// Deviation from the rolling 3-month average, absent for the
    /// unscreened leading months.
    pub deviation_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmcResult {
    pub amc: Decimal,
    pub eligible_months: usize,
    pub excluded_months: usize,
    pub breakdown: Vec<ScreenedMonth>,
}

/// Screens a consumption series (oldest first) and computes the AMC.
///
/// Screening is sequential and stateful: a substituted value takes part
/// in the rolling averages of the months after it.
pub fn screen_consumption(months: &[MonthConsumption]) -> AmcResult {
    let mut breakdown: Vec<ScreenedMonth> = Vec::with_capacity(months.len());
    let mut adjusted: Vec<Decimal> = Vec::with_capacity(months.len());
    let mut last_accepted = Decimal::ZERO;

    for (index, month) in months.iter().enumerate() {
        if index < UNSCREENED_PREFIX {
            // No baseline yet to screen against.
            breakdown.push(ScreenedMonth {
                period: month.period,
                actual: month.quantity,
                adjusted: month.quantity,
                eligible: true,
                deviation_pct: None,
            });
            adjusted.push(month.quantity);
            last_accepted = month.quantity;
            continue;
        }

        let window = &adjusted[index - UNSCREENED_PREFIX..index];
        let average = window.iter().copied().sum::<Decimal>() / Decimal::from(window.len() as u64);

        let deviation = if average.is_zero() {
            if month.quantity > Decimal::ZERO {
                dec!(100)
            } else {
                Decimal::ZERO
            }
        } else {
            (month.quantity - average).abs() / average * dec!(100)
        };

        let eligible = deviation <= DEVIATION_THRESHOLD_PCT;
        let value = if eligible {
            last_accepted = month.quantity;
            month.quantity
        } else {
            last_accepted
        };

        breakdown.push(ScreenedMonth {
            period: month.period,
            actual: month.quantity,
            adjusted: value,
            eligible,
            deviation_pct: Some(deviation),
        });
        adjusted.push(value);
    }

    let window = adjusted.len().min(AVERAGING_WINDOW);
    let amc = if window == 0 {
        Decimal::ZERO
    } else {
        adjusted[adjusted.len() - window..]
            .iter()
            .copied()
            .sum::<Decimal>()
            / Decimal::from(window as u64)
    };

    let eligible_months = breakdown.iter().filter(|m| m.eligible).count();
    AmcResult {
        amc,
        eligible_months,
        excluded_months: breakdown.len() - eligible_months,
        breakdown,
    }
}

/// Reorder threshold: AMC times replenishment lead time.
pub fn reorder_level(amc: Decimal, lead_time_months: Decimal) -> Decimal {
    amc * lead_time_months
}

#[derive(Clone)]
pub struct AmcService {
    db_pool: Arc<DbPool>,
}

impl AmcService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Computes the screened AMC for a product at a facility from the
    /// issued totals of its generated monthly reports.
    #[instrument(skip(self, options))]
    pub async fn compute_amc(
        &self,
        facility_id: i64,
        product_id: i64,
        options: AmcOptions,
    ) -> Result<AmcResult, ServiceError> {
        let months = self
            .consumption_history(facility_id, product_id, options)
            .await?;
        Ok(screen_consumption(&months))
    }

    /// AMC × the product's lead time (months, defaulting to one) — the
    /// stock level at which replenishment should be triggered.
    pub async fn reorder_level_for(
        &self,
        facility_id: i64,
        product_id: i64,
        options: AmcOptions,
    ) -> Result<Decimal, ServiceError> {
        let db = self.db_pool.as_ref();
        let product = Product::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("product {} not found", product_id)))?;

        let result = self.compute_amc(facility_id, product_id, options).await?;
        let lead_time = Decimal::from(product.lead_time_months.unwrap_or(1).max(0));
        Ok(reorder_level(result.amc, lead_time))
    }

    /// Up to `months_to_analyze` most recent complete months of issued
    /// totals, oldest first. Months without a generated report are
    /// simply absent from the series.
    async fn consumption_history(
        &self,
        facility_id: i64,
        product_id: i64,
        options: AmcOptions,
    ) -> Result<Vec<MonthConsumption>, ServiceError> {
        let db = self.db_pool.as_ref();
        let reports = MonthlyReport::find()
            .filter(monthly_report::Column::FacilityId.eq(facility_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut periods: Vec<(ReportPeriod, i64)> = Vec::with_capacity(reports.len());
        for report in reports {
            let period: ReportPeriod = report.period.parse()?;
            if period.is_complete(options.as_of) {
                periods.push((period, report.id));
            }
        }
        periods.sort_by_key(|(period, _)| *period);
        if periods.len() > options.months_to_analyze {
            periods.drain(..periods.len() - options.months_to_analyze);
        }

        let report_ids: Vec<i64> = periods.iter().map(|(_, id)| *id).collect();
        if report_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = MonthlyReportItem::find()
            .filter(monthly_report_item::Column::ProductId.eq(product_id))
            .filter(monthly_report_item::Column::ReportId.is_in(report_ids))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let issued_by_report: HashMap<i64, Decimal> = items
            .into_iter()
            .map(|item| (item.report_id, item.stock_issued))
            .collect();

        Ok(periods
            .into_iter()
            .filter_map(|(period, report_id)| {
                issued_by_report.get(&report_id).map(|issued| MonthConsumption {
                    period,
                    quantity: *issued,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[i64]) -> Vec<MonthConsumption> {
        let mut period: ReportPeriod = "2024-01".parse().unwrap();
        values
            .iter()
            .map(|value| {
                let month = MonthConsumption {
                    period,
                    quantity: Decimal::from(*value),
                };
                period = period.next();
                month
            })
            .collect()
    }

    #[test]
    fn empty_history_gives_zero() {
        let result = screen_consumption(&[]);
        assert_eq!(result.amc, Decimal::ZERO);
        assert_eq!(result.eligible_months, 0);
        assert!(result.breakdown.is_empty());
    }

    #[test]
    fn short_history_is_a_simple_average() {
        let result = screen_consumption(&series(&[90]));
        assert_eq!(result.amc, dec!(90));

        let result = screen_consumption(&series(&[90, 110]));
        assert_eq!(result.amc, dec!(100));

        let result = screen_consumption(&series(&[90, 110, 100]));
        assert_eq!(result.amc, dec!(100));
        assert_eq!(result.eligible_months, 3);
    }

    #[test]
    fn spike_is_excluded_and_substituted() {
        // The reference screening walk: [100, 110, 105, 500, 108].
        let result = screen_consumption(&series(&[100, 110, 105, 500, 108]));

        let spike = &result.breakdown[3];
        assert!(!spike.eligible);
        assert_eq!(spike.adjusted, dec!(105));
        let deviation = spike.deviation_pct.unwrap();
        assert!(deviation > dec!(370) && deviation < dec!(380));

        // Month 5 screens against [110, 105, 105 (substituted)].
        let last = &result.breakdown[4];
        assert!(last.eligible);
        assert!(last.deviation_pct.unwrap() < dec!(2));

        // avg(105, 105, 108)
        assert_eq!(result.amc, dec!(106));
        assert_eq!(result.eligible_months, 4);
        assert_eq!(result.excluded_months, 1);
    }

    #[test]
    fn substitution_feeds_later_windows() {
        // After the spike is replaced, the next months screen against a
        // window containing the substituted value, not the spike.
        let result = screen_consumption(&series(&[100, 100, 100, 900, 100, 100]));
        assert!(!result.breakdown[3].eligible);
        assert!(result.breakdown[4].eligible);
        assert!(result.breakdown[5].eligible);
        assert_eq!(result.amc, dec!(100));
    }

    #[test]
    fn zero_average_rules() {
        // Rolling average zero, current positive: 100% deviation, excluded.
        let result = screen_consumption(&series(&[0, 0, 0, 50]));
        assert!(!result.breakdown[3].eligible);
        assert_eq!(result.breakdown[3].deviation_pct, Some(dec!(100)));
        // Substituted with the last accepted value, which is zero.
        assert_eq!(result.amc, Decimal::ZERO);

        // Rolling average zero, current zero: 0% deviation, eligible.
        let result = screen_consumption(&series(&[0, 0, 0, 0]));
        assert!(result.breakdown[3].eligible);
        assert_eq!(result.breakdown[3].deviation_pct, Some(Decimal::ZERO));
    }

    #[test]
    fn stockout_dip_is_damped() {
        // A stockout month would halve a plain average; screening holds
        // the AMC at the last good level.
        let result = screen_consumption(&series(&[200, 210, 190, 0, 205]));
        assert!(!result.breakdown[3].eligible);
        assert_eq!(result.breakdown[3].adjusted, dec!(190));
        assert_eq!(result.amc, dec!(195)); // avg(190, 190, 205)
    }

    #[test]
    fn reorder_level_scales_amc() {
        assert_eq!(reorder_level(dec!(106), dec!(3)), dec!(318));
        assert_eq!(reorder_level(Decimal::ZERO, dec!(2)), Decimal::ZERO);
    }
}
