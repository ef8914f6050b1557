use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use specsbiz_core::{BakiRecord, Customer, CustomerId};

use crate::{LedgerError, LedgerResult};

/// Outstanding balances grouped by days since the goods were taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AgingBuckets {
    pub days_0_30: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub days_91_plus: Decimal,
}

impl AgingBuckets {
    /// Sum of all buckets, or `None` when it exceeds the decimal range.
    pub fn total(&self) -> Option<Decimal> {
        self.days_0_30
            .checked_add(self.days_31_60)?
            .checked_add(self.days_61_90)?
            .checked_add(self.days_91_plus)
    }

    fn add(&mut self, age_days: i64, amount: Decimal) -> LedgerResult<()> {
        let bucket = match age_days {
            i64::MIN..=30 => &mut self.days_0_30,
            31..=60 => &mut self.days_31_60,
            61..=90 => &mut self.days_61_90,
            _ => &mut self.days_91_plus,
        };
        *bucket = sum(*bucket, amount)?;
        Ok(())
    }

    fn merge(&mut self, other: &Self) -> LedgerResult<()> {
        self.days_0_30 = sum(self.days_0_30, other.days_0_30)?;
        self.days_31_60 = sum(self.days_31_60, other.days_31_60)?;
        self.days_61_90 = sum(self.days_61_90, other.days_61_90)?;
        self.days_91_plus = sum(self.days_91_plus, other.days_91_plus)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerAging {
    pub customer_id: CustomerId,
    pub name: String,
    pub buckets: AgingBuckets,
    /// Outstanding on records whose promise date has passed.
    pub overdue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgingReport {
    pub as_of: DateTime<Utc>,
    pub customers: Vec<CustomerAging>,
    pub totals: AgingBuckets,
    pub overdue: Decimal,
}

fn sum(left: Decimal, right: Decimal) -> LedgerResult<Decimal> {
    left.checked_add(right)
        .ok_or_else(|| LedgerError::InvalidState("aging totals exceed the decimal range".into()))
}

/// Build an aging report. Customers with nothing outstanding are omitted.
pub fn build_aging_report(
    as_of: DateTime<Utc>,
    customers: &[Customer],
    records: &HashMap<CustomerId, Vec<BakiRecord>>,
) -> LedgerResult<AgingReport> {
    let mut report = AgingReport {
        as_of,
        customers: Vec::new(),
        totals: AgingBuckets::default(),
        overdue: Decimal::ZERO,
    };
    for customer in customers {
        let mut buckets = AgingBuckets::default();
        let mut overdue = Decimal::ZERO;
        let mut any = false;
        for record in records.get(&customer.id).into_iter().flatten() {
            let outstanding = record.outstanding();
            if outstanding <= Decimal::ZERO {
                continue;
            }
            any = true;
            buckets.add((as_of - record.taken_date).num_days(), outstanding)?;
            if record.promise_date.is_some_and(|promised| promised < as_of) {
                overdue = sum(overdue, outstanding)?;
            }
        }
        if !any {
            continue;
        }
        report.totals.merge(&buckets)?;
        report.overdue = sum(report.overdue, overdue)?;
        report.customers.push(CustomerAging {
            customer_id: customer.id,
            name: customer.display_name(),
            buckets,
            overdue,
        });
    }
    Ok(report)
}
