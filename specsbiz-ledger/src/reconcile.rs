use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use specsbiz_core::{BakiRecord, Customer, CustomerId, RecordId};

/// How [`crate::LedgerEngine::reconcile`] treats detected drift.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconcileMode {
    /// Log discrepancies only.
    Report,
    /// Log and correct each drifting balance to the recomputed value.
    Heal,
}

/// Unified report describing every divergence between stored balances and records.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconciliationReport {
    pub customers_checked: usize,
    pub records_checked: usize,
    pub balance_diff: Vec<TotalDueDiscrepancy>,
    pub record_violations: Vec<RecordViolation>,
    /// Customers whose balance was corrected in [`ReconcileMode::Heal`].
    pub healed: Vec<CustomerId>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.balance_diff.is_empty() && self.record_violations.is_empty()
    }
}

/// Detail for a single customer whose stored balance drifted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TotalDueDiscrepancy {
    pub customer_id: CustomerId,
    pub stored: Decimal,
    pub computed: Decimal,
    /// `stored - computed`; healing applies `-delta`.
    pub delta: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordViolation {
    pub customer_id: CustomerId,
    pub record_id: RecordId,
    pub reason: String,
}

/// Stateless engine that compares stored balances against their records.
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerAuditor {
    tolerance: Decimal,
}

impl LedgerAuditor {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    /// Sum of outstanding balances over the supplied records, saturating at the
    /// decimal range so corrupt data still shows up as drift.
    pub fn outstanding(records: &[BakiRecord]) -> Decimal {
        records
            .iter()
            .fold(Decimal::ZERO, |total, record| total.saturating_add(record.outstanding()))
    }

    /// Compare one customer's stored balance with its records.
    pub fn check_customer(
        &self,
        customer: &Customer,
        records: &[BakiRecord],
    ) -> Option<TotalDueDiscrepancy> {
        let computed = Self::outstanding(records);
        let delta = customer.total_due.saturating_sub(computed);
        if delta.abs() <= self.tolerance {
            return None;
        }
        Some(TotalDueDiscrepancy {
            customer_id: customer.id,
            stored: customer.total_due,
            computed,
            delta,
        })
    }

    /// Compute a reconciliation report over a tenant's customers and records.
    pub fn diff(
        &self,
        customers: &[Customer],
        records: &HashMap<CustomerId, Vec<BakiRecord>>,
    ) -> ReconciliationReport {
        let mut report = ReconciliationReport {
            customers_checked: customers.len(),
            ..ReconciliationReport::default()
        };
        for customer in customers {
            let owned = records
                .get(&customer.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            report.records_checked += owned.len();
            for record in owned {
                if let Err(reason) = record.check_invariants() {
                    report.record_violations.push(RecordViolation {
                        customer_id: customer.id,
                        record_id: record.id,
                        reason,
                    });
                }
            }
            if let Some(discrepancy) = self.check_customer(customer, owned) {
                report.balance_diff.push(discrepancy);
            }
        }
        report
    }
}
