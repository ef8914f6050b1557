//! Plain-text tables for terminal output.

use std::fmt::Write;

use specsbiz_core::{BakiRecord, Customer, SalesEntry};
use specsbiz_ledger::{AgingReport, ReconciliationReport};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn customer(customer: &Customer) -> String {
    let mut out = format!(
        "{}  {}  due {}",
        customer.id,
        customer.display_name(),
        customer.total_due
    );
    if !customer.phone.is_empty() {
        let _ = write!(out, "  phone {}", customer.phone);
    }
    if !customer.address.is_empty() {
        let _ = write!(out, "  {}", customer.address);
    }
    out
}

pub fn customers(customers: &[Customer]) -> String {
    if customers.is_empty() {
        return "no customers".to_string();
    }
    customers
        .iter()
        .map(customer)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn records(records: &[BakiRecord]) -> String {
    if records.is_empty() {
        return "no baki records".to_string();
    }
    let mut out = format!(
        "{:<36}  {:<20} {:>8} {:>10} {:>10} {:<8} {:<10} {:<10}",
        "record", "product", "qty", "amount", "paid", "status", "taken", "promise"
    );
    for record in records {
        let promise = record
            .promise_date
            .map(|date| date.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            out,
            "\n{:<36}  {:<20} {:>8} {:>10} {:>10} {:<8} {:<10} {:<10}",
            record.id,
            truncate(&record.product_name, 20),
            record.quantity,
            record.amount,
            record.paid_amount,
            record.status,
            record.taken_date.format(DATE_FORMAT),
            promise
        );
        if let Some(note) = &record.note {
            let _ = write!(out, "  {note}");
        }
    }
    out
}

pub fn sales(sales: &[SalesEntry]) -> String {
    if sales.is_empty() {
        return "no sales entries".to_string();
    }
    sales
        .iter()
        .map(|sale| {
            let label = if sale.is_baki_payment {
                format!(
                    "baki payment: {}",
                    sale.baki_product_name.as_deref().unwrap_or("-")
                )
            } else {
                "sale".to_string()
            };
            format!(
                "#{:<6} {}  {:>10}  {}",
                sale.sequence,
                sale.timestamp.format("%Y-%m-%d %H:%M:%S"),
                sale.total,
                label
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn aging(report: &AgingReport) -> String {
    let mut out = format!(
        "aging as of {}\n{:<24} {:>10} {:>10} {:>10} {:>10} {:>10}",
        report.as_of.format(DATE_FORMAT),
        "customer",
        "0-30",
        "31-60",
        "61-90",
        "91+",
        "overdue"
    );
    for row in &report.customers {
        let _ = write!(
            out,
            "\n{:<24} {:>10} {:>10} {:>10} {:>10} {:>10}",
            truncate(&row.name, 24),
            row.buckets.days_0_30,
            row.buckets.days_31_60,
            row.buckets.days_61_90,
            row.buckets.days_91_plus,
            row.overdue
        );
    }
    let _ = write!(
        out,
        "\n{:<24} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "total",
        report.totals.days_0_30,
        report.totals.days_31_60,
        report.totals.days_61_90,
        report.totals.days_91_plus,
        report.overdue
    );
    out
}

pub fn reconciliation(report: &ReconciliationReport) -> String {
    let mut out = format!(
        "checked {} customers and {} baki records",
        report.customers_checked, report.records_checked
    );
    if report.is_clean() {
        out.push_str("\nledger is consistent");
        return out;
    }
    for diff in &report.balance_diff {
        let healed = if report.healed.contains(&diff.customer_id) {
            " (healed)"
        } else {
            ""
        };
        let _ = write!(
            out,
            "\nbalance drift for {}: stored {} computed {} delta {}{healed}",
            diff.customer_id, diff.stored, diff.computed, diff.delta
        );
    }
    for violation in &report.record_violations {
        let _ = write!(
            out,
            "\nrecord {} of {}: {}",
            violation.record_id, violation.customer_id, violation.reason
        );
    }
    out
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}
