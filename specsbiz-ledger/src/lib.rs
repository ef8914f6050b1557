//! Credit ledger engine and storage backends used by SpecsBiz.

mod aging;
mod engine;
mod error;
mod journal;
mod local;
mod locks;
mod query;
mod reconcile;
mod sqlite;
mod store;

pub use aging::{build_aging_report, AgingBuckets, AgingReport, CustomerAging};
pub use engine::{EngineOptions, LedgerEngine};
pub use error::{LedgerError, LedgerResult};
pub use journal::{entry_for_payment, Payment, PaymentJournalContext, PaymentReceipt};
pub use local::{FileSlots, LocalLedgerStore, MemorySlots, SlotStorage};
pub use query::SalesQuery;
pub use reconcile::{
    LedgerAuditor, ReconcileMode, ReconciliationReport, RecordViolation, TotalDueDiscrepancy,
};
pub use sqlite::SqliteLedgerStore;
pub use store::{LedgerStore, LedgerWrite};

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use specsbiz_core::{SalesEntry, TenantId};

    fn sale(sequence: u64, baki: bool) -> SalesEntry {
        let mut entry = SalesEntry::new(dec!(10), dec!(0)).with_sequence(sequence);
        entry.is_baki_payment = baki;
        entry
    }

    #[test]
    fn sales_query_orders_and_limits() {
        let entries = vec![sale(1, true), sale(3, false), sale(2, true)];
        let latest = SalesQuery::default().with_limit(2).apply(entries.clone());
        assert_eq!(
            latest.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![3, 2]
        );
        let baki = SalesQuery::default().baki_payments().ascending().apply(entries);
        assert_eq!(baki.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn stores_report_their_tenant() {
        let store = LocalLedgerStore::in_memory("kiosk".parse::<TenantId>().unwrap());
        assert_eq!(store.tenant().as_str(), "kiosk");
    }
}
