use rust_decimal::Decimal;
use specsbiz_core::{BakiRecord, Customer, CustomerId, RecordId, SalesEntry, TenantId};

use crate::{LedgerError, LedgerResult, SalesQuery};

/// A single mutation inside an atomic ledger batch.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerWrite {
    /// Create a customer, or replace its profile. An existing customer's `total_due`
    /// is preserved; balances only move through [`LedgerWrite::AdjustTotalDue`].
    PutCustomer(Customer),
    /// Remove a customer together with every baki record it owns.
    DeleteCustomer(CustomerId),
    /// Create or replace a baki record under its owning customer.
    PutRecord(BakiRecord),
    DeleteRecord {
        customer_id: CustomerId,
        record_id: RecordId,
    },
    /// Increment (or, with a negative delta, decrement) a customer's running balance.
    AdjustTotalDue {
        customer_id: CustomerId,
        delta: Decimal,
    },
    AppendSale(SalesEntry),
}

impl LedgerWrite {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerWrite::PutCustomer(_) => "put_customer",
            LedgerWrite::DeleteCustomer(_) => "delete_customer",
            LedgerWrite::PutRecord(_) => "put_record",
            LedgerWrite::DeleteRecord { .. } => "delete_record",
            LedgerWrite::AdjustTotalDue { .. } => "adjust_total_due",
            LedgerWrite::AppendSale(_) => "append_sale",
        }
    }
}

/// Abstraction over tenant-scoped ledger storage engines.
///
/// Implementations must apply each [`LedgerStore::commit`] batch atomically: either
/// every write lands or none does. Writes that target a missing customer or record
/// fail the whole batch with the corresponding not-found error.
pub trait LedgerStore: Send + Sync {
    /// Tenant whose documents this store reads and writes.
    fn tenant(&self) -> &TenantId;

    fn customer(&self, id: CustomerId) -> LedgerResult<Option<Customer>>;

    /// All customers, ordered by first name.
    fn customers(&self) -> LedgerResult<Vec<Customer>>;

    fn record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<Option<BakiRecord>> {
        Ok(self
            .records(customer_id)?
            .into_iter()
            .find(|record| record.id == record_id))
    }

    /// All baki records for a customer, newest taken date first.
    fn records(&self, customer_id: CustomerId) -> LedgerResult<Vec<BakiRecord>>;

    fn sales(&self, query: SalesQuery) -> LedgerResult<Vec<SalesEntry>>;

    /// Look up the journal entry produced by a payment event, if any.
    fn sale_by_payment_key(&self, key: &str) -> LedgerResult<Option<SalesEntry>>;

    /// Read the latest persisted sales sequence value.
    fn latest_sale_sequence(&self) -> LedgerResult<Option<u64>>;

    /// Persist a single write.
    fn apply(&self, write: LedgerWrite) -> LedgerResult<()> {
        self.commit(std::slice::from_ref(&write))
    }

    /// Persist a group of writes atomically.
    fn commit(&self, writes: &[LedgerWrite]) -> LedgerResult<()>;
}

pub(crate) fn sort_customers(customers: &mut [Customer]) {
    customers.sort_by_key(|customer| customer.sort_key());
}

pub(crate) fn sort_records(records: &mut [BakiRecord]) {
    records.sort_by(|a, b| {
        b.taken_date
            .cmp(&a.taken_date)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Apply a balance delta, rejecting results the decimal type cannot represent.
pub(crate) fn checked_balance(
    customer_id: CustomerId,
    current: Decimal,
    delta: Decimal,
) -> LedgerResult<Decimal> {
    current.checked_add(delta).ok_or_else(|| {
        LedgerError::Validation(format!(
            "balance of customer {customer_id} would overflow ({current} + {delta})"
        ))
    })
}
