use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use specsbiz_config::{LedgerConfig, SpecsBizConfig, StorageBackend};
use specsbiz_core::{
    BakiAmendment, BakiLineItem, BakiRecord, Customer, CustomerId, CustomerProfile, RecordId,
    SalesEntry,
};
use specsbiz_events::{
    CustomersEvent, Event, EventBus, EventStream, RecordsEvent, SaleEvent,
};
use tracing::{debug, info, warn};

use crate::aging::{build_aging_report, AgingReport};
use crate::journal::{entry_for_payment, Payment, PaymentJournalContext, PaymentReceipt};
use crate::locks::CustomerLocks;
use crate::reconcile::{LedgerAuditor, ReconcileMode, ReconciliationReport};
use crate::{
    LedgerError, LedgerResult, LedgerStore, LedgerWrite, LocalLedgerStore, SalesQuery,
    SqliteLedgerStore,
};

/// Tunables for a [`LedgerEngine`].
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub verify_on_read: bool,
    pub reconcile_tolerance: Decimal,
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for EngineOptions {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            verify_on_read: config.verify_on_read,
            reconcile_tolerance: config.reconcile_tolerance,
            event_capacity: config.event_capacity,
        }
    }
}

/// Owns every read and write of customer debt state for one tenant.
///
/// Mutations of a customer are serialised through that customer's lock: the engine
/// reads the authoritative record state, validates, and commits the resulting
/// [`LedgerWrite`] batch atomically while the lock is held. The running `total_due`
/// therefore always equals the sum of the customer's outstanding balances, on either
/// store implementation.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    locks: CustomerLocks,
    events: EventBus,
    auditor: LedgerAuditor,
    verify_on_read: bool,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: Arc<dyn LedgerStore>, options: EngineOptions) -> Self {
        Self {
            store,
            locks: CustomerLocks::default(),
            events: EventBus::new(options.event_capacity),
            auditor: LedgerAuditor::new(options.reconcile_tolerance),
            verify_on_read: options.verify_on_read,
        }
    }

    /// Open the configured store for the configured tenant.
    pub fn from_config(config: &SpecsBizConfig) -> LedgerResult<Self> {
        let tenant = config.tenant.clone();
        let store: Arc<dyn LedgerStore> = match config.storage.backend {
            StorageBackend::Sqlite => {
                Arc::new(SqliteLedgerStore::new(&config.storage.path, tenant)?)
            }
            StorageBackend::Local => Arc::new(LocalLedgerStore::open(&config.storage.path, tenant)?),
        };
        info!(
            tenant = %config.tenant,
            backend = ?config.storage.backend,
            path = %config.storage.path.display(),
            "ledger engine ready"
        );
        Ok(Self::with_options(store, EngineOptions::from(&config.ledger)))
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Live query stream; every committed mutation re-delivers full result sets.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn create_customer(&self, profile: CustomerProfile) -> LedgerResult<Customer> {
        profile.validate().map_err(LedgerError::Validation)?;
        let customer = Customer::new(profile);
        self.store.apply(LedgerWrite::PutCustomer(customer.clone()))?;
        info!(customer = %customer.id, name = %customer.display_name(), "customer created");
        self.publish_customers();
        Ok(customer)
    }

    /// Replace a customer's profile fields. The balance is never touched here.
    pub fn update_customer(
        &self,
        customer_id: CustomerId,
        profile: CustomerProfile,
    ) -> LedgerResult<Customer> {
        profile.validate().map_err(LedgerError::Validation)?;
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();
        let mut customer = self.require_customer(customer_id)?;
        customer.apply_profile(profile);
        self.store.apply(LedgerWrite::PutCustomer(customer.clone()))?;
        info!(customer = %customer_id, "customer profile updated");
        self.publish_customers();
        Ok(customer)
    }

    /// Delete a customer and every baki record it owns. Returns the number of
    /// records removed. Sales journal entries are kept.
    pub fn delete_customer(&self, customer_id: CustomerId) -> LedgerResult<usize> {
        let removed = {
            let lock = self.locks.handle(customer_id);
            let _guard = lock.lock();
            self.require_customer(customer_id)?;
            let removed = self.store.records(customer_id)?.len();
            self.store.apply(LedgerWrite::DeleteCustomer(customer_id))?;
            removed
        };
        self.locks.forget(customer_id);
        info!(customer = %customer_id, records = removed, "customer deleted");
        self.publish_customers();
        self.publish(Event::RecordsChanged(RecordsEvent {
            customer_id,
            records: Vec::new(),
        }));
        Ok(removed)
    }

    /// Put goods on a customer's credit and raise their balance by the amount.
    pub fn add_baki_record(
        &self,
        customer_id: CustomerId,
        item: BakiLineItem,
    ) -> LedgerResult<BakiRecord> {
        item.validate().map_err(LedgerError::Validation)?;
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();
        self.require_customer(customer_id)?;
        let record = BakiRecord::open(customer_id, item);
        self.store.commit(&[
            LedgerWrite::PutRecord(record.clone()),
            LedgerWrite::AdjustTotalDue {
                customer_id,
                delta: record.amount,
            },
        ])?;
        info!(
            customer = %customer_id,
            record = %record.id,
            product = %record.product_name,
            amount = %record.amount,
            "baki record added"
        );
        self.publish_ledger(customer_id);
        Ok(record)
    }

    /// Collect a payment against a record.
    ///
    /// The amount must be positive and no larger than the outstanding balance. A
    /// payment whose key is already journaled is not applied again; the original
    /// journal entry is returned with `replayed` set.
    pub fn pay_baki_record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
        payment: Payment,
    ) -> LedgerResult<PaymentReceipt> {
        if payment.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "payment amount must be positive, got {}",
                payment.amount
            )));
        }
        if payment.key.trim().is_empty() {
            return Err(LedgerError::Validation("payment key must not be empty".into()));
        }
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();

        if let Some(sale) = self.store.sale_by_payment_key(&payment.key)? {
            if sale.record_id != Some(record_id) || sale.customer_id != Some(customer_id) {
                return Err(LedgerError::Validation(format!(
                    "payment key {} was already used for another record",
                    payment.key
                )));
            }
            let record = self.require_record(customer_id, record_id)?;
            debug!(key = %payment.key, record = %record_id, "payment replay ignored");
            return Ok(PaymentReceipt {
                sale,
                record,
                replayed: true,
            });
        }

        self.require_customer(customer_id)?;
        let mut record = self.require_record(customer_id, record_id)?;
        let outstanding = record.outstanding();
        if payment.amount > outstanding {
            return Err(LedgerError::Overpayment {
                requested: payment.amount,
                outstanding,
            });
        }

        let sale = entry_for_payment(PaymentJournalContext::new(&record, &payment));
        record
            .apply_payment(payment.amount)
            .map_err(LedgerError::Validation)?;
        self.store.commit(&[
            LedgerWrite::AppendSale(sale.clone()),
            LedgerWrite::PutRecord(record.clone()),
            LedgerWrite::AdjustTotalDue {
                customer_id,
                delta: -payment.amount,
            },
        ])?;
        let sale = self.store.sale_by_payment_key(&payment.key)?.unwrap_or(sale);
        info!(
            customer = %customer_id,
            record = %record_id,
            amount = %payment.amount,
            paid = %record.paid_amount,
            status = %record.status,
            "baki payment collected"
        );
        self.publish_ledger(customer_id);
        self.publish(Event::SaleAppended(SaleEvent { sale: sale.clone() }));
        Ok(PaymentReceipt {
            sale,
            record,
            replayed: false,
        })
    }

    /// Amend a record and shift the balance by the change in amount.
    pub fn amend_baki_record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
        amendment: BakiAmendment,
    ) -> LedgerResult<BakiRecord> {
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();
        self.require_customer(customer_id)?;
        let mut record = self.require_record(customer_id, record_id)?;
        if amendment.is_empty() {
            return Ok(record);
        }
        let delta = record
            .apply_amendment(amendment)
            .map_err(LedgerError::Validation)?;
        let mut writes = vec![LedgerWrite::PutRecord(record.clone())];
        if !delta.is_zero() {
            writes.push(LedgerWrite::AdjustTotalDue { customer_id, delta });
        }
        self.store.commit(&writes)?;
        info!(
            customer = %customer_id,
            record = %record_id,
            amount = %record.amount,
            delta = %delta,
            "baki record amended"
        );
        self.publish_ledger(customer_id);
        Ok(record)
    }

    /// Remove a record; the balance drops by what was still unpaid on it.
    pub fn delete_baki_record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<BakiRecord> {
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();
        self.require_customer(customer_id)?;
        let record = self.require_record(customer_id, record_id)?;
        let remaining = record.outstanding();
        let mut writes = vec![LedgerWrite::DeleteRecord {
            customer_id,
            record_id,
        }];
        if !remaining.is_zero() {
            writes.push(LedgerWrite::AdjustTotalDue {
                customer_id,
                delta: -remaining,
            });
        }
        self.store.commit(&writes)?;
        info!(
            customer = %customer_id,
            record = %record_id,
            remaining = %remaining,
            "baki record deleted"
        );
        self.publish_ledger(customer_id);
        Ok(record)
    }

    pub fn customer(&self, customer_id: CustomerId) -> LedgerResult<Option<Customer>> {
        let customer = self.store.customer(customer_id)?;
        if self.verify_on_read {
            if let Some(customer) = &customer {
                let records = self.store.records(customer_id)?;
                if let Some(drift) = self.auditor.check_customer(customer, &records) {
                    warn!(
                        customer = %customer_id,
                        stored = %drift.stored,
                        computed = %drift.computed,
                        delta = %drift.delta,
                        "customer balance drifted from its records"
                    );
                }
            }
        }
        Ok(customer)
    }

    pub fn customers(&self) -> LedgerResult<Vec<Customer>> {
        self.store.customers()
    }

    pub fn records(&self, customer_id: CustomerId) -> LedgerResult<Vec<BakiRecord>> {
        self.store.records(customer_id)
    }

    pub fn record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<Option<BakiRecord>> {
        self.store.record(customer_id, record_id)
    }

    pub fn sales(&self, query: SalesQuery) -> LedgerResult<Vec<SalesEntry>> {
        self.store.sales(query)
    }

    /// Total owed to the tenant across all customers.
    pub fn outstanding_total(&self) -> LedgerResult<Decimal> {
        self.store
            .customers()?
            .iter()
            .try_fold(Decimal::ZERO, |total, customer| total.checked_add(customer.total_due))
            .ok_or_else(|| {
                LedgerError::InvalidState("outstanding total exceeds the decimal range".into())
            })
    }

    pub fn aging_report(&self, as_of: DateTime<Utc>) -> LedgerResult<AgingReport> {
        let (customers, records) = self.snapshot()?;
        build_aging_report(as_of, &customers, &records)
    }

    /// Recompute every customer's balance from its records and compare with the
    /// stored value. In [`ReconcileMode::Heal`] drifting balances are corrected.
    pub fn reconcile(&self, mode: ReconcileMode) -> LedgerResult<ReconciliationReport> {
        let (customers, records) = self.snapshot()?;
        let mut report = self.auditor.diff(&customers, &records);

        for violation in &report.record_violations {
            warn!(
                customer = %violation.customer_id,
                record = %violation.record_id,
                reason = %violation.reason,
                "baki record violates ledger invariants"
            );
        }
        for drift in &report.balance_diff {
            warn!(
                customer = %drift.customer_id,
                stored = %drift.stored,
                computed = %drift.computed,
                delta = %drift.delta,
                "balance mismatch detected during reconciliation"
            );
        }

        if mode == ReconcileMode::Heal {
            let drifting: Vec<CustomerId> =
                report.balance_diff.iter().map(|d| d.customer_id).collect();
            for customer_id in drifting {
                if self.heal_customer(customer_id)? {
                    report.healed.push(customer_id);
                }
            }
            if !report.healed.is_empty() {
                self.publish_customers();
            }
        }

        if report.is_clean() {
            info!(
                customers = report.customers_checked,
                records = report.records_checked,
                "ledger reconciliation complete with no divergence"
            );
        }
        Ok(report)
    }

    /// Re-check one customer under its lock and correct the balance if it still drifts.
    fn heal_customer(&self, customer_id: CustomerId) -> LedgerResult<bool> {
        let lock = self.locks.handle(customer_id);
        let _guard = lock.lock();
        let Some(customer) = self.store.customer(customer_id)? else {
            return Ok(false);
        };
        let records = self.store.records(customer_id)?;
        let Some(drift) = self.auditor.check_customer(&customer, &records) else {
            return Ok(false);
        };
        self.store.apply(LedgerWrite::AdjustTotalDue {
            customer_id,
            delta: -drift.delta,
        })?;
        info!(
            customer = %customer_id,
            from = %drift.stored,
            to = %drift.computed,
            "customer balance healed"
        );
        Ok(true)
    }

    fn snapshot(&self) -> LedgerResult<(Vec<Customer>, HashMap<CustomerId, Vec<BakiRecord>>)> {
        let customers = self.store.customers()?;
        let mut records = HashMap::with_capacity(customers.len());
        for customer in &customers {
            records.insert(customer.id, self.store.records(customer.id)?);
        }
        Ok((customers, records))
    }

    fn require_customer(&self, customer_id: CustomerId) -> LedgerResult<Customer> {
        self.store
            .customer(customer_id)?
            .ok_or(LedgerError::CustomerNotFound(customer_id))
    }

    fn require_record(
        &self,
        customer_id: CustomerId,
        record_id: RecordId,
    ) -> LedgerResult<BakiRecord> {
        self.store
            .record(customer_id, record_id)?
            .ok_or(LedgerError::RecordNotFound {
                customer_id,
                record_id,
            })
    }

    fn publish(&self, event: Event) {
        if self.events.receiver_count() == 0 {
            return;
        }
        debug!(kind = event.kind(), "publishing ledger event");
        self.events.publish(event);
    }

    fn publish_customers(&self) {
        if self.events.receiver_count() == 0 {
            return;
        }
        match self.store.customers() {
            Ok(customers) => self.publish(Event::CustomersChanged(CustomersEvent { customers })),
            Err(err) => warn!(error = %err, "failed to load customers for subscribers"),
        }
    }

    fn publish_ledger(&self, customer_id: CustomerId) {
        if self.events.receiver_count() == 0 {
            return;
        }
        self.publish_customers();
        match self.store.records(customer_id) {
            Ok(records) => self.publish(Event::RecordsChanged(RecordsEvent {
                customer_id,
                records,
            })),
            Err(err) => warn!(
                customer = %customer_id,
                error = %err,
                "failed to load records for subscribers"
            ),
        }
    }
}
